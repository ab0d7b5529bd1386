//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

/// Money amount in minor currency units (paise, cents) to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new Money amount from minor units.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * i64::from(quantity))
    }

    /// Applies a rate expressed in basis points, rounding half away from zero.
    ///
    /// `Money::from_cents(200).apply_bps(1800)` is 36.
    pub fn apply_bps(&self, bps: u32) -> Money {
        let scaled = i128::from(self.0) * i128::from(bps);
        let rounded = if scaled >= 0 {
            (scaled + 5_000) / 10_000
        } else {
            (scaled - 5_000) / 10_000
        };
        Money(rounded as i64)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A line of an order, snapshotted from the catalog at session init.
///
/// Later catalog changes never reach an existing snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub title: String,
    pub unit_price: Money,
    pub qty: u32,
    #[serde(default)]
    pub image_ref: String,
    #[serde(default)]
    pub sku: String,
    /// Weight of one unit in grams; feeds the shipping weight surcharge.
    #[serde(default)]
    pub weight_grams: u32,
}

impl LineItem {
    /// Returns the total price for this line (qty * unit_price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.qty)
    }

    pub fn total_weight_grams(&self) -> u64 {
        u64::from(self.weight_grams) * u64::from(self.qty)
    }
}

/// Postal address used for shipping and billing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    /// Returns true for addresses served by the domestic rate table.
    ///
    /// An empty country is treated as domestic.
    pub fn is_domestic(&self) -> bool {
        let country = self.country.trim().to_ascii_lowercase();
        country.is_empty() || country == "india" || country == "in"
    }
}

/// Payment providers the engine can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    Razorpay,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Razorpay => "razorpay",
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stripe" => Ok(PaymentProvider::Stripe),
            "razorpay" => Ok(PaymentProvider::Razorpay),
            other => Err(format!("unknown payment provider: {other}")),
        }
    }
}

/// Shipment tracking data maintained by admin fulfillment updates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fulfillment {
    pub carrier: Option<String>,
    pub tracking_id: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Partial fulfillment update; `None` fields leave the stored value alone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FulfillmentPatch {
    pub carrier: Option<String>,
    pub tracking_id: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Fulfillment {
    pub(crate) fn merge(&mut self, patch: &FulfillmentPatch) {
        if let Some(carrier) = &patch.carrier {
            self.carrier = Some(carrier.clone());
        }
        if let Some(tracking_id) = &patch.tracking_id {
            self.tracking_id = Some(tracking_id.clone());
        }
        if let Some(shipped_at) = patch.shipped_at {
            self.shipped_at = Some(shipped_at);
        }
        if let Some(delivered_at) = patch.delivered_at {
            self.delivered_at = Some(delivered_at);
        }
    }
}

/// A refund issued against a paid order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    pub refund_id: String,
    pub amount: Money,
    pub provider: PaymentProvider,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// A stock decrement that could not be applied while confirming payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAnomaly {
    pub product_id: ProductId,
    pub reason: String,
    pub at: DateTime<Utc>,
}
