//! Order pricing: subtotal, shipping charge, tax and grand total.
//!
//! Pricing is always recomputed in full from the item snapshot, so calling
//! [`Pricing::compute`] twice with the same inputs yields the same result.

use serde::{Deserialize, Serialize};

use crate::order::{LineItem, Money};

/// Weight step for the shipping weight surcharge.
pub const WEIGHT_STEP_GRAMS: u64 = 500;

/// Surcharge per full weight step, as basis points of the method's base rate.
pub const WEIGHT_STEP_SURCHARGE_BPS: u32 = 1_000;

/// Units included in the method cost before the per-unit surcharge applies.
pub const FREE_UNITS: u32 = 3;

/// Surcharge per unit above [`FREE_UNITS`].
pub const PER_EXTRA_UNIT_SURCHARGE: Money = Money::from_cents(10);

/// A shipping option as produced by the shipping-quote collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingMethod {
    pub id: String,
    pub label: String,
    /// Base cost for the destination, region surcharges included.
    pub cost: Money,
    /// The part of `cost` that is a region surcharge. Weight surcharges are
    /// computed on `cost` without it.
    #[serde(default)]
    pub region_surcharge: Money,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub delivery_estimate: Option<String>,
}

/// Store-wide pricing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Tax rate in basis points of the items subtotal (1800 = 18%).
    pub tax_rate_bps: u32,
    pub currency: String,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bps: 1_800,
            currency: "INR".to_string(),
        }
    }
}

/// Final price breakdown stored on a priced order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub items_subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub grand_total: Money,
    pub currency: String,
}

impl Pricing {
    /// Prices `items` shipped with `method` under `policy`.
    pub fn compute(items: &[LineItem], method: &ShippingMethod, policy: &PricingPolicy) -> Self {
        let items_subtotal = items_subtotal(items);
        let shipping = shipping_charge(method, items);
        let tax = items_subtotal.apply_bps(policy.tax_rate_bps);

        Self {
            items_subtotal,
            shipping,
            tax,
            grand_total: items_subtotal + shipping + tax,
            currency: policy.currency.clone(),
        }
    }
}

/// Sum of `unit_price * qty` over the snapshot.
pub fn items_subtotal(items: &[LineItem]) -> Money {
    items.iter().map(LineItem::total_price).sum()
}

/// Shipping charge: method cost plus weight and unit-count surcharges.
pub fn shipping_charge(method: &ShippingMethod, items: &[LineItem]) -> Money {
    let base = (method.cost - method.region_surcharge).max(Money::zero());
    let weight: u64 = items.iter().map(LineItem::total_weight_grams).sum();
    let units: u32 = items.iter().map(|item| item.qty).sum();

    let mut charge = method.cost;

    let steps = weight / WEIGHT_STEP_GRAMS;
    if steps > 0 {
        let steps = u32::try_from(steps).unwrap_or(u32::MAX);
        charge += base.apply_bps(WEIGHT_STEP_SURCHARGE_BPS.saturating_mul(steps));
    }

    if units > FREE_UNITS {
        charge += PER_EXTRA_UNIT_SURCHARGE.multiply(units - FREE_UNITS);
    }

    charge
}
