//! Shipping quotes for a destination address.

use domain::{Address, Money, ShippingMethod};

/// Produces the shipping methods offered for an address.
///
/// Region surcharges are folded into each method's `cost` and reported in
/// `region_surcharge`; weight and unit-count surcharges are applied later, at
/// pricing time.
pub trait ShippingQuoter: Send + Sync {
    fn quote(&self, address: &Address) -> Vec<ShippingMethod>;
}

struct Rate {
    id: &'static str,
    label: &'static str,
    base: i64,
    carrier: &'static str,
    estimate: &'static str,
}

const DOMESTIC: [Rate; 2] = [
    Rate {
        id: "standard",
        label: "Standard Shipping",
        base: 50,
        carrier: "LocalCourier",
        estimate: "3-6 business days",
    },
    Rate {
        id: "express",
        label: "Express Shipping",
        base: 120,
        carrier: "LocalExpress",
        estimate: "1-2 business days",
    },
];

const INTERNATIONAL: [Rate; 2] = [
    Rate {
        id: "intl_economy",
        label: "International Economy",
        base: 800,
        carrier: "IntlCarrier",
        estimate: "10-20 business days",
    },
    Rate {
        id: "intl_express",
        label: "International Express",
        base: 2000,
        carrier: "IntlExpress",
        estimate: "3-7 business days",
    },
];

/// Fixed rate table with region surcharges.
#[derive(Debug, Clone)]
pub struct RateTableQuoter {
    /// Added when the postal code starts with `9`.
    pub remote_postal_surcharge: Money,
    /// Added for states listed in `remote_states`.
    pub remote_state_surcharge: Money,
    /// Lowercase state names that carry the remote-state surcharge.
    pub remote_states: Vec<String>,
}

impl Default for RateTableQuoter {
    fn default() -> Self {
        Self {
            remote_postal_surcharge: Money::from_cents(50),
            remote_state_surcharge: Money::from_cents(80),
            remote_states: vec!["remote-state".to_string()],
        }
    }
}

impl RateTableQuoter {
    pub fn new() -> Self {
        Self::default()
    }

    fn region_surcharge(&self, address: &Address) -> Money {
        let mut surcharge = Money::zero();

        if address.postal_code.trim().starts_with('9') {
            surcharge += self.remote_postal_surcharge;
        }

        let state = address.state.trim().to_ascii_lowercase();
        if self.remote_states.iter().any(|remote| *remote == state) {
            surcharge += self.remote_state_surcharge;
        }

        surcharge
    }
}

impl ShippingQuoter for RateTableQuoter {
    fn quote(&self, address: &Address) -> Vec<ShippingMethod> {
        let table = if address.is_domestic() {
            &DOMESTIC
        } else {
            &INTERNATIONAL
        };
        let surcharge = self.region_surcharge(address);

        table
            .iter()
            .map(|rate| ShippingMethod {
                id: rate.id.to_string(),
                label: rate.label.to_string(),
                cost: Money::from_cents(rate.base) + surcharge,
                region_surcharge: surcharge,
                carrier: Some(rate.carrier.to_string()),
                delivery_estimate: Some(rate.estimate.to_string()),
            })
            .collect()
    }
}
