//! Application configuration loaded from environment variables.

use checkout::{RazorpayConfig, StripeConfig};
use domain::PricingPolicy;

/// Log output format for the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `CURRENCY`, `TAX_RATE_BPS`: pricing policy (default INR, 1800)
/// - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`, `FRONTEND_URL`
/// - `RAZORPAY_KEY_ID`, `RAZORPAY_KEY_SECRET`, `RAZORPAY_WEBHOOK_SECRET`
/// - `DEV_GATEWAY_SECRET`: registers an in-process gateway for every
///   provider without real credentials. Local runs only.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub currency: String,
    pub tax_rate_bps: u32,
    pub frontend_url: String,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub razorpay_key_id: Option<String>,
    pub razorpay_key_secret: Option<String>,
    pub razorpay_webhook_secret: Option<String>,
    pub dev_gateway_secret: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: var("DATABASE_URL"),
            currency: var("CURRENCY").unwrap_or(defaults.currency),
            tax_rate_bps: var("TAX_RATE_BPS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.tax_rate_bps),
            frontend_url: var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            razorpay_key_id: var("RAZORPAY_KEY_ID"),
            razorpay_key_secret: var("RAZORPAY_KEY_SECRET"),
            razorpay_webhook_secret: var("RAZORPAY_WEBHOOK_SECRET"),
            dev_gateway_secret: var("DEV_GATEWAY_SECRET"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            tax_rate_bps: self.tax_rate_bps,
            currency: self.currency.clone(),
        }
    }

    /// Stripe settings, when both secrets are present.
    pub fn stripe(&self) -> Option<StripeConfig> {
        Some(StripeConfig::new(
            self.stripe_secret_key.clone()?,
            self.stripe_webhook_secret.clone()?,
            self.frontend_url.clone(),
        ))
    }

    /// Razorpay settings, when all three secrets are present.
    pub fn razorpay(&self) -> Option<RazorpayConfig> {
        Some(RazorpayConfig::new(
            self.razorpay_key_id.clone()?,
            self.razorpay_key_secret.clone()?,
            self.razorpay_webhook_secret.clone()?,
        ))
    }
}

impl Default for Config {
    fn default() -> Self {
        let policy = PricingPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            currency: policy.currency,
            tax_rate_bps: policy.tax_rate_bps,
            frontend_url: "http://localhost:5173".to_string(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            razorpay_key_id: None,
            razorpay_key_secret: None,
            razorpay_webhook_secret: None,
            dev_gateway_secret: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.currency, "INR");
        assert_eq!(config.tax_rate_bps, 1_800);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_lookup_overrides() {
        let config = from_pairs(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("TAX_RATE_BPS", "500"),
            ("CURRENCY", "USD"),
            ("DATABASE_URL", "postgres://localhost/shop"),
        ]);

        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.pricing_policy().tax_rate_bps, 500);
        assert_eq!(config.pricing_policy().currency, "USD");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/shop")
        );
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = from_pairs(&[("PORT", "eighty"), ("TAX_RATE_BPS", "-1"), ("HOST", "  ")]);

        assert_eq!(config.port, 3000);
        assert_eq!(config.tax_rate_bps, 1_800);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_gateway_requires_all_secrets() {
        let partial = from_pairs(&[
            ("STRIPE_SECRET_KEY", "sk_test"),
            ("RAZORPAY_KEY_ID", "rzp_key"),
            ("RAZORPAY_KEY_SECRET", "rzp_secret"),
        ]);
        assert!(partial.stripe().is_none());
        assert!(partial.razorpay().is_none());

        let full = from_pairs(&[
            ("STRIPE_SECRET_KEY", "sk_test"),
            ("STRIPE_WEBHOOK_SECRET", "whsec"),
            ("FRONTEND_URL", "https://shop.example"),
        ]);
        let stripe = full.stripe().unwrap();
        assert_eq!(stripe.webhook_secret, "whsec");
        assert_eq!(stripe.frontend_url, "https://shop.example");
    }
}
