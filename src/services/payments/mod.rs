pub mod gateway;
pub mod paypal;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How a provider call went wrong. Only `Transient` failures are retried.
#[derive(Debug, thiserror::Error)]
pub enum ProviderFailure {
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("provider rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderMetadata {
    pub booking_id: String,
    pub booking_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCapture {
    pub status: CaptureStatus,
    pub transaction_id: Option<String>,
    /// Minor currency units, when the provider reports it.
    pub amount: Option<i64>,
}

/// The external payment provider's order/capture protocol. Amounts are in
/// minor currency units.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Recorded as the booking's payment method.
    fn method(&self) -> &'static str;

    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        metadata: &OrderMetadata,
    ) -> Result<String, ProviderFailure>;

    async fn capture(&self, order_id: &str) -> Result<ProviderCapture, ProviderFailure>;

    async fn refund(
        &self,
        transaction_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<(), ProviderFailure>;
}

/// Renders minor units as a decimal string with two places, e.g. 500 -> "5.00".
pub fn format_amount(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Parses a two-place decimal string into minor units.
pub fn parse_amount(value: &str) -> Option<i64> {
    let value = value.trim();
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if whole.starts_with('-') || frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<2}").parse().ok()?
    };
    whole.checked_mul(100)?.checked_add(frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(500), "5.00");
        assert_eq!(format_amount(1234), "12.34");
        assert_eq!(format_amount(7), "0.07");
        assert_eq!(format_amount(0), "0.00");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("5.00"), Some(500));
        assert_eq!(parse_amount("12.3"), Some(1230));
        assert_eq!(parse_amount("40"), Some(4000));
        assert_eq!(parse_amount("0.07"), Some(7));
        assert_eq!(parse_amount("1.234"), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("-1.50"), None);
    }
}
