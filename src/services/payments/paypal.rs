use async_trait::async_trait;
use serde_json::json;

use super::{
    format_amount, parse_amount, CaptureStatus, OrderMetadata, PaymentProvider, ProviderCapture,
    ProviderFailure,
};

/// PayPal Orders v2 over REST.
pub struct PaypalProvider {
    api_base: String,
    client_id: String,
    client_secret: String,
    client: reqwest::Client,
}

impl PaypalProvider {
    pub fn new(
        api_base: String,
        client_id: String,
        client_secret: String,
        timeout: std::time::Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            client,
        }
    }

    async fn access_token(&self) -> Result<String, ProviderFailure> {
        let resp = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(transport_failure)?;

        let data = read_json(resp, "token").await?;
        data["access_token"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderFailure::Rejected("missing access_token".to_string()))
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
        what: &str,
    ) -> Result<serde_json::Value, ProviderFailure> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(token)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;

        read_json(resp, what).await
    }
}

fn transport_failure(e: reqwest::Error) -> ProviderFailure {
    ProviderFailure::Transient(format!("request to PayPal failed: {e}"))
}

async fn read_json(resp: reqwest::Response, what: &str) -> Result<serde_json::Value, ProviderFailure> {
    let status = resp.status();
    let data: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| ProviderFailure::Transient(format!("failed to parse PayPal {what} response: {e}")))?;

    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderFailure::Transient(format!(
            "PayPal {what} error ({status}): {data}"
        )));
    }
    if !status.is_success() {
        return Err(ProviderFailure::Rejected(format!(
            "PayPal {what} error ({status}): {data}"
        )));
    }
    Ok(data)
}

/// Extracts the capture outcome from an Orders v2 capture response.
fn parse_capture(data: &serde_json::Value) -> ProviderCapture {
    let capture = &data["purchase_units"][0]["payments"]["captures"][0];
    let completed = data["status"].as_str() == Some("COMPLETED")
        && capture["status"].as_str().map_or(true, |s| s == "COMPLETED");

    ProviderCapture {
        status: if completed {
            CaptureStatus::Succeeded
        } else {
            CaptureStatus::Failed
        },
        transaction_id: capture["id"].as_str().map(|s| s.to_string()),
        amount: capture["amount"]["value"].as_str().and_then(parse_amount),
    }
}

#[async_trait]
impl PaymentProvider for PaypalProvider {
    fn method(&self) -> &'static str {
        "paypal"
    }

    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        metadata: &OrderMetadata,
    ) -> Result<String, ProviderFailure> {
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": metadata.booking_code,
                "custom_id": metadata.booking_id,
                "amount": {
                    "currency_code": currency,
                    "value": format_amount(amount),
                },
            }],
        });

        let data = self.post("/v2/checkout/orders", body, "create order").await?;
        data["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderFailure::Rejected("missing order id in PayPal response".to_string()))
    }

    async fn capture(&self, order_id: &str) -> Result<ProviderCapture, ProviderFailure> {
        let data = self
            .post(
                &format!("/v2/checkout/orders/{order_id}/capture"),
                json!({}),
                "capture",
            )
            .await;

        match data {
            Ok(data) => Ok(parse_capture(&data)),
            // A declined instrument is a definitive answer, not an error.
            Err(ProviderFailure::Rejected(msg)) if msg.contains("INSTRUMENT_DECLINED") => {
                tracing::info!(order_id, "PayPal declined the payment instrument");
                Ok(ProviderCapture {
                    status: CaptureStatus::Failed,
                    transaction_id: None,
                    amount: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<(), ProviderFailure> {
        let body = json!({
            "amount": {
                "currency_code": currency,
                "value": format_amount(amount),
            },
        });
        self.post(
            &format!("/v2/payments/captures/{transaction_id}/refund"),
            body,
            "refund",
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completed_capture() {
        let data = json!({
            "id": "ORDER-1",
            "status": "COMPLETED",
            "purchase_units": [{
                "payments": {
                    "captures": [{
                        "id": "CAPTURE-9",
                        "status": "COMPLETED",
                        "amount": {"currency_code": "USD", "value": "5.00"}
                    }]
                }
            }]
        });
        let capture = parse_capture(&data);
        assert_eq!(capture.status, CaptureStatus::Succeeded);
        assert_eq!(capture.transaction_id.as_deref(), Some("CAPTURE-9"));
        assert_eq!(capture.amount, Some(500));
    }

    #[test]
    fn test_parse_declined_capture() {
        let data = json!({
            "id": "ORDER-1",
            "status": "COMPLETED",
            "purchase_units": [{
                "payments": {"captures": [{"id": "CAPTURE-9", "status": "DECLINED"}]}
            }]
        });
        assert_eq!(parse_capture(&data).status, CaptureStatus::Failed);
    }

    #[test]
    fn test_parse_pending_order() {
        let data = json!({"id": "ORDER-1", "status": "PAYER_ACTION_REQUIRED"});
        let capture = parse_capture(&data);
        assert_eq!(capture.status, CaptureStatus::Failed);
        assert_eq!(capture.transaction_id, None);
    }
}
