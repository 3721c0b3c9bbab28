use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub booking_code_prefix: String,
    pub code_generation_attempts: u32,
    pub max_write_retries: u32,
    pub provider_timeout: Duration,
    pub provider_max_retries: u32,
    pub provider_retry_delay: Duration,
    pub min_payment_amount: i64,
    pub paypal_api_base: String,
    pub paypal_client_id: String,
    pub paypal_client_secret: String,
    pub payment_webhook_secret: String,
    pub notify_webhook_url: String,
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT", 3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "appointments.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            booking_code_prefix: env::var("BOOKING_CODE_PREFIX")
                .unwrap_or_else(|_| "BK-".to_string()),
            code_generation_attempts: parsed("CODE_GENERATION_ATTEMPTS", 5),
            max_write_retries: parsed("MAX_WRITE_RETRIES", 3),
            provider_timeout: Duration::from_secs(parsed("PROVIDER_TIMEOUT_SECS", 10)),
            provider_max_retries: parsed("PROVIDER_MAX_RETRIES", 2),
            provider_retry_delay: Duration::from_millis(parsed("PROVIDER_RETRY_DELAY_MS", 200)),
            min_payment_amount: parsed("MIN_PAYMENT_AMOUNT", 100),
            paypal_api_base: env::var("PAYPAL_API_BASE")
                .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string()),
            paypal_client_id: env::var("PAYPAL_CLIENT_ID").unwrap_or_default(),
            paypal_client_secret: env::var("PAYPAL_CLIENT_SECRET").unwrap_or_default(),
            payment_webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET").unwrap_or_default(),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").unwrap_or_default(),
        }
    }
}
