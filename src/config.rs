// config.rs
use crate::utils::currency::parse_amount_to_cents;

/// The knobs the referral engine consumes. Built once and handed to the
/// services at construction.
#[derive(Debug, Clone)]
pub struct ProgramConfig {
    pub reward_cents: i64,
    pub discount_cents: i64,
    pub min_job_value_cents: i64,
    pub auto_reward: bool,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            reward_cents: 7_500,
            discount_cents: 5_000,
            min_job_value_cents: 15_000,
            auto_reward: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceTitanConfig {
    pub app_key: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Default)]
pub struct TangoConfig {
    pub account_id: String,
    pub api_key: String,
    pub fund_id: String,
    pub catalog_item: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChiirpConfig {
    pub api_key: String,
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub port: u16,
    pub site_url: String,
    pub referral_page_slug: String,
    pub business_name: String,
    pub support_phone: String,
    pub admin_password: Option<String>,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub webhook_secret: Option<String>,
    pub demo_mode: bool,
    pub log_level: String,
    pub program: ProgramConfig,
    pub service_titan: ServiceTitanConfig,
    pub tango: TangoConfig,
    pub chiirp: ChiirpConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Unset or blank keeps the default; anything else must be a non-negative
/// dollar amount.
fn dollars_setting(key: &str, raw: Option<&str>, default_cents: i64) -> Result<i64, String> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default_cents),
        Some(value) => parse_amount_to_cents(value).map_err(|e| format!("{} must be a dollar amount: {}", key, e)),
    }
}

fn env_dollars(key: &str, default_cents: i64) -> i64 {
    let raw = std::env::var(key).ok();
    dollars_setting(key, raw.as_deref(), default_cents).unwrap_or_else(|e| panic!("{}", e))
}

impl Config {
    pub fn init() -> Config {
        let demo_mode = env_or("DEMO_MODE", "false") == "true";
        let database_url = env_opt("DATABASE_URL");
        if database_url.is_none() && !demo_mode {
            panic!("DATABASE_URL must be set (or DEMO_MODE=true for the in-memory store)");
        }
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");

        let defaults = ProgramConfig::default();
        let program = ProgramConfig {
            reward_cents: env_dollars("REFERRER_REWARD", defaults.reward_cents),
            discount_cents: env_dollars("NEW_CUSTOMER_DISCOUNT", defaults.discount_cents),
            min_job_value_cents: env_dollars("MIN_JOB_VALUE", defaults.min_job_value_cents),
            auto_reward: env_or("TANGO_AUTO_REWARD", "false") == "true",
        };

        Config {
            database_url,
            port: env_or("PORT", "3000").parse::<u16>().unwrap_or(3000),
            site_url: env_or("SITE_URL", "https://example.com"),
            referral_page_slug: env_or("REFERRAL_PAGE_SLUG", "referral"),
            business_name: env_or("BUSINESS_NAME", "our team"),
            support_phone: env_or("SUPPORT_PHONE", ""),
            admin_password: env_opt("ADMIN_PASSWORD"),
            jwt_secret,
            jwt_maxage: env_or("JWT_MAXAGE", "480").parse::<i64>().unwrap_or(480),
            webhook_secret: env_opt("WEBHOOK_SECRET"),
            demo_mode,
            log_level: env_or("LOG_LEVEL", "debug"),
            program,
            service_titan: ServiceTitanConfig {
                app_key: env_or("ST_APP_ID", ""),
                tenant_id: env_or("ST_TENANT_ID", ""),
                client_id: env_or("ST_CLIENT_ID", ""),
                client_secret: env_or("ST_CLIENT_SECRET", ""),
            },
            tango: TangoConfig {
                account_id: env_or("TANGO_ACCOUNT_ID", ""),
                api_key: env_or("TANGO_API_KEY", ""),
                fund_id: env_or("TANGO_FUND_ID", ""),
                catalog_item: env_or("TANGO_DEFAULT_CATALOG_ITEM", "VISA_VIRTUAL"),
            },
            chiirp: ChiirpConfig {
                api_key: env_or("CHIIRP_API_KEY", ""),
                from_number: env_or("CHIIRP_FROM_NUMBER", ""),
            },
        }
    }

    pub fn referral_link(&self, slug: &str) -> String {
        crate::utils::slug::build_referral_link(&self.site_url, &self.referral_page_slug, slug)
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Config {
        Config {
            database_url: None,
            port: 0,
            site_url: "https://example.com".to_string(),
            referral_page_slug: "referral".to_string(),
            business_name: "Test Heating".to_string(),
            support_phone: "(555) 010-0000".to_string(),
            admin_password: Some("hunter2".to_string()),
            jwt_secret: "test-jwt-secret".to_string(),
            jwt_maxage: 60,
            webhook_secret: None,
            demo_mode: true,
            log_level: "debug".to_string(),
            program: ProgramConfig::default(),
            service_titan: ServiceTitanConfig::default(),
            tango: TangoConfig::default(),
            chiirp: ChiirpConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_settings_parse_or_fail_loudly() {
        assert_eq!(dollars_setting("MIN_JOB_VALUE", None, 15_000), Ok(15_000));
        assert_eq!(dollars_setting("MIN_JOB_VALUE", Some("  "), 15_000), Ok(15_000));
        assert_eq!(dollars_setting("MIN_JOB_VALUE", Some("200"), 15_000), Ok(20_000));
        assert_eq!(dollars_setting("REFERRER_REWARD", Some("74.50"), 7_500), Ok(7_450));

        let negative = dollars_setting("MIN_JOB_VALUE", Some("-1"), 15_000).unwrap_err();
        assert!(negative.contains("MIN_JOB_VALUE"));
        assert!(dollars_setting("MIN_JOB_VALUE", Some("lots"), 15_000).is_err());
    }
}
