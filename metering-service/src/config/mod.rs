use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::Secret;
use serde::Deserialize;
use service_core::config::Config as CoreConfig;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Tariff knobs for storage overage and bid charges.
///
/// Amounts are in the configured currency (rubles by default); storage is
/// billed per whole GB above the free allowance, amortized over the hours
/// of the current UTC month.
#[derive(Debug, Deserialize, Clone)]
pub struct TariffConfig {
    pub free_allowance_gb: i64,
    pub monthly_rate_per_gb: Decimal,
    pub bid_cost: Decimal,
    pub signup_bonus: Decimal,
    pub currency: String,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            free_allowance_gb: 5,
            monthly_rate_per_gb: dec!(50),
            bid_cost: dec!(50),
            signup_bonus: dec!(100),
            currency: "RUB".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MeteringConfig {
    pub common: CoreConfig,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub tariff: TariffConfig,
}

impl MeteringConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let port = env::var("METERING_SERVICE_PORT")
            .unwrap_or_else(|_| "3005".to_string())
            .parse()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid METERING_SERVICE_PORT: {}", e))
            })?;

        let db_url = env::var("METERING_DATABASE_URL").map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("METERING_DATABASE_URL must be set"))
        })?;

        let max_connections = parse_env_or("METERING_DB_MAX_CONNECTIONS", 10)?;
        let min_connections = parse_env_or("METERING_DB_MIN_CONNECTIONS", 1)?;

        let tariff = TariffConfig {
            free_allowance_gb: parse_env_or("METERING_FREE_ALLOWANCE_GB", 5)?,
            monthly_rate_per_gb: parse_env_or("METERING_MONTHLY_RATE_PER_GB", dec!(50))?,
            bid_cost: parse_env_or("METERING_BID_COST", dec!(50))?,
            signup_bonus: parse_env_or("METERING_SIGNUP_BONUS", dec!(100))?,
            currency: env::var("METERING_CURRENCY").unwrap_or_else(|_| "RUB".to_string()),
        };

        Ok(Self {
            common: CoreConfig { port },
            service_name: "metering-service".to_string(),
            log_level: env::var("METERING_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("METERING_OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            tariff,
        })
    }
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}
