//! Configuration module for quoting-service.

use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

use crate::models::PrintSides;
use crate::pricing::EstimatorPolicy;

#[derive(Debug, Clone)]
pub struct QuotingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub estimator: EstimatorPolicy,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl QuotingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "quoting-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            estimator: estimator_policy_from_env()?,
        })
    }
}

/// Estimator heuristics, each overridable with an `ESTIMATOR_*` variable.
fn estimator_policy_from_env() -> Result<EstimatorPolicy, AppError> {
    let defaults = EstimatorPolicy::default();

    Ok(EstimatorPolicy {
        duplex_multiplier: parse_var("ESTIMATOR_DUPLEX_MULTIPLIER")?
            .unwrap_or(defaults.duplex_multiplier),
        gsm_step: parse_var("ESTIMATOR_GSM_STEP")?.unwrap_or(defaults.gsm_step),
        gsm_step_surcharge: parse_var("ESTIMATOR_GSM_STEP_SURCHARGE")?
            .unwrap_or(defaults.gsm_step_surcharge),
        printing_share: parse_var::<Decimal>("ESTIMATOR_PRINTING_SHARE")?
            .unwrap_or(defaults.printing_share),
        material_share: parse_var::<Decimal>("ESTIMATOR_MATERIAL_SHARE")?
            .unwrap_or(defaults.material_share),
        default_gsm: parse_var("ESTIMATOR_DEFAULT_GSM")?.unwrap_or(defaults.default_gsm),
        default_print_sides: env::var("ESTIMATOR_DEFAULT_PRINT_SIDES")
            .ok()
            .map(|s| PrintSides::from_string(&s.to_uppercase()))
            .unwrap_or(defaults.default_print_sides),
        default_sheet_size: env::var("ESTIMATOR_DEFAULT_SHEET_SIZE")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.default_sheet_size),
    })
}

fn parse_var<T>(name: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map(Some).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", name, e))
        }),
        _ => Ok(None),
    }
}
