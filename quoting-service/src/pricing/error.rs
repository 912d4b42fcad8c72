//! Errors raised by the pricing engine.
//!
//! Missing rates are not errors: they price at zero and are reported as
//! [`PricingGap`](super::PricingGap)s. Only infeasible jobs and broken
//! template configuration abort a calculation.

use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("This template only allows GSM: {}", join_gsm(.allowed))]
    GsmNotAllowed { gsm: u32, allowed: Vec<u32> },

    #[error("This template requires {min}-{max}gsm")]
    GsmOutsideTemplateRange { gsm: u32, min: u32, max: u32 },

    #[error("This template requires at least {min}gsm")]
    GsmBelowTemplateMinimum { gsm: u32, min: u32 },

    #[error("This template allows up to {max}gsm")]
    GsmAboveTemplateMaximum { gsm: u32, max: u32 },

    #[error("This shop supports up to {max}gsm for {sheet_size}")]
    GsmAboveShopMaximum {
        gsm: u32,
        max: u32,
        sheet_size: String,
    },

    #[error("This shop requires at least {min}gsm for {sheet_size}")]
    GsmBelowShopMinimum {
        gsm: u32,
        min: u32,
        sheet_size: String,
    },

    #[error("Minimum quantity is {min}")]
    BelowMinimumQuantity { quantity: u32, min: u32 },

    #[error("Large format requires area_sqm or both width_m and height_m")]
    MissingLargeFormatDimensions,

    #[error("Large format area must be greater than zero")]
    NonPositiveArea,

    #[error("Requested job is too large to price")]
    AmountOverflow,

    #[error("Template allowed GSM values are malformed: {0}")]
    MalformedGsmList(String),
}

fn join_gsm(values: &[u32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl PricingError {
    /// True for errors caused by catalog data rather than the request.
    pub fn is_configuration(&self) -> bool {
        matches!(self, PricingError::MalformedGsmList(_))
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        if err.is_configuration() {
            AppError::ConfigError(anyhow::Error::new(err))
        } else {
            AppError::Infeasible(err.to_string())
        }
    }
}
