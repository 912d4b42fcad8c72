//! Shop rate catalog models for quoting-service.
//!
//! These rows are owned by the shop's pricing setup and are read-only to the
//! calculation engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::quote::ColorMode;

/// Printing rate for a (shop, sheet size, color mode, machine) combination.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PrintingRate {
    pub rate_id: Uuid,
    pub shop_id: Uuid,
    pub machine_id: Option<Uuid>,
    pub sheet_size: String,
    pub color_mode: String,
    pub selling_price_per_side: Decimal,
    pub duplex_price_per_sheet: Option<Decimal>,
    pub minimum_order_quantity: i32,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

impl PrintingRate {
    pub fn color_mode(&self) -> ColorMode {
        ColorMode::from_string(&self.color_mode)
    }
}

/// How a paper stock's selling price is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaperPriceUnit {
    #[default]
    PerSheet,
    PerSqm,
}

impl PaperPriceUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperPriceUnit::PerSheet => "PER_SHEET",
            PaperPriceUnit::PerSqm => "PER_SQM",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "PER_SQM" => PaperPriceUnit::PerSqm,
            _ => PaperPriceUnit::PerSheet,
        }
    }
}

/// Paper stock a part is printed on.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaperStock {
    pub stock_id: Uuid,
    pub shop_id: Uuid,
    pub name: String,
    pub sheet_size: String,
    pub width_mm: Decimal,
    pub height_mm: Decimal,
    pub gsm: Option<i32>,
    pub price_unit: String,
    pub selling_price: Decimal,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

impl PaperStock {
    pub fn price_unit(&self) -> PaperPriceUnit {
        PaperPriceUnit::from_string(&self.price_unit)
    }

    /// Selling price of one sheet of this stock.
    pub fn selling_price_per_sheet(&self) -> Decimal {
        match self.price_unit() {
            PaperPriceUnit::PerSheet => self.selling_price,
            PaperPriceUnit::PerSqm => {
                let area_sqm = self.width_mm * self.height_mm / Decimal::from(1_000_000);
                self.selling_price * area_sqm
            }
        }
    }
}

/// Unit a finishing service's price is multiplied against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeBy {
    #[default]
    PerSheet,
    PerSide,
    PerPiece,
    PerJob,
    PerBatch,
}

impl ChargeBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeBy::PerSheet => "PER_SHEET",
            ChargeBy::PerSide => "PER_SIDE",
            ChargeBy::PerPiece => "PER_PIECE",
            ChargeBy::PerJob => "PER_JOB",
            ChargeBy::PerBatch => "PER_BATCH",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "PER_SIDE" => ChargeBy::PerSide,
            "PER_PIECE" => ChargeBy::PerPiece,
            "PER_JOB" => ChargeBy::PerJob,
            "PER_BATCH" => ChargeBy::PerBatch,
            _ => ChargeBy::PerSheet,
        }
    }
}

/// Finishing service offered by a shop (lamination, binding, cutting, ...).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FinishingService {
    pub service_id: Uuid,
    pub shop_id: Uuid,
    pub name: String,
    pub charge_by: String,
    pub selling_price: Decimal,
    pub batch_size: i32,
    pub setup_fee: Decimal,
    pub minimum_order_quantity: i32,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

impl FinishingService {
    pub fn charge_by(&self) -> ChargeBy {
        ChargeBy::from_string(&self.charge_by)
    }
}

/// Bulk price band for a finishing service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricingTier {
    pub tier_id: Uuid,
    pub service_id: Uuid,
    pub min_quantity: i32,
    pub max_quantity: Option<i32>,
    pub price_per_unit: Decimal,
}

impl PricingTier {
    pub fn covers(&self, quantity: u32) -> bool {
        let quantity = i64::from(quantity);
        i64::from(self.min_quantity) <= quantity
            && self.max_quantity.map_or(true, |max| quantity <= i64::from(max))
    }
}

/// Paper weights a shop can run for one sheet size.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShopPaperCapability {
    pub capability_id: Uuid,
    pub shop_id: Uuid,
    pub sheet_size: String,
    pub min_gsm: Option<i32>,
    pub max_gsm: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn stock(price_unit: PaperPriceUnit, price: Decimal) -> PaperStock {
        PaperStock {
            stock_id: Uuid::new_v4(),
            shop_id: Uuid::new_v4(),
            name: "Art Board 300gsm".to_string(),
            sheet_size: "SRA3".to_string(),
            width_mm: dec!(320),
            height_mm: dec!(450),
            gsm: Some(300),
            price_unit: price_unit.as_str().to_string(),
            selling_price: price,
            active: true,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn test_per_sheet_price_is_used_directly() {
        let s = stock(PaperPriceUnit::PerSheet, dec!(12.50));
        assert_eq!(s.selling_price_per_sheet(), dec!(12.50));
    }

    #[test]
    fn test_per_sqm_price_scales_by_sheet_area() {
        // 320 x 450 mm = 0.144 sqm
        let s = stock(PaperPriceUnit::PerSqm, dec!(100));
        assert_eq!(s.selling_price_per_sheet(), dec!(14.4));
    }

    #[test]
    fn test_tier_bounds_are_inclusive() {
        let tier = PricingTier {
            tier_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            min_quantity: 51,
            max_quantity: Some(100),
            price_per_unit: dec!(40),
        };
        assert!(!tier.covers(50));
        assert!(tier.covers(51));
        assert!(tier.covers(100));
        assert!(!tier.covers(101));

        let open_ended = PricingTier {
            max_quantity: None,
            min_quantity: 101,
            ..tier
        };
        assert!(open_ended.covers(10_000));
    }

    #[test]
    fn test_unknown_charge_by_defaults_to_per_sheet() {
        assert_eq!(ChargeBy::from_string("PER_JOB"), ChargeBy::PerJob);
        assert_eq!(ChargeBy::from_string(""), ChargeBy::PerSheet);
    }
}
