//! Print template models for quoting-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::quote::PrintSides;

/// Public gallery template priced by the demo estimator.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PrintTemplate {
    pub template_id: Uuid,
    pub title: String,
    /// Price for `min_quantity` pieces (digital) or per square meter (large format).
    pub base_price: Decimal,
    pub min_quantity: i32,
    pub default_gsm: Option<i32>,
    pub min_gsm: Option<i32>,
    pub max_gsm: Option<i32>,
    /// Expected to be a JSON array of positive integers.
    pub allowed_gsm_values: Option<serde_json::Value>,
    pub default_print_sides: Option<String>,
    pub created_by_shop_id: Option<Uuid>,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

impl PrintTemplate {
    pub fn default_print_sides(&self) -> Option<PrintSides> {
        self.default_print_sides
            .as_deref()
            .map(PrintSides::from_string)
    }
}

/// Finishing offered on a template.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TemplateFinishing {
    pub template_finishing_id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub is_mandatory: bool,
    /// Charged per sheet.
    pub price_adjustment: Decimal,
    pub display_order: i32,
}

/// Discrete customer-selectable option on a template.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TemplateOption {
    pub option_id: Uuid,
    pub template_id: Uuid,
    pub option_type: String,
    pub label: String,
    pub value: String,
    pub price_modifier: Decimal,
    pub display_order: i32,
}

/// Template with its finishing and option lists.
#[derive(Debug, Clone)]
pub struct TemplateDetails {
    pub template: PrintTemplate,
    pub finishing: Vec<TemplateFinishing>,
    pub options: Vec<TemplateOption>,
}
