//! Demo price estimates for public templates.
//!
//! No shop rates are consulted. The template's base price is split into
//! printing and material shares and adjusted with fixed heuristics, which
//! live in [`EstimatorPolicy`] so deployments can tune them.
//!
//! Large-format templates are priced by area instead: the base price is read
//! as a price per square meter and printing is bundled into material.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::catalog::RateCatalog;
use super::costing::round_money;
use super::error::PricingError;
use super::gsm::validate_gsm;
use crate::models::{PrintSides, PrintTemplate, TemplateDetails};

/// Duplex costs 1.4x simplex, not 2x.
pub const DUPLEX_MULTIPLIER: Decimal = Decimal::from_parts(14, 0, 0, false, 1);
/// Material surcharge for each full step above the template's default GSM.
pub const GSM_STEP_SURCHARGE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);
pub const GSM_STEP: u32 = 50;
pub const PRINTING_SHARE: Decimal = Decimal::from_parts(6, 0, 0, false, 1);
pub const MATERIAL_SHARE: Decimal = Decimal::from_parts(4, 0, 0, false, 1);
pub const DEFAULT_GSM: u32 = 300;
pub const DEFAULT_TEMPLATE_SHEET_SIZE: &str = "A4";
pub const DEMO_NOTE: &str = "Demo estimate only - actual price may vary";

/// Smallest accepted width, height or area.
pub const MIN_DIMENSION: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
/// Largest value that fits ten digits with four decimal places.
pub const MAX_DIMENSION: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 4);
pub const DIMENSION_DECIMAL_PLACES: u32 = 4;

/// Pricing heuristics used by the estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorPolicy {
    pub duplex_multiplier: Decimal,
    pub gsm_step: u32,
    pub gsm_step_surcharge: Decimal,
    pub printing_share: Decimal,
    pub material_share: Decimal,
    pub default_gsm: u32,
    pub default_print_sides: PrintSides,
    pub default_sheet_size: String,
}

impl Default for EstimatorPolicy {
    fn default() -> Self {
        Self {
            duplex_multiplier: DUPLEX_MULTIPLIER,
            gsm_step: GSM_STEP,
            gsm_step_surcharge: GSM_STEP_SURCHARGE,
            printing_share: PRINTING_SHARE,
            material_share: MATERIAL_SHARE,
            default_gsm: DEFAULT_GSM,
            default_print_sides: PrintSides::Duplex,
            default_sheet_size: DEFAULT_TEMPLATE_SHEET_SIZE.to_string(),
        }
    }
}

impl EstimatorPolicy {
    /// Multiplier for printing relative to the sides the base price assumes.
    pub fn duplex_multiplier(&self, default_sides: PrintSides, requested: PrintSides) -> Decimal {
        if requested == default_sides || self.duplex_multiplier.is_zero() {
            Decimal::ONE
        } else if requested == PrintSides::Duplex {
            self.duplex_multiplier
        } else {
            Decimal::ONE / self.duplex_multiplier
        }
    }

    /// `1 + surcharge * floor(max(0, gsm - default) / step)`.
    pub fn gsm_factor(&self, default_gsm: u32, gsm: u32) -> Decimal {
        if self.gsm_step == 0 {
            return Decimal::ONE;
        }
        let steps = gsm.saturating_sub(default_gsm) / self.gsm_step;
        Decimal::ONE + self.gsm_step_surcharge * Decimal::from(steps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaperType {
    Gloss,
    Matte,
    Bond,
    Art,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaterialType {
    #[default]
    Banner,
    Vinyl,
    Reflective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasureUnit {
    #[default]
    Sheet,
    Sqm,
}

/// Customer's requested configuration of a template.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct TemplatePriceInput {
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    pub sheet_size: Option<String>,
    pub print_sides: Option<PrintSides>,
    #[validate(range(min = 60, max = 500, message = "GSM must be between 60 and 500"))]
    pub gsm: Option<u32>,
    pub paper_type: Option<PaperType>,
    pub unit: Option<MeasureUnit>,
    #[validate(custom(function = "validate_dimension"))]
    pub width_m: Option<Decimal>,
    #[validate(custom(function = "validate_dimension"))]
    pub height_m: Option<Decimal>,
    #[validate(custom(function = "validate_dimension"))]
    pub area_sqm: Option<Decimal>,
    pub material_type: Option<MaterialType>,
    #[serde(default)]
    pub selected_option_ids: Vec<Uuid>,
    #[serde(default)]
    pub selected_finishing_ids: Vec<Uuid>,
}

impl TemplatePriceInput {
    /// Area-based pricing applies when the request is shaped like a
    /// large-format job.
    pub fn is_large_format(&self) -> bool {
        self.unit == Some(MeasureUnit::Sqm)
            || self.area_sqm.is_some()
            || (self.width_m.is_some() && self.height_m.is_some())
            || self.material_type.is_some()
    }

    fn area_sqm(&self) -> Result<Decimal, PricingError> {
        let area = match (self.area_sqm, self.width_m, self.height_m) {
            (Some(area), _, _) => area,
            (None, Some(width), Some(height)) => width
                .checked_mul(height)
                .ok_or(PricingError::AmountOverflow)?,
            _ => return Err(PricingError::MissingLargeFormatDimensions),
        };
        if area <= Decimal::ZERO {
            return Err(PricingError::NonPositiveArea);
        }
        Ok(area)
    }
}

fn validate_dimension(value: &Decimal) -> Result<(), ValidationError> {
    if *value < MIN_DIMENSION
        || *value > MAX_DIMENSION
        || value.normalize().scale() > DIMENSION_DECIMAL_PLACES
    {
        let mut err = ValidationError::new("dimension");
        err.message = Some(
            "Dimensions must be between 0.01 and 999999.9999 with at most 4 decimal places".into(),
        );
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateMode {
    Digital,
    LargeFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrintingEstimate {
    pub amount: Decimal,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_sides: Option<PrintSides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sides: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplex_multiplier: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialEstimate {
    pub amount: Decimal,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_gsm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsm_factor: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_type: Option<PaperType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_sqm: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material_type: Option<MaterialType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishingLine {
    pub template_finishing_id: Uuid,
    pub name: String,
    pub is_mandatory: bool,
    pub price_per_unit: Decimal,
    pub quantity: u32,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishingEstimate {
    pub amount: Decimal,
    pub items: Vec<FinishingLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionsEstimate {
    pub amount: Decimal,
    pub selected_option_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplatePriceBreakdown {
    pub template_id: Uuid,
    pub mode: EstimateMode,
    pub printing: PrintingEstimate,
    pub material: MaterialEstimate,
    pub finishing: FinishingEstimate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsEstimate>,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub notes: Vec<String>,
}

/// Validates GSM feasibility, then estimates.
///
/// GSM only constrains sheet-based jobs; large-format requests skip the
/// check.
pub fn price_template(
    details: &TemplateDetails,
    input: &TemplatePriceInput,
    shop_id: Option<Uuid>,
    catalog: &dyn RateCatalog,
    policy: &EstimatorPolicy,
) -> Result<TemplatePriceBreakdown, PricingError> {
    if !input.is_large_format() {
        let gsm = requested_gsm(&details.template, input, policy);
        let sheet_size = input
            .sheet_size
            .as_deref()
            .unwrap_or(&policy.default_sheet_size);
        validate_gsm(&details.template, shop_id, gsm, sheet_size, catalog)?;
    }
    estimate_template_price(details, input, policy)
}

/// Estimates a template price without any shop rate lookups.
pub fn estimate_template_price(
    details: &TemplateDetails,
    input: &TemplatePriceInput,
    policy: &EstimatorPolicy,
) -> Result<TemplatePriceBreakdown, PricingError> {
    let template = &details.template;
    let min_quantity = u32::try_from(template.min_quantity).unwrap_or(0);
    if input.quantity < min_quantity {
        return Err(PricingError::BelowMinimumQuantity {
            quantity: input.quantity,
            min: min_quantity,
        });
    }

    if input.is_large_format() {
        estimate_large_format(details, input)
    } else {
        Ok(estimate_digital(details, input, policy))
    }
}

fn requested_gsm(template: &PrintTemplate, input: &TemplatePriceInput, policy: &EstimatorPolicy) -> u32 {
    input.gsm.unwrap_or_else(|| template_default_gsm(template, policy))
}

fn template_default_gsm(template: &PrintTemplate, policy: &EstimatorPolicy) -> u32 {
    template
        .default_gsm
        .and_then(|gsm| u32::try_from(gsm).ok())
        .filter(|gsm| *gsm > 0)
        .unwrap_or(policy.default_gsm)
}

fn estimate_digital(
    details: &TemplateDetails,
    input: &TemplatePriceInput,
    policy: &EstimatorPolicy,
) -> TemplatePriceBreakdown {
    let template = &details.template;
    let quantity = Decimal::from(input.quantity);

    let default_sides = template
        .default_print_sides()
        .unwrap_or(policy.default_print_sides);
    let print_sides = input.print_sides.unwrap_or(default_sides);
    let default_gsm = template_default_gsm(template, policy);
    let gsm = input.gsm.unwrap_or(default_gsm);

    // base price covers min_quantity pieces
    let unit_price = template.base_price / Decimal::from(template.min_quantity.max(1));

    let duplex_multiplier = policy.duplex_multiplier(default_sides, print_sides);
    let printing_amount =
        round_money(unit_price * policy.printing_share * duplex_multiplier * quantity);

    let gsm_factor = policy.gsm_factor(default_gsm, gsm);
    let material_amount = round_money(unit_price * policy.material_share * gsm_factor * quantity);

    let finishing = estimate_finishing(details, input);

    let selected_options: Vec<_> = details
        .options
        .iter()
        .filter(|o| input.selected_option_ids.contains(&o.option_id))
        .collect();
    let options = (!selected_options.is_empty()).then(|| OptionsEstimate {
        amount: round_money(selected_options.iter().map(|o| o.price_modifier).sum()),
        selected_option_ids: selected_options.iter().map(|o| o.option_id).collect(),
    });
    let options_amount = options.as_ref().map_or(Decimal::ZERO, |o| o.amount);

    let subtotal = printing_amount + material_amount + finishing.amount + options_amount;

    TemplatePriceBreakdown {
        template_id: template.template_id,
        mode: EstimateMode::Digital,
        printing: PrintingEstimate {
            amount: printing_amount,
            quantity: input.quantity,
            print_sides: Some(print_sides),
            sides: Some(print_sides.sides()),
            duplex_multiplier: Some(duplex_multiplier),
            sheet_size: Some(
                input
                    .sheet_size
                    .clone()
                    .unwrap_or_else(|| policy.default_sheet_size.clone()),
            ),
            note: None,
        },
        material: MaterialEstimate {
            amount: material_amount,
            quantity: input.quantity,
            gsm: Some(gsm),
            default_gsm: Some(default_gsm),
            gsm_factor: Some(gsm_factor),
            paper_type: input.paper_type,
            area_sqm: None,
            material_type: None,
        },
        finishing,
        options,
        subtotal,
        total: subtotal,
        notes: vec![DEMO_NOTE.to_string()],
    }
}

fn estimate_large_format(
    details: &TemplateDetails,
    input: &TemplatePriceInput,
) -> Result<TemplatePriceBreakdown, PricingError> {
    let template = &details.template;
    let area_sqm = input.area_sqm()?;

    let material_amount = template
        .base_price
        .checked_mul(area_sqm)
        .and_then(|amount| amount.checked_mul(Decimal::from(input.quantity)))
        .map(round_money)
        .ok_or(PricingError::AmountOverflow)?;
    let finishing = estimate_finishing(details, input);
    let subtotal = material_amount + finishing.amount;

    Ok(TemplatePriceBreakdown {
        template_id: template.template_id,
        mode: EstimateMode::LargeFormat,
        printing: PrintingEstimate {
            amount: Decimal::ZERO,
            quantity: input.quantity,
            print_sides: None,
            sides: None,
            duplex_multiplier: None,
            sheet_size: None,
            note: Some("Bundled with material for large format".to_string()),
        },
        material: MaterialEstimate {
            amount: material_amount,
            quantity: input.quantity,
            gsm: None,
            default_gsm: None,
            gsm_factor: None,
            paper_type: None,
            area_sqm: Some(area_sqm),
            material_type: Some(input.material_type.unwrap_or_default()),
        },
        finishing,
        options: None,
        subtotal,
        total: subtotal,
        notes: vec![DEMO_NOTE.to_string()],
    })
}

/// Mandatory finishing always applies; optional finishing only when
/// selected. Both are charged per sheet at `price_adjustment`.
fn estimate_finishing(details: &TemplateDetails, input: &TemplatePriceInput) -> FinishingEstimate {
    let quantity = Decimal::from(input.quantity);

    let items: Vec<FinishingLine> = details
        .finishing
        .iter()
        .filter(|f| f.is_mandatory || input.selected_finishing_ids.contains(&f.template_finishing_id))
        .map(|f| FinishingLine {
            template_finishing_id: f.template_finishing_id,
            name: f.name.clone(),
            is_mandatory: f.is_mandatory,
            price_per_unit: f.price_adjustment,
            quantity: input.quantity,
            total: round_money(f.price_adjustment * quantity),
        })
        .collect();

    FinishingEstimate {
        amount: items.iter().map(|i| i.total).sum(),
        items,
    }
}
