//! Quote aggregation.
//!
//! Runs in two pure phases so that finishing never observes a partially
//! costed item:
//!
//! 1. every part of every item is imposed and costed, producing per-item
//!    sheet totals;
//! 2. every finishing entry is costed from its item's quantity and sheet
//!    total.
//!
//! Item prices, net total, tax and grand total follow. Missing rates never
//! fail a calculation; they price at zero and are returned as
//! [`PricingGap`]s.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::catalog::RateCatalog;
use super::costing::{finishing_cost, material_cost, printing_cost, round_money};
use super::imposition::{
    sheets_required, units_per_sheet, DEFAULT_SHEET_HEIGHT_MM, DEFAULT_SHEET_SIZE,
    DEFAULT_SHEET_WIDTH_MM,
};
use crate::models::{ColorMode, FinishingService, PaperStock, PrintSides};

/// A part as the engine sees it, with its paper stock already resolved.
#[derive(Debug, Clone)]
pub struct PartSpec {
    pub part_id: Uuid,
    pub final_width: Decimal,
    pub final_height: Decimal,
    pub paper: Option<PaperStock>,
    pub machine_id: Option<Uuid>,
    pub color_mode: ColorMode,
    pub print_sides: PrintSides,
}

/// A finishing entry with its service already resolved.
#[derive(Debug, Clone)]
pub struct FinishingSpec {
    pub finishing_id: Uuid,
    pub service: FinishingService,
}

#[derive(Debug, Clone)]
pub struct ItemSpec {
    pub item_id: Uuid,
    pub quantity: u32,
    pub parts: Vec<PartSpec>,
    pub finishing: Vec<FinishingSpec>,
}

#[derive(Debug, Clone)]
pub struct QuoteSpec {
    pub quote_id: Uuid,
    pub shop_id: Uuid,
    /// Percentage, e.g. 16 for 16%.
    pub tax_rate: Decimal,
    pub discount_amount: Decimal,
    pub items: Vec<ItemSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartCalculation {
    pub part_id: Uuid,
    pub sheet_size: String,
    pub pieces_per_sheet: u32,
    pub sheets_required: u32,
    pub printing_cost: Decimal,
    pub material_cost: Decimal,
    pub part_cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishingCalculation {
    pub finishing_id: Uuid,
    pub service_id: Uuid,
    pub calculated_cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemCalculation {
    pub item_id: Uuid,
    pub total_sheets: u32,
    pub parts: Vec<PartCalculation>,
    pub finishing: Vec<FinishingCalculation>,
    pub calculated_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuoteTotals {
    pub net_total: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub grand_total: Decimal,
}

/// Catalog data a part could not be priced against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PricingGap {
    MissingPrintingRate {
        item_id: Uuid,
        part_id: Uuid,
        sheet_size: String,
        color_mode: ColorMode,
    },
    MissingPaper {
        item_id: Uuid,
        part_id: Uuid,
    },
}

impl PricingGap {
    pub fn kind(&self) -> &'static str {
        match self {
            PricingGap::MissingPrintingRate { .. } => "missing_printing_rate",
            PricingGap::MissingPaper { .. } => "missing_paper",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteCalculation {
    pub quote_id: Uuid,
    pub items: Vec<ItemCalculation>,
    pub totals: QuoteTotals,
    pub gaps: Vec<PricingGap>,
}

/// Phase one output for a single item.
struct CostedParts {
    parts: Vec<PartCalculation>,
    total_sheets: u32,
}

/// Prices a whole quote against a shop catalog.
pub fn calculate_quote(spec: &QuoteSpec, catalog: &dyn RateCatalog) -> QuoteCalculation {
    let mut gaps = Vec::new();

    let costed: Vec<CostedParts> = spec
        .items
        .iter()
        .map(|item| cost_parts(spec.shop_id, item, catalog, &mut gaps))
        .collect();

    let items: Vec<ItemCalculation> = spec
        .items
        .iter()
        .zip(costed)
        .map(|(item, parts)| cost_finishing(item, parts, catalog))
        .collect();

    let net_total = items.iter().map(|i| i.calculated_price).sum();
    let totals = quote_totals(net_total, spec.tax_rate, spec.discount_amount);

    QuoteCalculation {
        quote_id: spec.quote_id,
        items,
        totals,
        gaps,
    }
}

/// Tax and grand total from a net total.
pub fn quote_totals(net_total: Decimal, tax_rate: Decimal, discount_amount: Decimal) -> QuoteTotals {
    let net_total = round_money(net_total);
    let tax_amount = round_money(net_total * tax_rate / Decimal::ONE_HUNDRED);
    let discount_amount = round_money(discount_amount);

    QuoteTotals {
        net_total,
        tax_amount,
        discount_amount,
        grand_total: net_total + tax_amount - discount_amount,
    }
}

fn cost_parts(
    shop_id: Uuid,
    item: &ItemSpec,
    catalog: &dyn RateCatalog,
    gaps: &mut Vec<PricingGap>,
) -> CostedParts {
    let mut total_sheets: u32 = 0;
    let mut parts = Vec::with_capacity(item.parts.len());

    for part in &item.parts {
        let (sheet_size, sheet_width, sheet_height) = match &part.paper {
            Some(paper) => (paper.sheet_size.as_str(), paper.width_mm, paper.height_mm),
            None => {
                tracing::warn!(
                    item_id = %item.item_id,
                    part_id = %part.part_id,
                    "Part has no paper stock, using default sheet with zero material cost"
                );
                gaps.push(PricingGap::MissingPaper {
                    item_id: item.item_id,
                    part_id: part.part_id,
                });
                (DEFAULT_SHEET_SIZE, DEFAULT_SHEET_WIDTH_MM, DEFAULT_SHEET_HEIGHT_MM)
            }
        };

        let pieces_per_sheet =
            units_per_sheet(part.final_width, part.final_height, sheet_width, sheet_height).max(1);
        let sheets = sheets_required(item.quantity, pieces_per_sheet);

        let rate =
            catalog.find_printing_rate(shop_id, sheet_size, part.color_mode, part.machine_id);
        if rate.is_none() {
            tracing::warn!(
                item_id = %item.item_id,
                part_id = %part.part_id,
                sheet_size,
                color_mode = part.color_mode.as_str(),
                "No printing rate configured, printing priced at zero"
            );
            gaps.push(PricingGap::MissingPrintingRate {
                item_id: item.item_id,
                part_id: part.part_id,
                sheet_size: sheet_size.to_string(),
                color_mode: part.color_mode,
            });
        }

        let printing = printing_cost(rate, part.print_sides, sheets);
        let material = material_cost(part.paper.as_ref(), sheets);

        total_sheets = total_sheets.saturating_add(sheets);
        parts.push(PartCalculation {
            part_id: part.part_id,
            sheet_size: sheet_size.to_string(),
            pieces_per_sheet,
            sheets_required: sheets,
            printing_cost: printing,
            material_cost: material,
            part_cost: printing + material,
        });
    }

    CostedParts {
        parts,
        total_sheets,
    }
}

fn cost_finishing(item: &ItemSpec, costed: CostedParts, catalog: &dyn RateCatalog) -> ItemCalculation {
    let finishing: Vec<FinishingCalculation> = item
        .finishing
        .iter()
        .map(|entry| FinishingCalculation {
            finishing_id: entry.finishing_id,
            service_id: entry.service.service_id,
            calculated_cost: finishing_cost(
                &entry.service,
                catalog.pricing_tiers(entry.service.service_id),
                item.quantity,
                costed.total_sheets,
            ),
        })
        .collect();

    let parts_total: Decimal = costed.parts.iter().map(|p| p.part_cost).sum();
    let finishing_total: Decimal = finishing.iter().map(|f| f.calculated_cost).sum();

    ItemCalculation {
        item_id: item.item_id,
        total_sheets: costed.total_sheets,
        parts: costed.parts,
        finishing,
        calculated_price: parts_total + finishing_total,
    }
}
