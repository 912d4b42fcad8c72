//! Quote calculation tests against the public pricing API.

mod common;

use common::{finishing_service, printing_rate, shop_id, sra3_stock, tier};
use quoting_service::models::{ColorMode, PrintSides};
use quoting_service::pricing::costing::{finishing_cost, printing_cost};
use quoting_service::pricing::{
    calculate_quote, quote_totals, sheets_required, units_per_sheet, FinishingSpec, ItemSpec,
    PartSpec, PricingGap, QuoteSpec, ShopRateCatalog,
};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn part(width: rust_decimal::Decimal, height: rust_decimal::Decimal, sides: PrintSides) -> PartSpec {
    PartSpec {
        part_id: Uuid::new_v4(),
        final_width: width,
        final_height: height,
        paper: Some(sra3_stock(dec!(5))),
        machine_id: None,
        color_mode: ColorMode::Color,
        print_sides: sides,
    }
}

fn quote(items: Vec<ItemSpec>) -> QuoteSpec {
    QuoteSpec {
        quote_id: Uuid::new_v4(),
        shop_id: shop_id(),
        tax_rate: dec!(16),
        discount_amount: dec!(50),
        items,
    }
}

#[test]
fn business_cards_fit_25_up_on_sra3() {
    assert_eq!(units_per_sheet(dec!(90), dec!(55), dec!(320), dec!(450)), 25);
    assert_eq!(sheets_required(500, 25), 20);
}

#[test]
fn duplex_override_beats_per_side_price() {
    let rate = printing_rate("SRA3", "COLOR", dec!(15), Some(dec!(25)));
    assert_eq!(printing_cost(Some(&rate), PrintSides::Duplex, 20), dec!(500.00));
    assert_eq!(printing_cost(Some(&rate), PrintSides::Simplex, 20), dec!(300.00));
}

#[test]
fn per_job_finishing_ignores_quantity_and_sheets() {
    let service = finishing_service("PER_JOB", dec!(50));
    assert_eq!(finishing_cost(&service, &[], 500, 20), dec!(50.00));
    assert_eq!(finishing_cost(&service, &[], 5, 1), dec!(50.00));
}

#[test]
fn totals_apply_tax_then_discount() {
    let totals = quote_totals(dec!(1000), dec!(16), dec!(50));
    assert_eq!(totals.tax_amount, dec!(160.00));
    assert_eq!(totals.grand_total, dec!(1110.00));
}

#[test]
fn multi_item_quote_is_priced_end_to_end() {
    let rate = printing_rate("SRA3", "COLOR", dec!(15), Some(dec!(25)));
    let cutting = finishing_service("PER_JOB", dec!(50));
    let lamination = finishing_service("PER_PIECE", dec!(0.80));
    let tiers = vec![
        tier(lamination.service_id, 1, Some(499), dec!(0.50)),
        tier(lamination.service_id, 500, None, dec!(0.30)),
    ];
    let catalog = ShopRateCatalog::new(vec![rate], tiers, Vec::new());

    let cards = ItemSpec {
        item_id: Uuid::new_v4(),
        quantity: 500,
        parts: vec![part(dec!(90), dec!(55), PrintSides::Duplex)],
        finishing: vec![FinishingSpec {
            finishing_id: Uuid::new_v4(),
            service: cutting,
        }],
    };
    // A4 flyers: rotated 1 x 2 beats upright 1 x 1 on SRA3
    let flyers = ItemSpec {
        item_id: Uuid::new_v4(),
        quantity: 1000,
        parts: vec![part(dec!(210), dec!(297), PrintSides::Simplex)],
        finishing: vec![FinishingSpec {
            finishing_id: Uuid::new_v4(),
            service: lamination,
        }],
    };

    let calculation = calculate_quote(&quote(vec![cards, flyers]), &catalog);

    assert!(calculation.gaps.is_empty());

    let cards = &calculation.items[0];
    assert_eq!(cards.total_sheets, 20);
    assert_eq!(cards.parts[0].printing_cost, dec!(500.00));
    assert_eq!(cards.parts[0].material_cost, dec!(100.00));
    assert_eq!(cards.finishing[0].calculated_cost, dec!(50.00));
    assert_eq!(cards.calculated_price, dec!(650.00));

    let flyers = &calculation.items[1];
    assert_eq!(flyers.parts[0].pieces_per_sheet, 2);
    assert_eq!(flyers.total_sheets, 500);
    assert_eq!(flyers.parts[0].printing_cost, dec!(7500.00));
    assert_eq!(flyers.parts[0].material_cost, dec!(2500.00));
    assert_eq!(flyers.finishing[0].calculated_cost, dec!(300.00));
    assert_eq!(flyers.calculated_price, dec!(10300.00));

    assert_eq!(calculation.totals.net_total, dec!(10950.00));
    assert_eq!(calculation.totals.tax_amount, dec!(1752.00));
    assert_eq!(calculation.totals.discount_amount, dec!(50.00));
    assert_eq!(calculation.totals.grand_total, dec!(12652.00));
}

#[test]
fn missing_color_rate_is_reported_not_fatal() {
    let catalog = ShopRateCatalog::new(
        vec![printing_rate("SRA3", "COLOR", dec!(15), None)],
        Vec::new(),
        Vec::new(),
    );
    let mut mono = part(dec!(90), dec!(55), PrintSides::Simplex);
    mono.color_mode = ColorMode::Bw;
    let item = ItemSpec {
        item_id: Uuid::new_v4(),
        quantity: 500,
        parts: vec![mono],
        finishing: Vec::new(),
    };

    let calculation = calculate_quote(&quote(vec![item]), &catalog);

    assert_eq!(calculation.gaps.len(), 1);
    assert!(matches!(
        &calculation.gaps[0],
        PricingGap::MissingPrintingRate { sheet_size, color_mode: ColorMode::Bw, .. } if sheet_size == "SRA3"
    ));
    let priced = &calculation.items[0].parts[0];
    assert_eq!(priced.printing_cost, dec!(0));
    assert_eq!(priced.material_cost, dec!(100.00));

    let json = serde_json::to_value(&calculation.gaps[0]).unwrap();
    assert_eq!(json["kind"], "missing_printing_rate");
    assert_eq!(json["color_mode"], "BW");
}

#[test]
fn per_sheet_tiers_match_on_item_sheets() {
    let cutting = finishing_service("PER_SHEET", dec!(2));
    let tiers = vec![
        tier(cutting.service_id, 1, Some(100), dec!(1.5)),
        tier(cutting.service_id, 101, None, dec!(1)),
    ];

    assert_eq!(finishing_cost(&cutting, &tiers, 500, 20), dec!(30.00));
    assert_eq!(finishing_cost(&cutting, &tiers, 5000, 200), dec!(200.00));
}

#[test]
fn recalculating_an_unchanged_quote_gives_the_same_result() {
    let catalog = ShopRateCatalog::new(
        vec![printing_rate("SRA3", "COLOR", dec!(15), Some(dec!(25)))],
        Vec::new(),
        Vec::new(),
    );
    let spec = quote(vec![ItemSpec {
        item_id: Uuid::new_v4(),
        quantity: 250,
        parts: vec![part(dec!(90), dec!(55), PrintSides::Duplex)],
        finishing: Vec::new(),
    }]);

    assert_eq!(calculate_quote(&spec, &catalog), calculate_quote(&spec, &catalog));
}
