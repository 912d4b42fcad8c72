//! Printing, material and finishing cost calculators.
//!
//! Each calculator is a pure function of already-resolved catalog rows.
//! Resolution (and the decision that a missing row is a gap) happens in
//! the aggregator.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{ChargeBy, FinishingService, PaperStock, PricingTier, PrintSides, PrintingRate};

/// Money precision used for every stored amount.
pub const MONEY_SCALE: u32 = 2;

/// Rounds to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Price of printing one sheet: the duplex override when the job is duplex
/// and one is configured, otherwise price per side times sides.
pub fn per_sheet_print_rate(rate: &PrintingRate, sides: PrintSides) -> Decimal {
    match (sides, rate.duplex_price_per_sheet) {
        (PrintSides::Duplex, Some(duplex)) => duplex,
        _ => rate.selling_price_per_side * Decimal::from(sides.sides()),
    }
}

/// Printing cost of a part. The rate's minimum order quantity sets a floor
/// on billable sheets. No rate prices at zero.
pub fn printing_cost(rate: Option<&PrintingRate>, sides: PrintSides, sheets: u32) -> Decimal {
    let Some(rate) = rate else {
        return Decimal::ZERO;
    };

    let minimum = u32::try_from(rate.minimum_order_quantity).unwrap_or(0);
    let billable = sheets.max(minimum);
    round_money(per_sheet_print_rate(rate, sides) * Decimal::from(billable))
}

/// Paper cost of a part. No stock prices at zero.
pub fn material_cost(stock: Option<&PaperStock>, sheets: u32) -> Decimal {
    stock
        .map(|s| round_money(s.selling_price_per_sheet() * Decimal::from(sheets)))
        .unwrap_or(Decimal::ZERO)
}

/// Quantity a finishing service's bulk tiers are matched against.
pub fn tier_quantity(charge_by: ChargeBy, item_quantity: u32, item_sheets: u32) -> u32 {
    match charge_by {
        ChargeBy::PerSheet | ChargeBy::PerSide | ChargeBy::PerBatch => item_sheets,
        ChargeBy::PerPiece => item_quantity,
        ChargeBy::PerJob => 1,
    }
}

/// Unit rate for a finishing service: the first covering tier (tiers are
/// ordered by `min_quantity`), else the service's own selling price.
pub fn finishing_rate(service: &FinishingService, tiers: &[PricingTier], quantity: u32) -> Decimal {
    tiers
        .iter()
        .find(|t| t.covers(quantity))
        .map(|t| t.price_per_unit)
        .unwrap_or(service.selling_price)
}

/// Cost of one finishing entry on an item.
///
/// `item_sheets` is the total across all of the item's parts, so this must
/// run after every part of the item has been costed.
pub fn finishing_cost(
    service: &FinishingService,
    tiers: &[PricingTier],
    item_quantity: u32,
    item_sheets: u32,
) -> Decimal {
    let charge_by = service.charge_by();
    let rate = finishing_rate(
        service,
        tiers,
        tier_quantity(charge_by, item_quantity, item_sheets),
    );

    let units = match charge_by {
        ChargeBy::PerJob => 1,
        ChargeBy::PerPiece => item_quantity,
        ChargeBy::PerSheet | ChargeBy::PerSide => item_sheets,
        ChargeBy::PerBatch => {
            let batch_size = u32::try_from(service.batch_size).unwrap_or(1).max(1);
            item_sheets.div_ceil(batch_size)
        }
    };

    let cost = rate * Decimal::from(units) + service.setup_fee;
    let minimum = rate * Decimal::from(service.minimum_order_quantity.max(0));
    round_money(cost.max(minimum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn sra3_rate(per_side: Decimal, duplex: Option<Decimal>) -> PrintingRate {
        PrintingRate {
            rate_id: Uuid::new_v4(),
            shop_id: Uuid::new_v4(),
            machine_id: None,
            sheet_size: "SRA3".to_string(),
            color_mode: "COLOR".to_string(),
            selling_price_per_side: per_side,
            duplex_price_per_sheet: duplex,
            minimum_order_quantity: 1,
            active: true,
            created_utc: Utc::now(),
        }
    }

    fn service(charge_by: ChargeBy, price: Decimal) -> FinishingService {
        FinishingService {
            service_id: Uuid::new_v4(),
            shop_id: Uuid::new_v4(),
            name: "Lamination".to_string(),
            charge_by: charge_by.as_str().to_string(),
            selling_price: price,
            batch_size: 1,
            setup_fee: Decimal::ZERO,
            minimum_order_quantity: 0,
            active: true,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn test_duplex_override_is_used_directly() {
        let rate = sra3_rate(dec!(15), Some(dec!(25)));
        assert_eq!(per_sheet_print_rate(&rate, PrintSides::Duplex), dec!(25));
        assert_eq!(
            printing_cost(Some(&rate), PrintSides::Duplex, 20),
            dec!(500.00)
        );
    }

    #[test]
    fn test_duplex_without_override_doubles_side_price() {
        let rate = sra3_rate(dec!(15), None);
        assert_eq!(per_sheet_print_rate(&rate, PrintSides::Duplex), dec!(30));
        assert_eq!(per_sheet_print_rate(&rate, PrintSides::Simplex), dec!(15));
    }

    #[test]
    fn test_simplex_ignores_duplex_override() {
        let rate = sra3_rate(dec!(15), Some(dec!(25)));
        assert_eq!(
            printing_cost(Some(&rate), PrintSides::Simplex, 10),
            dec!(150.00)
        );
    }

    #[test]
    fn test_printing_minimum_order_quantity_sets_billable_floor() {
        let mut rate = sra3_rate(dec!(10), None);
        rate.minimum_order_quantity = 50;
        assert_eq!(
            printing_cost(Some(&rate), PrintSides::Simplex, 20),
            dec!(500.00)
        );
        assert_eq!(
            printing_cost(Some(&rate), PrintSides::Simplex, 80),
            dec!(800.00)
        );
    }

    #[test]
    fn test_missing_rate_and_paper_cost_nothing() {
        assert_eq!(printing_cost(None, PrintSides::Duplex, 20), Decimal::ZERO);
        assert_eq!(material_cost(None, 20), Decimal::ZERO);
    }

    #[test]
    fn test_per_job_finishing_ignores_volume() {
        let binding = service(ChargeBy::PerJob, dec!(50));
        assert_eq!(finishing_cost(&binding, &[], 500, 20), dec!(50.00));
    }

    #[test]
    fn test_per_piece_and_per_sheet_finishing() {
        let per_piece = service(ChargeBy::PerPiece, dec!(2));
        assert_eq!(finishing_cost(&per_piece, &[], 500, 20), dec!(1000.00));

        let per_sheet = service(ChargeBy::PerSheet, dec!(3));
        assert_eq!(finishing_cost(&per_sheet, &[], 500, 20), dec!(60.00));
    }

    #[test]
    fn test_per_batch_rounds_batches_up() {
        let mut creasing = service(ChargeBy::PerBatch, dec!(100));
        creasing.batch_size = 1000;
        assert_eq!(finishing_cost(&creasing, &[], 1, 1200), dec!(200.00));

        creasing.batch_size = 0;
        assert_eq!(finishing_cost(&creasing, &[], 1, 3), dec!(300.00));
    }

    #[test]
    fn test_setup_fee_and_minimum() {
        let mut cutting = service(ChargeBy::PerSheet, dec!(2));
        cutting.setup_fee = dec!(15);
        assert_eq!(finishing_cost(&cutting, &[], 100, 10), dec!(35.00));

        cutting.setup_fee = Decimal::ZERO;
        cutting.minimum_order_quantity = 25;
        assert_eq!(finishing_cost(&cutting, &[], 100, 10), dec!(50.00));
    }

    #[test]
    fn test_bulk_tier_replaces_service_price() {
        let binding = service(ChargeBy::PerPiece, dec!(60));
        let tier = |min: i32, max: Option<i32>, price: Decimal| PricingTier {
            tier_id: Uuid::new_v4(),
            service_id: binding.service_id,
            min_quantity: min,
            max_quantity: max,
            price_per_unit: price,
        };
        let tiers = vec![
            tier(1, Some(50), dec!(50)),
            tier(51, Some(100), dec!(40)),
            tier(101, None, dec!(30)),
        ];

        assert_eq!(finishing_cost(&binding, &tiers, 30, 1), dec!(1500.00));
        assert_eq!(finishing_cost(&binding, &tiers, 75, 1), dec!(3000.00));
        assert_eq!(finishing_cost(&binding, &tiers, 200, 1), dec!(6000.00));
        assert_eq!(finishing_cost(&binding, &tiers[..1], 200, 1), dec!(12000.00));
    }

    #[test]
    fn test_tier_quantity_by_charge_mode() {
        assert_eq!(tier_quantity(ChargeBy::PerSheet, 500, 20), 20);
        assert_eq!(tier_quantity(ChargeBy::PerSide, 500, 20), 20);
        assert_eq!(tier_quantity(ChargeBy::PerBatch, 500, 20), 20);
        assert_eq!(tier_quantity(ChargeBy::PerPiece, 500, 20), 500);
        assert_eq!(tier_quantity(ChargeBy::PerJob, 500, 20), 1);
    }

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(dec!(0.125)), dec!(0.13));
        assert_eq!(round_money(dec!(-0.125)), dec!(-0.13));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
    }
}
