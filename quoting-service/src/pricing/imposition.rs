//! Imposition: how many finished pieces fit on one production sheet.
//!
//! Axis-aligned grid packing in both orientations. Bleed, gutters and
//! mixed-orientation layouts are not considered.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Sheet used when a part has no paper stock: A3, 297 x 420 mm.
pub const DEFAULT_SHEET_SIZE: &str = "A3";
pub const DEFAULT_SHEET_WIDTH_MM: Decimal = Decimal::from_parts(297, 0, 0, false, 0);
pub const DEFAULT_SHEET_HEIGHT_MM: Decimal = Decimal::from_parts(420, 0, 0, false, 0);

/// Maximum number of `piece` rectangles on a `sheet`, trying the piece both
/// upright and rotated 90 degrees.
///
/// Returns 0 when the piece fits in neither orientation; otherwise at
/// least 1.
pub fn units_per_sheet(
    piece_width: Decimal,
    piece_height: Decimal,
    sheet_width: Decimal,
    sheet_height: Decimal,
) -> u32 {
    if piece_width <= Decimal::ZERO || piece_height <= Decimal::ZERO {
        return 0;
    }

    let upright_fits = piece_width <= sheet_width && piece_height <= sheet_height;
    let rotated_fits = piece_height <= sheet_width && piece_width <= sheet_height;
    if !upright_fits && !rotated_fits {
        return 0;
    }

    let upright = fit(sheet_width, piece_width).saturating_mul(fit(sheet_height, piece_height));
    let rotated = fit(sheet_width, piece_height).saturating_mul(fit(sheet_height, piece_width));

    upright.max(rotated)
}

fn fit(span: Decimal, piece: Decimal) -> u32 {
    (span / piece).floor().to_u32().unwrap_or(u32::MAX)
}

/// Sheets needed to produce `quantity` pieces at `pieces_per_sheet` up.
/// A count of 0 is treated as 1.
pub fn sheets_required(quantity: u32, pieces_per_sheet: u32) -> u32 {
    quantity.div_ceil(pieces_per_sheet.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_business_cards_on_sra3_prefer_rotation() {
        // upright 3 x 8 = 24, rotated 5 x 5 = 25
        assert_eq!(units_per_sheet(dec!(90), dec!(55), dec!(320), dec!(450)), 25);
    }

    #[test]
    fn test_a4_on_a3_fits_two() {
        assert_eq!(units_per_sheet(dec!(210), dec!(297), dec!(297), dec!(420)), 2);
    }

    #[test]
    fn test_piece_larger_than_sheet_does_not_fit() {
        assert_eq!(units_per_sheet(dec!(500), dec!(700), dec!(320), dec!(450)), 0);
        // fits neither way even though each side is shorter than one sheet side
        assert_eq!(units_per_sheet(dec!(300), dec!(300), dec!(200), dec!(400)), 0);
    }

    #[test]
    fn test_piece_that_only_fits_rotated() {
        assert_eq!(units_per_sheet(dec!(400), dec!(200), dec!(297), dec!(420)), 1);
    }

    #[test]
    fn test_fractional_millimeters_floor() {
        // 297 / 99.5 = 2.98 -> 2 ; 420 / 210 = 2
        assert_eq!(units_per_sheet(dec!(99.5), dec!(210), dec!(297), dec!(420)), 4);
    }

    #[test]
    fn test_degenerate_dimensions_never_fit() {
        assert_eq!(units_per_sheet(dec!(0), dec!(55), dec!(320), dec!(450)), 0);
        assert_eq!(units_per_sheet(dec!(90), dec!(-1), dec!(320), dec!(450)), 0);
        assert_eq!(units_per_sheet(dec!(90), dec!(55), dec!(0), dec!(0)), 0);
    }

    #[test]
    fn test_orientation_invariance() {
        let sizes = [dec!(25), dec!(55), dec!(90), dec!(148), dec!(210), dec!(297)];
        for &pw in &sizes {
            for &ph in &sizes {
                let a = units_per_sheet(pw, ph, dec!(320), dec!(450));
                assert_eq!(a, units_per_sheet(ph, pw, dec!(320), dec!(450)));
                assert_eq!(a, units_per_sheet(pw, ph, dec!(450), dec!(320)));
                assert!(a >= 1, "{}x{} should fit on SRA3", pw, ph);
            }
        }
    }

    #[test]
    fn test_sheets_required_rounds_up() {
        assert_eq!(sheets_required(500, 25), 20);
        assert_eq!(sheets_required(501, 25), 21);
        assert_eq!(sheets_required(0, 25), 0);
    }

    #[test]
    fn test_sheets_required_clamps_zero_up() {
        assert_eq!(sheets_required(7, 0), 7);
    }

    #[test]
    fn test_sheets_required_is_monotonic_in_quantity() {
        let mut previous = 0;
        for quantity in 0..1_000 {
            let sheets = sheets_required(quantity, 24);
            assert!(sheets >= previous);
            previous = sheets;
        }
    }
}
