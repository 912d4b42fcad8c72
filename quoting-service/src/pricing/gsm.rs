//! GSM feasibility checks for template pricing.
//!
//! A template either declares an explicit list of allowed paper weights or
//! a min/max band. Independently, the shop that would produce the job may
//! declare limits for the sheet size.

use uuid::Uuid;

use super::catalog::RateCatalog;
use super::error::PricingError;
use crate::models::PrintTemplate;

/// Explicit GSM list declared on a template.
///
/// `Ok(None)` when the template has no list, or an empty one, in which case
/// the min/max band applies.
pub fn allowed_gsm_values(template: &PrintTemplate) -> Result<Option<Vec<u32>>, PricingError> {
    let Some(raw) = template.allowed_gsm_values.as_ref() else {
        return Ok(None);
    };
    if raw.is_null() {
        return Ok(None);
    }

    let entries = raw.as_array().ok_or_else(|| {
        PricingError::MalformedGsmList(format!("expected a list of integers, got {}", raw))
    })?;

    let mut values = entries
        .iter()
        .map(|v| {
            v.as_u64()
                .filter(|gsm| *gsm > 0)
                .and_then(|gsm| u32::try_from(gsm).ok())
                .ok_or_else(|| PricingError::MalformedGsmList(format!("invalid entry {}", v)))
        })
        .collect::<Result<Vec<u32>, _>>()?;

    if values.is_empty() {
        return Ok(None);
    }
    values.sort_unstable();
    values.dedup();
    Ok(Some(values))
}

/// Checks `gsm` against the template's constraints, then against the
/// capability of the effective shop for `sheet_size`.
///
/// The effective shop is `shop_id` when given, otherwise the shop that owns
/// the template. With neither, only template constraints apply.
pub fn validate_gsm(
    template: &PrintTemplate,
    shop_id: Option<Uuid>,
    gsm: u32,
    sheet_size: &str,
    catalog: &dyn RateCatalog,
) -> Result<(), PricingError> {
    match allowed_gsm_values(template)? {
        Some(allowed) => {
            if !allowed.contains(&gsm) {
                return Err(PricingError::GsmNotAllowed { gsm, allowed });
            }
        }
        None => check_template_band(template, gsm)?,
    }

    let Some(shop_id) = shop_id.or(template.created_by_shop_id) else {
        return Ok(());
    };
    let Some(capability) = catalog.find_shop_capability(shop_id, sheet_size) else {
        return Ok(());
    };

    let max = non_negative(capability.max_gsm);
    if gsm > max {
        return Err(PricingError::GsmAboveShopMaximum {
            gsm,
            max,
            sheet_size: sheet_size.to_string(),
        });
    }
    if let Some(min) = capability.min_gsm.map(non_negative) {
        if gsm < min {
            return Err(PricingError::GsmBelowShopMinimum {
                gsm,
                min,
                sheet_size: sheet_size.to_string(),
            });
        }
    }

    Ok(())
}

fn check_template_band(template: &PrintTemplate, gsm: u32) -> Result<(), PricingError> {
    let min = template.min_gsm.map(non_negative);
    let max = template.max_gsm.map(non_negative);

    match (min, max) {
        (Some(min), Some(max)) if gsm < min || gsm > max => {
            Err(PricingError::GsmOutsideTemplateRange { gsm, min, max })
        }
        (Some(min), None) if gsm < min => Err(PricingError::GsmBelowTemplateMinimum { gsm, min }),
        (None, Some(max)) if gsm > max => Err(PricingError::GsmAboveTemplateMaximum { gsm, max }),
        _ => Ok(()),
    }
}

fn non_negative(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShopPaperCapability;
    use crate::pricing::ShopRateCatalog;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn template() -> PrintTemplate {
        PrintTemplate {
            template_id: Uuid::new_v4(),
            title: "Premium Business Cards".to_string(),
            base_price: dec!(1000),
            min_quantity: 100,
            default_gsm: Some(300),
            min_gsm: None,
            max_gsm: None,
            allowed_gsm_values: None,
            default_print_sides: Some("DUPLEX".to_string()),
            created_by_shop_id: None,
            active: true,
            created_utc: Utc::now(),
        }
    }

    fn capability(shop_id: Uuid, min: Option<i32>, max: i32) -> ShopRateCatalog {
        ShopRateCatalog::new(
            vec![],
            vec![],
            vec![ShopPaperCapability {
                capability_id: Uuid::new_v4(),
                shop_id,
                sheet_size: "SRA3".to_string(),
                min_gsm: min,
                max_gsm: max,
            }],
        )
    }

    #[test]
    fn test_allowed_list_membership() {
        let mut t = template();
        t.allowed_gsm_values = Some(json!([400, 300, 350]));
        let catalog = ShopRateCatalog::default();

        assert!(validate_gsm(&t, None, 350, "SRA3", &catalog).is_ok());
        let err = validate_gsm(&t, None, 250, "SRA3", &catalog).unwrap_err();
        assert_eq!(err.to_string(), "This template only allows GSM: 300, 350, 400");
    }

    #[test]
    fn test_allowed_list_overrides_band() {
        let mut t = template();
        t.allowed_gsm_values = Some(json!([600]));
        t.max_gsm = Some(400);
        assert!(validate_gsm(&t, None, 600, "SRA3", &ShopRateCatalog::default()).is_ok());
    }

    #[test]
    fn test_empty_list_falls_back_to_band() {
        let mut t = template();
        t.allowed_gsm_values = Some(json!([]));
        t.min_gsm = Some(250);
        t.max_gsm = Some(350);
        let err = validate_gsm(&t, None, 400, "SRA3", &ShopRateCatalog::default()).unwrap_err();
        assert_eq!(err.to_string(), "This template requires 250-350gsm");
    }

    #[test]
    fn test_malformed_list_is_a_configuration_error() {
        let catalog = ShopRateCatalog::default();
        for raw in [json!("300,350"), json!([300, "heavy"]), json!([0]), json!({"gsm": 300})] {
            let mut t = template();
            t.allowed_gsm_values = Some(raw);
            let err = validate_gsm(&t, None, 300, "SRA3", &catalog).unwrap_err();
            assert!(err.is_configuration(), "{:?}", err);
        }
    }

    #[test]
    fn test_one_sided_template_bands() {
        let catalog = ShopRateCatalog::default();

        let mut t = template();
        t.min_gsm = Some(200);
        let err = validate_gsm(&t, None, 150, "SRA3", &catalog).unwrap_err();
        assert_eq!(err.to_string(), "This template requires at least 200gsm");

        let mut t = template();
        t.max_gsm = Some(350);
        let err = validate_gsm(&t, None, 400, "SRA3", &catalog).unwrap_err();
        assert_eq!(err.to_string(), "This template allows up to 350gsm");
        assert!(validate_gsm(&t, None, 350, "SRA3", &catalog).is_ok());
    }

    #[test]
    fn test_shop_capability_limits() {
        let shop = Uuid::new_v4();
        let catalog = capability(shop, Some(150), 350);
        let t = template();

        let err = validate_gsm(&t, Some(shop), 400, "SRA3", &catalog).unwrap_err();
        assert_eq!(err.to_string(), "This shop supports up to 350gsm for SRA3");

        let err = validate_gsm(&t, Some(shop), 100, "SRA3", &catalog).unwrap_err();
        assert_eq!(err.to_string(), "This shop requires at least 150gsm for SRA3");

        assert!(validate_gsm(&t, Some(shop), 300, "SRA3", &catalog).is_ok());
        // no capability for A4
        assert!(validate_gsm(&t, Some(shop), 400, "A4", &catalog).is_ok());
    }

    #[test]
    fn test_template_owner_is_the_fallback_shop() {
        let owner = Uuid::new_v4();
        let catalog = capability(owner, None, 300);
        let mut t = template();
        t.created_by_shop_id = Some(owner);

        assert!(validate_gsm(&t, None, 350, "SRA3", &catalog).is_err());
        // an explicit shop replaces the owner
        assert!(validate_gsm(&t, Some(Uuid::new_v4()), 350, "SRA3", &catalog).is_ok());
    }
}
