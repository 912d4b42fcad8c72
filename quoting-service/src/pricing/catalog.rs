//! Read-only view of a shop's rate catalog.
//!
//! The engine never queries storage directly. The quote store loads a
//! shop's catalog inside its recalculation transaction and passes it in.

use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{ColorMode, PricingTier, PrintingRate, ShopPaperCapability};

/// Lookups the calculators need from a shop's pricing setup.
pub trait RateCatalog {
    /// Active printing rate for a sheet size and color mode.
    ///
    /// With a machine, a rate for exactly that machine wins over a
    /// machine-agnostic one. Without a machine, a machine-agnostic rate is
    /// preferred, falling back to any machine's rate.
    fn find_printing_rate(
        &self,
        shop_id: Uuid,
        sheet_size: &str,
        color_mode: ColorMode,
        machine_id: Option<Uuid>,
    ) -> Option<&PrintingRate>;

    /// Bulk tiers for a finishing service, ordered by `min_quantity`.
    fn pricing_tiers(&self, service_id: Uuid) -> &[PricingTier];

    /// GSM limits the shop declared for a sheet size.
    fn find_shop_capability(&self, shop_id: Uuid, sheet_size: &str)
        -> Option<&ShopPaperCapability>;
}

/// In-memory catalog snapshot.
#[derive(Debug, Clone, Default)]
pub struct ShopRateCatalog {
    printing_rates: Vec<PrintingRate>,
    tiers: HashMap<Uuid, Vec<PricingTier>>,
    capabilities: Vec<ShopPaperCapability>,
}

impl ShopRateCatalog {
    pub fn new(
        printing_rates: Vec<PrintingRate>,
        tiers: Vec<PricingTier>,
        capabilities: Vec<ShopPaperCapability>,
    ) -> Self {
        let mut by_service: HashMap<Uuid, Vec<PricingTier>> = HashMap::new();
        for tier in tiers {
            by_service.entry(tier.service_id).or_default().push(tier);
        }
        for service_tiers in by_service.values_mut() {
            service_tiers.sort_by_key(|t| t.min_quantity);
        }

        Self {
            printing_rates,
            tiers: by_service,
            capabilities,
        }
    }
}

impl RateCatalog for ShopRateCatalog {
    fn find_printing_rate(
        &self,
        shop_id: Uuid,
        sheet_size: &str,
        color_mode: ColorMode,
        machine_id: Option<Uuid>,
    ) -> Option<&PrintingRate> {
        let mut candidates = self.printing_rates.iter().filter(|r| {
            r.active
                && r.shop_id == shop_id
                && r.sheet_size.eq_ignore_ascii_case(sheet_size)
                && r.color_mode() == color_mode
        });

        match machine_id {
            Some(machine) => candidates
                .clone()
                .find(|r| r.machine_id == Some(machine))
                .or_else(|| candidates.find(|r| r.machine_id.is_none())),
            None => candidates
                .clone()
                .find(|r| r.machine_id.is_none())
                .or_else(|| candidates.next()),
        }
    }

    fn pricing_tiers(&self, service_id: Uuid) -> &[PricingTier] {
        self.tiers
            .get(&service_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn find_shop_capability(
        &self,
        shop_id: Uuid,
        sheet_size: &str,
    ) -> Option<&ShopPaperCapability> {
        self.capabilities
            .iter()
            .find(|c| c.shop_id == shop_id && c.sheet_size.eq_ignore_ascii_case(sheet_size))
    }
}
