//! Quote and template pricing engine.
//!
//! Everything here is synchronous and free of I/O. Storage loads the inputs
//! and persists the outputs (see `services::database`).

pub mod aggregator;
pub mod catalog;
pub mod costing;
pub mod error;
pub mod estimator;
pub mod gsm;
pub mod imposition;

pub use aggregator::{
    calculate_quote, quote_totals, FinishingCalculation, FinishingSpec, ItemCalculation, ItemSpec,
    PartCalculation, PartSpec, PricingGap, QuoteCalculation, QuoteSpec, QuoteTotals,
};
pub use catalog::{RateCatalog, ShopRateCatalog};
pub use error::PricingError;
pub use estimator::{
    estimate_template_price, price_template, EstimatorPolicy, TemplatePriceBreakdown,
    TemplatePriceInput,
};
pub use gsm::validate_gsm;
pub use imposition::{sheets_required, units_per_sheet};
