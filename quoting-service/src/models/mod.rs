//! Domain models for quoting-service.

mod quote;
mod rates;
mod template;

pub use quote::{
    ColorMode, CreateQuote, CreateQuoteItem, CreateQuoteItemFinishing, CreateQuoteItemPart,
    ListQuotesFilter, PrintSides, Quote, QuoteDetail, QuoteItem, QuoteItemDetail,
    QuoteItemFinishing, QuoteItemPart, QuoteStatus, UpdateQuote, UpdateQuoteItem,
    UpdateQuoteItemFinishing, UpdateQuoteItemPart,
};
pub use rates::{
    ChargeBy, FinishingService, PaperPriceUnit, PaperStock, PricingTier, PrintingRate,
    ShopPaperCapability,
};
pub use template::{PrintTemplate, TemplateDetails, TemplateFinishing, TemplateOption};
