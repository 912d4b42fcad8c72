//! Quote model for quoting-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Quote lifecycle status.
///
/// `DRAFT → PENDING → SENT → {ACCEPTED, REJECTED, EXPIRED}`, and
/// `ACCEPTED → CONVERTED`. Any open quote may expire. Rejected, expired and
/// converted quotes are archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Draft,
    Pending,
    Sent,
    Accepted,
    Rejected,
    Expired,
    Converted,
}

impl QuoteStatus {
    pub const ALL: [QuoteStatus; 7] = [
        QuoteStatus::Draft,
        QuoteStatus::Pending,
        QuoteStatus::Sent,
        QuoteStatus::Accepted,
        QuoteStatus::Rejected,
        QuoteStatus::Expired,
        QuoteStatus::Converted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "DRAFT",
            QuoteStatus::Pending => "PENDING",
            QuoteStatus::Sent => "SENT",
            QuoteStatus::Accepted => "ACCEPTED",
            QuoteStatus::Rejected => "REJECTED",
            QuoteStatus::Expired => "EXPIRED",
            QuoteStatus::Converted => "CONVERTED",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "PENDING" => QuoteStatus::Pending,
            "SENT" => QuoteStatus::Sent,
            "ACCEPTED" => QuoteStatus::Accepted,
            "REJECTED" => QuoteStatus::Rejected,
            "EXPIRED" => QuoteStatus::Expired,
            "CONVERTED" => QuoteStatus::Converted,
            _ => QuoteStatus::Draft,
        }
    }

    /// Whether a quote in this status may move to `next`.
    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        use QuoteStatus::*;
        matches!(
            (*self, next),
            (Draft, Pending)
                | (Draft, Sent)
                | (Pending, Sent)
                | (Sent, Accepted)
                | (Sent, Rejected)
                | (Draft | Pending | Sent, Expired)
                | (Accepted, Converted)
        )
    }

    /// Items, parts, finishing and pricing inputs may only change, and totals
    /// may only be recalculated, before the customer has answered.
    pub fn is_editable(&self) -> bool {
        matches!(
            self,
            QuoteStatus::Draft | QuoteStatus::Pending | QuoteStatus::Sent
        )
    }

    pub fn is_archived(&self) -> bool {
        matches!(
            self,
            QuoteStatus::Rejected | QuoteStatus::Expired | QuoteStatus::Converted
        )
    }

    /// Text values of every archived status, for list filtering.
    pub fn archived_values() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|s| s.is_archived())
            .map(|s| s.as_str())
            .collect()
    }
}

/// Print sides of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrintSides {
    #[default]
    Simplex,
    Duplex,
}

impl PrintSides {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrintSides::Simplex => "SIMPLEX",
            PrintSides::Duplex => "DUPLEX",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "DUPLEX" => PrintSides::Duplex,
            _ => PrintSides::Simplex,
        }
    }

    /// Number of printed sides per sheet.
    pub fn sides(&self) -> u32 {
        match self {
            PrintSides::Simplex => 1,
            PrintSides::Duplex => 2,
        }
    }
}

/// Color mode a printing rate is quoted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColorMode {
    Bw,
    #[default]
    Color,
    Spot,
}

impl ColorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorMode::Bw => "BW",
            ColorMode::Color => "COLOR",
            ColorMode::Spot => "SPOT",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "BW" => ColorMode::Bw,
            "SPOT" => ColorMode::Spot,
            _ => ColorMode::Color,
        }
    }
}

/// Quote header. Totals are written only by the recalculation pass.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Quote {
    pub quote_id: Uuid,
    pub shop_id: Uuid,
    pub customer_id: Uuid,
    pub reference: Option<String>,
    pub status: String,
    pub net_total: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub grand_total: Decimal,
    pub valid_until: Option<NaiveDate>,
    pub version: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Quote {
    pub fn status(&self) -> QuoteStatus {
        QuoteStatus::from_string(&self.status)
    }
}

/// Line item on a quote.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuoteItem {
    pub item_id: Uuid,
    pub quote_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub calculated_price: Decimal,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// Physical component of a line item (cover, inner pages, ...).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuoteItemPart {
    pub part_id: Uuid,
    pub item_id: Uuid,
    pub name: String,
    pub final_width: Decimal,
    pub final_height: Decimal,
    pub paper_stock_id: Option<Uuid>,
    pub gsm: Option<i32>,
    pub machine_id: Option<Uuid>,
    pub color_mode: String,
    pub print_sides: String,
    pub pieces_per_sheet: i32,
    pub sheets_required: i32,
    pub printing_cost: Decimal,
    pub material_cost: Decimal,
    pub part_cost: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Finishing service attached to a line item.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuoteItemFinishing {
    pub finishing_id: Uuid,
    pub item_id: Uuid,
    pub service_id: Uuid,
    pub calculated_cost: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Line item with its parts and finishing entries.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteItemDetail {
    #[serde(flatten)]
    pub item: QuoteItem,
    pub parts: Vec<QuoteItemPart>,
    pub finishing: Vec<QuoteItemFinishing>,
}

/// Quote with its full item tree.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteDetail {
    #[serde(flatten)]
    pub quote: Quote,
    pub items: Vec<QuoteItemDetail>,
}

/// Input for creating a quote.
#[derive(Debug, Clone)]
pub struct CreateQuote {
    pub shop_id: Uuid,
    pub customer_id: Uuid,
    pub reference: Option<String>,
    pub tax_rate: Decimal,
    pub valid_until: Option<NaiveDate>,
}

/// Input for updating quote-level pricing inputs.
#[derive(Debug, Clone, Default)]
pub struct UpdateQuote {
    pub tax_rate: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub valid_until: Option<NaiveDate>,
}

/// Input for adding a line item.
#[derive(Debug, Clone)]
pub struct CreateQuoteItem {
    pub name: String,
    pub quantity: i32,
    pub sort_order: i32,
}

/// Input for adding a part to a line item.
#[derive(Debug, Clone)]
pub struct CreateQuoteItemPart {
    pub name: String,
    pub final_width: Decimal,
    pub final_height: Decimal,
    pub paper_stock_id: Option<Uuid>,
    pub gsm: Option<i32>,
    pub machine_id: Option<Uuid>,
    pub color_mode: ColorMode,
    pub print_sides: PrintSides,
}

/// Input for attaching a finishing service to a line item.
#[derive(Debug, Clone)]
pub struct CreateQuoteItemFinishing {
    pub service_id: Uuid,
}

/// Input for updating a line item. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateQuoteItem {
    pub name: Option<String>,
    pub quantity: Option<i32>,
    pub sort_order: Option<i32>,
}

/// Input for updating a part. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateQuoteItemPart {
    pub name: Option<String>,
    pub final_width: Option<Decimal>,
    pub final_height: Option<Decimal>,
    pub paper_stock_id: Option<Uuid>,
    pub gsm: Option<i32>,
    pub machine_id: Option<Uuid>,
    pub color_mode: Option<ColorMode>,
    pub print_sides: Option<PrintSides>,
}

/// Input for swapping the service of a finishing entry.
#[derive(Debug, Clone)]
pub struct UpdateQuoteItemFinishing {
    pub service_id: Uuid,
}

/// Filter parameters for listing quotes.
#[derive(Debug, Clone, Default)]
pub struct ListQuotesFilter {
    pub status: Option<QuoteStatus>,
    pub include_archived: bool,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            QuoteStatus::Draft,
            QuoteStatus::Pending,
            QuoteStatus::Sent,
            QuoteStatus::Accepted,
            QuoteStatus::Rejected,
            QuoteStatus::Expired,
            QuoteStatus::Converted,
        ] {
            assert_eq!(QuoteStatus::from_string(status.as_str()), status);
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert!(QuoteStatus::Draft.can_transition_to(QuoteStatus::Pending));
        assert!(QuoteStatus::Pending.can_transition_to(QuoteStatus::Sent));
        assert!(QuoteStatus::Sent.can_transition_to(QuoteStatus::Accepted));
        assert!(QuoteStatus::Sent.can_transition_to(QuoteStatus::Rejected));
        assert!(QuoteStatus::Sent.can_transition_to(QuoteStatus::Expired));
        assert!(QuoteStatus::Accepted.can_transition_to(QuoteStatus::Converted));
    }

    #[test]
    fn test_archived_values() {
        assert_eq!(
            QuoteStatus::archived_values(),
            vec!["REJECTED", "EXPIRED", "CONVERTED"]
        );
    }

    #[test]
    fn test_archived_quotes_do_not_move() {
        for archived in [
            QuoteStatus::Rejected,
            QuoteStatus::Expired,
            QuoteStatus::Converted,
        ] {
            assert!(archived.is_archived());
            assert!(!archived.can_transition_to(QuoteStatus::Draft));
            assert!(!archived.can_transition_to(QuoteStatus::Sent));
        }
        assert!(!QuoteStatus::Draft.can_transition_to(QuoteStatus::Converted));
        assert!(!QuoteStatus::Rejected.can_transition_to(QuoteStatus::Converted));
    }

    #[test]
    fn test_answered_quotes_are_frozen() {
        assert!(QuoteStatus::Draft.is_editable());
        assert!(QuoteStatus::Sent.is_editable());
        assert!(!QuoteStatus::Accepted.is_editable());
        assert!(!QuoteStatus::Converted.is_editable());
    }

    #[test]
    fn test_sides() {
        assert_eq!(PrintSides::Simplex.sides(), 1);
        assert_eq!(PrintSides::Duplex.sides(), 2);
        assert_eq!(PrintSides::from_string("DUPLEX"), PrintSides::Duplex);
        assert_eq!(PrintSides::from_string("anything"), PrintSides::Simplex);
    }
}
