//! Quote handlers.
//!
//! All operations are scoped to the shop from the `X-Shop-ID` header. Every
//! change that can affect price answers with the recalculated quote.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::middleware::ShopContext;
use crate::models::{
    ColorMode, CreateQuote, CreateQuoteItem, CreateQuoteItemFinishing, CreateQuoteItemPart,
    ListQuotesFilter, PrintSides, Quote, QuoteDetail, QuoteItem, QuoteStatus, UpdateQuote,
    UpdateQuoteItem, UpdateQuoteItemFinishing, UpdateQuoteItemPart,
};
use crate::pricing::QuoteCalculation;
use crate::services::RecalculatedQuote;
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuoteRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, max = 50, message = "Reference must be 1-50 characters"))]
    pub reference: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_tax_rate"))]
    pub tax_rate: Decimal,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuoteRequest {
    #[validate(custom(function = "validate_tax_rate"))]
    pub tax_rate: Option<Decimal>,
    #[validate(custom(function = "validate_non_negative"))]
    pub discount_amount: Option<Decimal>,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuoteStatusRequest {
    pub status: QuoteStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(min = 1, max = 150, message = "Name must be 1-150 characters"))]
    pub name: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePartRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(custom(function = "validate_dimension"))]
    pub final_width: Decimal,
    #[validate(custom(function = "validate_dimension"))]
    pub final_height: Decimal,
    pub paper_stock_id: Option<Uuid>,
    #[validate(range(min = 1, max = 2000, message = "GSM must be between 1 and 2000"))]
    pub gsm: Option<i32>,
    pub machine_id: Option<Uuid>,
    #[serde(default)]
    pub color_mode: ColorMode,
    #[serde(default)]
    pub print_sides: PrintSides,
}

#[derive(Debug, Deserialize)]
pub struct CreateFinishingRequest {
    pub service_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, max = 150, message = "Name must be 1-150 characters"))]
    pub name: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: Option<i32>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePartRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(custom(function = "validate_dimension"))]
    pub final_width: Option<Decimal>,
    #[validate(custom(function = "validate_dimension"))]
    pub final_height: Option<Decimal>,
    pub paper_stock_id: Option<Uuid>,
    #[validate(range(min = 1, max = 2000, message = "GSM must be between 1 and 2000"))]
    pub gsm: Option<i32>,
    pub machine_id: Option<Uuid>,
    pub color_mode: Option<ColorMode>,
    pub print_sides: Option<PrintSides>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFinishingRequest {
    pub service_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListQuotesQuery {
    pub status: Option<QuoteStatus>,
    #[serde(default)]
    pub include_archived: bool,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct ListQuotesResponse {
    pub quotes: Vec<Quote>,
    pub count: usize,
}

/// Line item after an update, with the recalculated quote.
#[derive(Debug, Serialize)]
pub struct ItemCalculationResponse {
    pub item: QuoteItem,
    pub quote: Quote,
    pub calculation: QuoteCalculation,
}

/// Quote after a recalculation pass, with the row created by the request
/// when there is one.
#[derive(Debug, Serialize)]
pub struct QuoteCalculationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_id: Option<Uuid>,
    pub quote: Quote,
    pub calculation: QuoteCalculation,
}

impl QuoteCalculationResponse {
    fn new(created_id: Option<Uuid>, result: RecalculatedQuote) -> Self {
        Self {
            created_id,
            quote: result.quote,
            calculation: result.calculation,
        }
    }
}

fn validate_tax_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if *rate < Decimal::ZERO || *rate > Decimal::ONE_HUNDRED {
        let mut err = ValidationError::new("tax_rate");
        err.message = Some("Tax rate must be between 0 and 100".into());
        return Err(err);
    }
    Ok(())
}

fn validate_non_negative(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("Amount cannot be negative".into());
        return Err(err);
    }
    Ok(())
}

/// Part dimensions are stored in millimeters as NUMERIC(10,2).
const MIN_PART_DIMENSION: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
const MAX_PART_DIMENSION: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

fn validate_dimension(value: &Decimal) -> Result<(), ValidationError> {
    if *value < MIN_PART_DIMENSION
        || *value >= MAX_PART_DIMENSION
        || value.normalize().scale() > 2
    {
        let mut err = ValidationError::new("dimension");
        err.message =
            Some("Dimension must be at least 0.01 with at most 2 decimal places".into());
        return Err(err);
    }
    Ok(())
}

#[tracing::instrument(skip(state, request), fields(shop_id = %shop.shop_id))]
pub async fn create_quote(
    State(state): State<AppState>,
    shop: ShopContext,
    Json(request): Json<CreateQuoteRequest>,
) -> Result<(StatusCode, Json<Quote>), AppError> {
    request.validate()?;

    let quote = state
        .db
        .create_quote(&CreateQuote {
            shop_id: shop.shop_id,
            customer_id: request.customer_id,
            reference: request.reference,
            tax_rate: request.tax_rate,
            valid_until: request.valid_until,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(quote)))
}

#[tracing::instrument(skip(state), fields(shop_id = %shop.shop_id))]
pub async fn get_quote(
    State(state): State<AppState>,
    shop: ShopContext,
    Path(quote_id): Path<Uuid>,
) -> Result<Json<QuoteDetail>, AppError> {
    let detail = state
        .db
        .get_quote_detail(shop.shop_id, quote_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Quote not found")))?;

    Ok(Json(detail))
}

#[tracing::instrument(skip(state), fields(shop_id = %shop.shop_id))]
pub async fn list_quotes(
    State(state): State<AppState>,
    shop: ShopContext,
    Query(query): Query<ListQuotesQuery>,
) -> Result<Json<ListQuotesResponse>, AppError> {
    let quotes = state
        .db
        .list_quotes(
            shop.shop_id,
            &ListQuotesFilter {
                status: query.status,
                include_archived: query.include_archived,
                limit: query.limit,
                offset: query.offset,
            },
        )
        .await?;

    Ok(Json(ListQuotesResponse {
        count: quotes.len(),
        quotes,
    }))
}

#[tracing::instrument(skip(state), fields(shop_id = %shop.shop_id))]
pub async fn duplicate_quote(
    State(state): State<AppState>,
    shop: ShopContext,
    Path(quote_id): Path<Uuid>,
) -> Result<(StatusCode, Json<QuoteCalculationResponse>), AppError> {
    let result = state.db.duplicate_quote(shop.shop_id, quote_id).await?;
    let created_id = result.quote.quote_id;

    Ok((
        StatusCode::CREATED,
        Json(QuoteCalculationResponse::new(Some(created_id), result)),
    ))
}

#[tracing::instrument(skip(state, request), fields(shop_id = %shop.shop_id))]
pub async fn update_quote(
    State(state): State<AppState>,
    shop: ShopContext,
    Path(quote_id): Path<Uuid>,
    Json(request): Json<UpdateQuoteRequest>,
) -> Result<Json<QuoteCalculationResponse>, AppError> {
    request.validate()?;

    let result = state
        .db
        .update_quote(
            shop.shop_id,
            quote_id,
            &UpdateQuote {
                tax_rate: request.tax_rate,
                discount_amount: request.discount_amount,
                valid_until: request.valid_until,
            },
        )
        .await?;

    Ok(Json(QuoteCalculationResponse::new(None, result)))
}

#[tracing::instrument(skip(state, request), fields(shop_id = %shop.shop_id))]
pub async fn update_quote_status(
    State(state): State<AppState>,
    shop: ShopContext,
    Path(quote_id): Path<Uuid>,
    Json(request): Json<UpdateQuoteStatusRequest>,
) -> Result<Json<Quote>, AppError> {
    let quote = state
        .db
        .update_quote_status(shop.shop_id, quote_id, request.status)
        .await?;

    Ok(Json(quote))
}

#[tracing::instrument(skip(state, request), fields(shop_id = %shop.shop_id))]
pub async fn add_item(
    State(state): State<AppState>,
    shop: ShopContext,
    Path(quote_id): Path<Uuid>,
    Json(request): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<QuoteCalculationResponse>), AppError> {
    request.validate()?;

    let (item, result) = state
        .db
        .add_item(
            shop.shop_id,
            quote_id,
            &CreateQuoteItem {
                name: request.name,
                quantity: request.quantity,
                sort_order: request.sort_order,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(QuoteCalculationResponse::new(Some(item.item_id), result)),
    ))
}

#[tracing::instrument(skip(state, request), fields(shop_id = %shop.shop_id))]
pub async fn update_item(
    State(state): State<AppState>,
    shop: ShopContext,
    Path((quote_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<ItemCalculationResponse>, AppError> {
    request.validate()?;

    let (item, result) = state
        .db
        .update_item(
            shop.shop_id,
            quote_id,
            item_id,
            &UpdateQuoteItem {
                name: request.name,
                quantity: request.quantity,
                sort_order: request.sort_order,
            },
        )
        .await?;

    Ok(Json(ItemCalculationResponse {
        item,
        quote: result.quote,
        calculation: result.calculation,
    }))
}

#[tracing::instrument(skip(state), fields(shop_id = %shop.shop_id))]
pub async fn delete_item(
    State(state): State<AppState>,
    shop: ShopContext,
    Path((quote_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<QuoteCalculationResponse>, AppError> {
    let result = state.db.delete_item(shop.shop_id, quote_id, item_id).await?;
    Ok(Json(QuoteCalculationResponse::new(None, result)))
}

#[tracing::instrument(skip(state, request), fields(shop_id = %shop.shop_id))]
pub async fn add_part(
    State(state): State<AppState>,
    shop: ShopContext,
    Path((quote_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<CreatePartRequest>,
) -> Result<(StatusCode, Json<QuoteCalculationResponse>), AppError> {
    request.validate()?;

    let (part_id, result) = state
        .db
        .add_part(
            shop.shop_id,
            quote_id,
            item_id,
            &CreateQuoteItemPart {
                name: request.name,
                final_width: request.final_width,
                final_height: request.final_height,
                paper_stock_id: request.paper_stock_id,
                gsm: request.gsm,
                machine_id: request.machine_id,
                color_mode: request.color_mode,
                print_sides: request.print_sides,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(QuoteCalculationResponse::new(Some(part_id), result)),
    ))
}

#[tracing::instrument(skip(state, request), fields(shop_id = %shop.shop_id))]
pub async fn update_part(
    State(state): State<AppState>,
    shop: ShopContext,
    Path((quote_id, item_id, part_id)): Path<(Uuid, Uuid, Uuid)>,
    Json(request): Json<UpdatePartRequest>,
) -> Result<Json<QuoteCalculationResponse>, AppError> {
    request.validate()?;

    let result = state
        .db
        .update_part(
            shop.shop_id,
            quote_id,
            item_id,
            part_id,
            &UpdateQuoteItemPart {
                name: request.name,
                final_width: request.final_width,
                final_height: request.final_height,
                paper_stock_id: request.paper_stock_id,
                gsm: request.gsm,
                machine_id: request.machine_id,
                color_mode: request.color_mode,
                print_sides: request.print_sides,
            },
        )
        .await?;

    Ok(Json(QuoteCalculationResponse::new(None, result)))
}

#[tracing::instrument(skip(state), fields(shop_id = %shop.shop_id))]
pub async fn delete_part(
    State(state): State<AppState>,
    shop: ShopContext,
    Path((quote_id, item_id, part_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<QuoteCalculationResponse>, AppError> {
    let result = state
        .db
        .delete_part(shop.shop_id, quote_id, item_id, part_id)
        .await?;
    Ok(Json(QuoteCalculationResponse::new(None, result)))
}

#[tracing::instrument(skip(state, request), fields(shop_id = %shop.shop_id))]
pub async fn add_finishing(
    State(state): State<AppState>,
    shop: ShopContext,
    Path((quote_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<CreateFinishingRequest>,
) -> Result<(StatusCode, Json<QuoteCalculationResponse>), AppError> {
    let (finishing_id, result) = state
        .db
        .add_finishing(
            shop.shop_id,
            quote_id,
            item_id,
            &CreateQuoteItemFinishing {
                service_id: request.service_id,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(QuoteCalculationResponse::new(Some(finishing_id), result)),
    ))
}

#[tracing::instrument(skip(state, request), fields(shop_id = %shop.shop_id))]
pub async fn update_finishing(
    State(state): State<AppState>,
    shop: ShopContext,
    Path((quote_id, item_id, finishing_id)): Path<(Uuid, Uuid, Uuid)>,
    Json(request): Json<UpdateFinishingRequest>,
) -> Result<Json<QuoteCalculationResponse>, AppError> {
    let result = state
        .db
        .update_finishing(
            shop.shop_id,
            quote_id,
            item_id,
            finishing_id,
            &UpdateQuoteItemFinishing {
                service_id: request.service_id,
            },
        )
        .await?;

    Ok(Json(QuoteCalculationResponse::new(None, result)))
}

#[tracing::instrument(skip(state), fields(shop_id = %shop.shop_id))]
pub async fn delete_finishing(
    State(state): State<AppState>,
    shop: ShopContext,
    Path((quote_id, item_id, finishing_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<QuoteCalculationResponse>, AppError> {
    let result = state
        .db
        .delete_finishing(shop.shop_id, quote_id, item_id, finishing_id)
        .await?;
    Ok(Json(QuoteCalculationResponse::new(None, result)))
}

#[tracing::instrument(skip(state), fields(shop_id = %shop.shop_id))]
pub async fn recalculate_quote(
    State(state): State<AppState>,
    shop: ShopContext,
    Path(quote_id): Path<Uuid>,
) -> Result<Json<QuoteCalculationResponse>, AppError> {
    let result = state.db.recalculate_quote(shop.shop_id, quote_id).await?;
    Ok(Json(QuoteCalculationResponse::new(None, result)))
}
