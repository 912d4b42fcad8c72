use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::pricing::{self, TemplatePriceBreakdown, TemplatePriceInput};
use crate::services::metrics::TEMPLATE_ESTIMATES_TOTAL;
use crate::startup::AppState;

/// Public price request for a gallery template.
#[derive(Debug, Deserialize, Validate)]
pub struct TemplatePriceRequest {
    /// Shop whose paper capabilities bound the GSM. Defaults to the shop
    /// that published the template.
    pub shop_id: Option<Uuid>,
    #[serde(flatten)]
    #[validate(nested)]
    pub input: TemplatePriceInput,
}

#[tracing::instrument(skip(state, request), fields(template_id = %template_id))]
pub async fn price_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
    Json(request): Json<TemplatePriceRequest>,
) -> Result<Json<TemplatePriceBreakdown>, AppError> {
    request.validate()?;

    let details = state
        .db
        .get_template_details(template_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Template not found")))?;

    let shop_id = request.shop_id.or(details.template.created_by_shop_id);
    let catalog = state.db.load_capability_catalog(shop_id).await?;

    let mode = if request.input.is_large_format() {
        "large_format"
    } else {
        "digital"
    };

    match pricing::price_template(
        &details,
        &request.input,
        shop_id,
        &catalog,
        &state.config.estimator,
    ) {
        Ok(breakdown) => {
            TEMPLATE_ESTIMATES_TOTAL
                .with_label_values(&[mode, "priced"])
                .inc();
            tracing::info!(total = %breakdown.total, mode, "Template priced");
            Ok(Json(breakdown))
        }
        Err(e) => {
            TEMPLATE_ESTIMATES_TOTAL
                .with_label_values(&[mode, "rejected"])
                .inc();
            tracing::info!(error = %e, mode, "Template configuration rejected");
            Err(e.into())
        }
    }
}
