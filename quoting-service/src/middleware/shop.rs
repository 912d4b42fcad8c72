//! Shop context extractor for multi-tenant quote operations.
//!
//! The shop is identified by the `X-Shop-ID` header, set by the gateway
//! after it has established the caller's shop membership. Every quote query
//! is scoped by this id.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const SHOP_ID_HEADER: &str = "X-Shop-ID";

/// Shop the request acts on behalf of.
#[derive(Debug, Clone, Copy)]
pub struct ShopContext {
    pub shop_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for ShopContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(SHOP_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing X-Shop-ID header")))?;

        let shop_id = Uuid::parse_str(raw.trim()).map_err(|_| {
            AppError::BadRequest(anyhow::anyhow!("Invalid X-Shop-ID header: {}", raw))
        })?;

        tracing::Span::current().record("shop_id", raw);

        Ok(ShopContext { shop_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<ShopContext, AppError> {
        let mut builder = Request::builder().uri("/quotes");
        if let Some(value) = header {
            builder = builder.header(SHOP_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        ShopContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_header_is_parsed() {
        let shop_id = Uuid::new_v4();
        let ctx = extract(Some(&shop_id.to_string())).await.unwrap();
        assert_eq!(ctx.shop_id, shop_id);
    }

    #[tokio::test]
    async fn test_missing_or_invalid_header_is_rejected() {
        assert!(matches!(extract(None).await, Err(AppError::BadRequest(_))));
        assert!(matches!(
            extract(Some("shop-42")).await,
            Err(AppError::BadRequest(_))
        ));
    }
}
