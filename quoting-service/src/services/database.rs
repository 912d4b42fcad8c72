//! Database service for quoting-service.
//!
//! Every mutation that can change a quote's price runs the full
//! recalculation pass inside the same transaction: the quote row is locked
//! with `SELECT ... FOR UPDATE`, the shop catalog is loaded, the pure engine
//! runs, every calculated column is rewritten and the quote `version` is
//! bumped. Concurrent passes on one quote therefore serialize, and a failed
//! pass leaves the stored totals untouched.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    ColorMode, CreateQuote, CreateQuoteItem, CreateQuoteItemFinishing, CreateQuoteItemPart,
    FinishingService, ListQuotesFilter, PaperStock, PricingTier, PrintSides, PrintTemplate,
    PrintingRate, Quote, QuoteDetail, QuoteItem, QuoteItemDetail, QuoteItemFinishing,
    QuoteItemPart, QuoteStatus, ShopPaperCapability, TemplateDetails, TemplateFinishing,
    TemplateOption, UpdateQuote, UpdateQuoteItem, UpdateQuoteItemFinishing, UpdateQuoteItemPart,
};
use crate::pricing::{
    calculate_quote, FinishingSpec, ItemSpec, PartSpec, QuoteCalculation, QuoteSpec,
    ShopRateCatalog,
};
use crate::services::metrics::{DB_QUERY_DURATION, PRICING_GAPS_TOTAL, QUOTES_TOTAL, RECALCULATIONS_TOTAL};

/// Quote header as stored after a recalculation pass, with the pass result.
#[derive(Debug, Clone)]
pub struct RecalculatedQuote {
    pub quote: Quote,
    pub calculation: QuoteCalculation,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "quoting-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Create a pool that connects on first use.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(database_url)
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Invalid database URL: {}", e)))?;
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Quote Operations
    // -------------------------------------------------------------------------

    /// Create an empty draft quote.
    #[instrument(skip(self, input), fields(shop_id = %input.shop_id, customer_id = %input.customer_id))]
    pub async fn create_quote(&self, input: &CreateQuote) -> Result<Quote, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_quote"])
            .start_timer();

        let quote_id = Uuid::new_v4();
        let quote = sqlx::query_as::<_, Quote>(
            r#"
            INSERT INTO quotes (quote_id, shop_id, customer_id, reference, status, tax_rate, valid_until)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING quote_id, shop_id, customer_id, reference, status, net_total, tax_rate, tax_amount,
                      discount_amount, grand_total, valid_until, version, created_utc, updated_utc
            "#,
        )
        .bind(quote_id)
        .bind(input.shop_id)
        .bind(input.customer_id)
        .bind(&input.reference)
        .bind(QuoteStatus::Draft.as_str())
        .bind(input.tax_rate)
        .bind(input.valid_until)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create quote: {}", e)))?;

        timer.observe_duration();

        QUOTES_TOTAL.with_label_values(&["draft"]).inc();
        info!(quote_id = %quote.quote_id, "Quote created");

        Ok(quote)
    }

    /// Get a quote header by ID, scoped to a shop.
    #[instrument(skip(self), fields(shop_id = %shop_id, quote_id = %quote_id))]
    pub async fn get_quote(&self, shop_id: Uuid, quote_id: Uuid) -> Result<Option<Quote>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_quote"])
            .start_timer();

        let quote = sqlx::query_as::<_, Quote>(
            r#"
            SELECT quote_id, shop_id, customer_id, reference, status, net_total, tax_rate, tax_amount,
                   discount_amount, grand_total, valid_until, version, created_utc, updated_utc
            FROM quotes
            WHERE shop_id = $1 AND quote_id = $2
            "#,
        )
        .bind(shop_id)
        .bind(quote_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get quote: {}", e)))?;

        timer.observe_duration();

        Ok(quote)
    }

    /// Get a quote with its items, parts and finishing entries.
    #[instrument(skip(self), fields(shop_id = %shop_id, quote_id = %quote_id))]
    pub async fn get_quote_detail(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
    ) -> Result<Option<QuoteDetail>, AppError> {
        let Some(quote) = self.get_quote(shop_id, quote_id).await? else {
            return Ok(None);
        };

        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_quote_detail"])
            .start_timer();

        let mut conn = self.pool.acquire().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to acquire connection: {}", e))
        })?;
        let items = fetch_items(&mut conn, quote_id).await?;
        let item_ids: Vec<Uuid> = items.iter().map(|i| i.item_id).collect();
        let parts = fetch_parts(&mut conn, &item_ids).await?;
        let finishing = fetch_finishing(&mut conn, &item_ids).await?;

        timer.observe_duration();

        let mut parts_by_item = group_by(parts, |p| p.item_id);
        let mut finishing_by_item = group_by(finishing, |f| f.item_id);

        let items = items
            .into_iter()
            .map(|item| QuoteItemDetail {
                parts: parts_by_item.remove(&item.item_id).unwrap_or_default(),
                finishing: finishing_by_item.remove(&item.item_id).unwrap_or_default(),
                item,
            })
            .collect();

        Ok(Some(QuoteDetail { quote, items }))
    }

    /// List a shop's quotes, newest first. Archived quotes are hidden unless
    /// requested or filtered for by status.
    #[instrument(skip(self, filter), fields(shop_id = %shop_id))]
    pub async fn list_quotes(
        &self,
        shop_id: Uuid,
        filter: &ListQuotesFilter,
    ) -> Result<Vec<Quote>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_quotes"])
            .start_timer();

        let limit = filter.limit.clamp(1, 100);
        let offset = filter.offset.max(0);
        let status = filter.status.map(|s| s.as_str());
        let include_archived =
            filter.include_archived || filter.status.is_some_and(|s| s.is_archived());

        let quotes = sqlx::query_as::<_, Quote>(
            r#"
            SELECT quote_id, shop_id, customer_id, reference, status, net_total, tax_rate, tax_amount,
                   discount_amount, grand_total, valid_until, version, created_utc, updated_utc
            FROM quotes
            WHERE shop_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::bool = TRUE OR status <> ALL($4))
            ORDER BY created_utc DESC, quote_id
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(shop_id)
        .bind(status)
        .bind(include_archived)
        .bind(QuoteStatus::archived_values())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list quotes: {}", e)))?;

        timer.observe_duration();

        Ok(quotes)
    }

    /// Copy a quote's items, parts and finishing into a new draft and price
    /// it. Any quote may be duplicated, whatever its status.
    #[instrument(skip(self), fields(shop_id = %shop_id, quote_id = %quote_id))]
    pub async fn duplicate_quote(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
    ) -> Result<RecalculatedQuote, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["duplicate_quote"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let source = lock_quote(&mut tx, shop_id, quote_id).await?;

        let copy = sqlx::query_as::<_, Quote>(
            r#"
            INSERT INTO quotes (quote_id, shop_id, customer_id, reference, status, tax_rate, discount_amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING quote_id, shop_id, customer_id, reference, status, net_total, tax_rate, tax_amount,
                      discount_amount, grand_total, valid_until, version, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(source.shop_id)
        .bind(source.customer_id)
        .bind(source.reference.as_deref().map(copy_reference))
        .bind(QuoteStatus::Draft.as_str())
        .bind(source.tax_rate)
        .bind(source.discount_amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to copy quote: {}", e)))?;

        let items = fetch_items(&mut tx, source.quote_id).await?;
        let item_ids: Vec<Uuid> = items.iter().map(|i| i.item_id).collect();
        let mut parts_by_item = group_by(fetch_parts(&mut tx, &item_ids).await?, |p| p.item_id);
        let mut finishing_by_item =
            group_by(fetch_finishing(&mut tx, &item_ids).await?, |f| f.item_id);

        for item in &items {
            let new_item_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO quote_items (item_id, quote_id, name, quantity, sort_order)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(new_item_id)
            .bind(copy.quote_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.sort_order)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to copy item: {}", e)))?;

            for part in parts_by_item.remove(&item.item_id).unwrap_or_default() {
                sqlx::query(
                    r#"
                    INSERT INTO quote_item_parts (part_id, item_id, name, final_width, final_height,
                                                  paper_stock_id, gsm, machine_id, color_mode, print_sides)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(new_item_id)
                .bind(&part.name)
                .bind(part.final_width)
                .bind(part.final_height)
                .bind(part.paper_stock_id)
                .bind(part.gsm)
                .bind(part.machine_id)
                .bind(&part.color_mode)
                .bind(&part.print_sides)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to copy part: {}", e))
                })?;
            }

            for entry in finishing_by_item.remove(&item.item_id).unwrap_or_default() {
                sqlx::query(
                    "INSERT INTO quote_item_finishing (finishing_id, item_id, service_id) VALUES ($1, $2, $3)",
                )
                .bind(Uuid::new_v4())
                .bind(new_item_id)
                .bind(entry.service_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to copy finishing: {}", e))
                })?;
            }
        }

        let result = recalculate_locked(&mut tx, &copy, "duplicate_quote").await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        QUOTES_TOTAL.with_label_values(&["draft"]).inc();
        info!(
            source_quote_id = %source.quote_id,
            quote_id = %copy.quote_id,
            items = items.len(),
            "Quote duplicated"
        );

        Ok(result)
    }

    /// Update tax rate, discount or validity, then recalculate.
    #[instrument(skip(self, input), fields(shop_id = %shop_id, quote_id = %quote_id))]
    pub async fn update_quote(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
        input: &UpdateQuote,
    ) -> Result<RecalculatedQuote, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_quote"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quote = lock_editable_quote(&mut tx, shop_id, quote_id).await?;

        let quote = sqlx::query_as::<_, Quote>(
            r#"
            UPDATE quotes
            SET tax_rate = COALESCE($3, tax_rate),
                discount_amount = COALESCE($4, discount_amount),
                valid_until = COALESCE($5, valid_until),
                updated_utc = NOW()
            WHERE shop_id = $1 AND quote_id = $2
            RETURNING quote_id, shop_id, customer_id, reference, status, net_total, tax_rate, tax_amount,
                      discount_amount, grand_total, valid_until, version, created_utc, updated_utc
            "#,
        )
        .bind(quote.shop_id)
        .bind(quote.quote_id)
        .bind(input.tax_rate)
        .bind(input.discount_amount)
        .bind(input.valid_until)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update quote: {}", e)))?;

        let result = recalculate_locked(&mut tx, &quote, "update_quote").await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(result)
    }

    /// Move a quote to another lifecycle status.
    ///
    /// Returns `Conflict` for transitions the lifecycle does not allow.
    #[instrument(skip(self), fields(shop_id = %shop_id, quote_id = %quote_id, status = %next.as_str()))]
    pub async fn update_quote_status(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
        next: QuoteStatus,
    ) -> Result<Quote, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_quote_status"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quote = lock_quote(&mut tx, shop_id, quote_id).await?;
        let current = quote.status();
        if !current.can_transition_to(next) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Cannot move quote from {} to {}",
                current.as_str(),
                next.as_str()
            )));
        }

        let quote = sqlx::query_as::<_, Quote>(
            r#"
            UPDATE quotes
            SET status = $3, updated_utc = NOW()
            WHERE shop_id = $1 AND quote_id = $2
            RETURNING quote_id, shop_id, customer_id, reference, status, net_total, tax_rate, tax_amount,
                      discount_amount, grand_total, valid_until, version, created_utc, updated_utc
            "#,
        )
        .bind(shop_id)
        .bind(quote_id)
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update quote status: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        QUOTES_TOTAL
            .with_label_values(&[&next.as_str().to_lowercase()])
            .inc();
        info!(from = current.as_str(), to = next.as_str(), "Quote status changed");

        Ok(quote)
    }

    /// Add a line item and recalculate.
    #[instrument(skip(self, input), fields(shop_id = %shop_id, quote_id = %quote_id))]
    pub async fn add_item(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
        input: &CreateQuoteItem,
    ) -> Result<(QuoteItem, RecalculatedQuote), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_item"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quote = lock_editable_quote(&mut tx, shop_id, quote_id).await?;

        let item = sqlx::query_as::<_, QuoteItem>(
            r#"
            INSERT INTO quote_items (item_id, quote_id, name, quantity, sort_order)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING item_id, quote_id, name, quantity, calculated_price, sort_order, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(quote_id)
        .bind(&input.name)
        .bind(input.quantity)
        .bind(input.sort_order)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add item: {}", e)))?;

        let result = recalculate_locked(&mut tx, &quote, "add_item").await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(item_id = %item.item_id, quantity = item.quantity, "Quote item added");

        let item = refreshed_item(item, &result);
        Ok((item, result))
    }

    /// Update a line item and recalculate.
    #[instrument(skip(self, input), fields(shop_id = %shop_id, quote_id = %quote_id, item_id = %item_id))]
    pub async fn update_item(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
        item_id: Uuid,
        input: &UpdateQuoteItem,
    ) -> Result<(QuoteItem, RecalculatedQuote), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_item"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quote = lock_editable_quote(&mut tx, shop_id, quote_id).await?;

        let item = sqlx::query_as::<_, QuoteItem>(
            r#"
            UPDATE quote_items
            SET name = COALESCE($3, name),
                quantity = COALESCE($4, quantity),
                sort_order = COALESCE($5, sort_order)
            WHERE item_id = $1 AND quote_id = $2
            RETURNING item_id, quote_id, name, quantity, calculated_price, sort_order, created_utc
            "#,
        )
        .bind(item_id)
        .bind(quote_id)
        .bind(&input.name)
        .bind(input.quantity)
        .bind(input.sort_order)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update item: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Quote item not found: {}", item_id)))?;

        let result = recalculate_locked(&mut tx, &quote, "update_item").await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(quantity = item.quantity, "Quote item updated");

        let item = refreshed_item(item, &result);
        Ok((item, result))
    }

    /// Remove a line item with its parts and finishing, then recalculate.
    #[instrument(skip(self), fields(shop_id = %shop_id, quote_id = %quote_id, item_id = %item_id))]
    pub async fn delete_item(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
        item_id: Uuid,
    ) -> Result<RecalculatedQuote, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_item"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quote = lock_editable_quote(&mut tx, shop_id, quote_id).await?;

        let deleted = sqlx::query("DELETE FROM quote_items WHERE item_id = $1 AND quote_id = $2")
            .bind(item_id)
            .bind(quote_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete item: {}", e)))?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Quote item not found: {}",
                item_id
            )));
        }

        let result = recalculate_locked(&mut tx, &quote, "delete_item").await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!("Quote item deleted");

        Ok(result)
    }

    /// Add a part to a line item and recalculate.
    ///
    /// The paper stock, when given, must belong to the quote's shop.
    #[instrument(skip(self, input), fields(shop_id = %shop_id, quote_id = %quote_id, item_id = %item_id))]
    pub async fn add_part(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
        item_id: Uuid,
        input: &CreateQuoteItemPart,
    ) -> Result<(Uuid, RecalculatedQuote), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_part"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quote = lock_editable_quote(&mut tx, shop_id, quote_id).await?;
        ensure_item_on_quote(&mut tx, quote_id, item_id).await?;

        if let Some(stock_id) = input.paper_stock_id {
            ensure_stock_available(&mut tx, shop_id, stock_id).await?;
        }

        let part_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO quote_item_parts (part_id, item_id, name, final_width, final_height, paper_stock_id,
                                          gsm, machine_id, color_mode, print_sides)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING part_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(item_id)
        .bind(&input.name)
        .bind(input.final_width)
        .bind(input.final_height)
        .bind(input.paper_stock_id)
        .bind(input.gsm)
        .bind(input.machine_id)
        .bind(input.color_mode.as_str())
        .bind(input.print_sides.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add part: {}", e)))?;

        let result = recalculate_locked(&mut tx, &quote, "add_part").await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(part_id = %part_id, "Quote item part added");

        Ok((part_id, result))
    }

    /// Update a part and recalculate.
    ///
    /// A new paper stock must belong to the quote's shop.
    #[instrument(skip(self, input), fields(shop_id = %shop_id, quote_id = %quote_id, part_id = %part_id))]
    pub async fn update_part(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
        item_id: Uuid,
        part_id: Uuid,
        input: &UpdateQuoteItemPart,
    ) -> Result<RecalculatedQuote, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_part"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quote = lock_editable_quote(&mut tx, shop_id, quote_id).await?;
        ensure_item_on_quote(&mut tx, quote_id, item_id).await?;

        if let Some(stock_id) = input.paper_stock_id {
            ensure_stock_available(&mut tx, shop_id, stock_id).await?;
        }

        sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE quote_item_parts
            SET name = COALESCE($3, name),
                final_width = COALESCE($4, final_width),
                final_height = COALESCE($5, final_height),
                paper_stock_id = COALESCE($6, paper_stock_id),
                gsm = COALESCE($7, gsm),
                machine_id = COALESCE($8, machine_id),
                color_mode = COALESCE($9, color_mode),
                print_sides = COALESCE($10, print_sides)
            WHERE part_id = $1 AND item_id = $2
            RETURNING part_id
            "#,
        )
        .bind(part_id)
        .bind(item_id)
        .bind(&input.name)
        .bind(input.final_width)
        .bind(input.final_height)
        .bind(input.paper_stock_id)
        .bind(input.gsm)
        .bind(input.machine_id)
        .bind(input.color_mode.map(|m| m.as_str()))
        .bind(input.print_sides.map(|s| s.as_str()))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update part: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Quote item part not found: {}", part_id)))?;

        let result = recalculate_locked(&mut tx, &quote, "update_part").await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!("Quote item part updated");

        Ok(result)
    }

    /// Remove a part and recalculate.
    #[instrument(skip(self), fields(shop_id = %shop_id, quote_id = %quote_id, part_id = %part_id))]
    pub async fn delete_part(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
        item_id: Uuid,
        part_id: Uuid,
    ) -> Result<RecalculatedQuote, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_part"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quote = lock_editable_quote(&mut tx, shop_id, quote_id).await?;
        ensure_item_on_quote(&mut tx, quote_id, item_id).await?;

        let deleted = sqlx::query("DELETE FROM quote_item_parts WHERE part_id = $1 AND item_id = $2")
            .bind(part_id)
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete part: {}", e)))?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Quote item part not found: {}",
                part_id
            )));
        }

        let result = recalculate_locked(&mut tx, &quote, "delete_part").await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!("Quote item part deleted");

        Ok(result)
    }

    /// Attach a finishing service to a line item and recalculate.
    ///
    /// The service must be an active service of the quote's shop.
    #[instrument(skip(self, input), fields(shop_id = %shop_id, quote_id = %quote_id, item_id = %item_id))]
    pub async fn add_finishing(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
        item_id: Uuid,
        input: &CreateQuoteItemFinishing,
    ) -> Result<(Uuid, RecalculatedQuote), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_finishing"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quote = lock_editable_quote(&mut tx, shop_id, quote_id).await?;
        ensure_item_on_quote(&mut tx, quote_id, item_id).await?;

        ensure_service_offered(&mut tx, shop_id, input.service_id).await?;

        let finishing_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO quote_item_finishing (finishing_id, item_id, service_id)
            VALUES ($1, $2, $3)
            RETURNING finishing_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(item_id)
        .bind(input.service_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add finishing: {}", e)))?;

        let result = recalculate_locked(&mut tx, &quote, "add_finishing").await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(finishing_id = %finishing_id, service_id = %input.service_id, "Quote item finishing added");

        Ok((finishing_id, result))
    }

    /// Swap the service of a finishing entry and recalculate.
    #[instrument(skip(self, input), fields(shop_id = %shop_id, quote_id = %quote_id, finishing_id = %finishing_id))]
    pub async fn update_finishing(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
        item_id: Uuid,
        finishing_id: Uuid,
        input: &UpdateQuoteItemFinishing,
    ) -> Result<RecalculatedQuote, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_finishing"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quote = lock_editable_quote(&mut tx, shop_id, quote_id).await?;
        ensure_item_on_quote(&mut tx, quote_id, item_id).await?;
        ensure_service_offered(&mut tx, shop_id, input.service_id).await?;

        sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE quote_item_finishing
            SET service_id = $3
            WHERE finishing_id = $1 AND item_id = $2
            RETURNING finishing_id
            "#,
        )
        .bind(finishing_id)
        .bind(item_id)
        .bind(input.service_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update finishing: {}", e)))?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Quote item finishing not found: {}", finishing_id))
        })?;

        let result = recalculate_locked(&mut tx, &quote, "update_finishing").await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(service_id = %input.service_id, "Quote item finishing updated");

        Ok(result)
    }

    /// Remove a finishing entry and recalculate.
    #[instrument(skip(self), fields(shop_id = %shop_id, quote_id = %quote_id, finishing_id = %finishing_id))]
    pub async fn delete_finishing(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
        item_id: Uuid,
        finishing_id: Uuid,
    ) -> Result<RecalculatedQuote, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_finishing"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quote = lock_editable_quote(&mut tx, shop_id, quote_id).await?;
        ensure_item_on_quote(&mut tx, quote_id, item_id).await?;

        let deleted =
            sqlx::query("DELETE FROM quote_item_finishing WHERE finishing_id = $1 AND item_id = $2")
                .bind(finishing_id)
                .bind(item_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to delete finishing: {}", e))
                })?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Quote item finishing not found: {}",
                finishing_id
            )));
        }

        let result = recalculate_locked(&mut tx, &quote, "delete_finishing").await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!("Quote item finishing deleted");

        Ok(result)
    }

    /// Run a full recalculation pass on demand.
    #[instrument(skip(self), fields(shop_id = %shop_id, quote_id = %quote_id))]
    pub async fn recalculate_quote(
        &self,
        shop_id: Uuid,
        quote_id: Uuid,
    ) -> Result<RecalculatedQuote, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["recalculate_quote"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quote = lock_editable_quote(&mut tx, shop_id, quote_id).await?;
        let result = recalculate_locked(&mut tx, &quote, "on_demand").await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Template Operations
    // -------------------------------------------------------------------------

    /// Get an active template with its finishing and option lists.
    #[instrument(skip(self), fields(template_id = %template_id))]
    pub async fn get_template_details(
        &self,
        template_id: Uuid,
    ) -> Result<Option<TemplateDetails>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_template_details"])
            .start_timer();

        let template = sqlx::query_as::<_, PrintTemplate>(
            r#"
            SELECT template_id, title, base_price, min_quantity, default_gsm, min_gsm, max_gsm,
                   allowed_gsm_values, default_print_sides, created_by_shop_id, active, created_utc
            FROM print_templates
            WHERE template_id = $1 AND active = TRUE
            "#,
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get template: {}", e)))?;

        let Some(template) = template else {
            timer.observe_duration();
            return Ok(None);
        };

        let finishing = sqlx::query_as::<_, TemplateFinishing>(
            r#"
            SELECT template_finishing_id, template_id, name, is_mandatory, price_adjustment, display_order
            FROM template_finishing
            WHERE template_id = $1
            ORDER BY display_order, name
            "#,
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get template finishing: {}", e))
        })?;

        let options = sqlx::query_as::<_, TemplateOption>(
            r#"
            SELECT option_id, template_id, option_type, label, value, price_modifier, display_order
            FROM template_options
            WHERE template_id = $1
            ORDER BY option_type, display_order
            "#,
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get template options: {}", e))
        })?;

        timer.observe_duration();

        Ok(Some(TemplateDetails {
            template,
            finishing,
            options,
        }))
    }

    /// Catalog holding only a shop's paper capabilities, for GSM checks.
    #[instrument(skip(self))]
    pub async fn load_capability_catalog(
        &self,
        shop_id: Option<Uuid>,
    ) -> Result<ShopRateCatalog, AppError> {
        let Some(shop_id) = shop_id else {
            return Ok(ShopRateCatalog::default());
        };

        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_capability_catalog"])
            .start_timer();

        let mut conn = self.pool.acquire().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to acquire connection: {}", e))
        })?;
        let capabilities = fetch_capabilities(&mut conn, shop_id).await?;

        timer.observe_duration();

        Ok(ShopRateCatalog::new(Vec::new(), Vec::new(), capabilities))
    }
}

// -----------------------------------------------------------------------------
// Transaction helpers
// -----------------------------------------------------------------------------

async fn lock_quote(
    conn: &mut PgConnection,
    shop_id: Uuid,
    quote_id: Uuid,
) -> Result<Quote, AppError> {
    sqlx::query_as::<_, Quote>(
        r#"
        SELECT quote_id, shop_id, customer_id, reference, status, net_total, tax_rate, tax_amount,
               discount_amount, grand_total, valid_until, version, created_utc, updated_utc
        FROM quotes
        WHERE shop_id = $1 AND quote_id = $2
        FOR UPDATE
        "#,
    )
    .bind(shop_id)
    .bind(quote_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock quote: {}", e)))?
    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Quote not found: {}", quote_id)))
}

async fn lock_editable_quote(
    conn: &mut PgConnection,
    shop_id: Uuid,
    quote_id: Uuid,
) -> Result<Quote, AppError> {
    let quote = lock_quote(conn, shop_id, quote_id).await?;
    let status = quote.status();
    if !status.is_editable() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Quote is {} and can no longer be changed",
            status.as_str()
        )));
    }
    Ok(quote)
}

async fn ensure_item_on_quote(
    conn: &mut PgConnection,
    quote_id: Uuid,
    item_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query_scalar::<_, Uuid>("SELECT item_id FROM quote_items WHERE item_id = $1 AND quote_id = $2")
        .bind(item_id)
        .bind(quote_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get item: {}", e)))?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Quote item not found: {}", item_id)))
}

async fn ensure_stock_available(
    conn: &mut PgConnection,
    shop_id: Uuid,
    stock_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query_scalar::<_, Uuid>(
        "SELECT stock_id FROM paper_stocks WHERE stock_id = $1 AND shop_id = $2 AND active = TRUE",
    )
    .bind(stock_id)
    .bind(shop_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check paper stock: {}", e)))?
    .map(|_| ())
    .ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Paper stock {} is not available for this shop",
            stock_id
        ))
    })
}

async fn ensure_service_offered(
    conn: &mut PgConnection,
    shop_id: Uuid,
    service_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query_scalar::<_, Uuid>(
        "SELECT service_id FROM finishing_services WHERE service_id = $1 AND shop_id = $2 AND active = TRUE",
    )
    .bind(service_id)
    .bind(shop_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to check finishing service: {}", e))
    })?
    .map(|_| ())
    .ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Finishing service {} is not offered by this shop",
            service_id
        ))
    })
}

/// Recalculates a quote whose row is already locked by `conn`'s
/// transaction and writes every calculated column.
async fn recalculate_locked(
    conn: &mut PgConnection,
    quote: &Quote,
    trigger: &str,
) -> Result<RecalculatedQuote, AppError> {
    let spec = load_quote_spec(conn, quote).await?;
    let catalog = load_shop_catalog(conn, quote.shop_id).await?;

    let calculation = calculate_quote(&spec, &catalog);

    for gap in &calculation.gaps {
        PRICING_GAPS_TOTAL.with_label_values(&[gap.kind()]).inc();
    }
    if !calculation.gaps.is_empty() {
        warn!(
            quote_id = %quote.quote_id,
            gaps = calculation.gaps.len(),
            "Quote priced with missing catalog entries"
        );
    }

    let quote = persist_calculation(conn, &calculation).await?;

    RECALCULATIONS_TOTAL.with_label_values(&[trigger]).inc();
    info!(
        quote_id = %quote.quote_id,
        version = quote.version,
        net_total = %quote.net_total,
        grand_total = %quote.grand_total,
        "Quote recalculated"
    );

    Ok(RecalculatedQuote { quote, calculation })
}

async fn load_quote_spec(conn: &mut PgConnection, quote: &Quote) -> Result<QuoteSpec, AppError> {
    let items = fetch_items(conn, quote.quote_id).await?;
    let item_ids: Vec<Uuid> = items.iter().map(|i| i.item_id).collect();
    let parts = fetch_parts(conn, &item_ids).await?;
    let finishing = fetch_finishing(conn, &item_ids).await?;

    let stock_ids: Vec<Uuid> = parts
        .iter()
        .filter_map(|p| p.paper_stock_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let stocks: HashMap<Uuid, PaperStock> = sqlx::query_as::<_, PaperStock>(
        r#"
        SELECT stock_id, shop_id, name, sheet_size, width_mm, height_mm, gsm, price_unit,
               selling_price, active, created_utc
        FROM paper_stocks
        WHERE stock_id = ANY($1) AND shop_id = $2
        "#,
    )
    .bind(&stock_ids[..])
    .bind(quote.shop_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load paper stocks: {}", e)))?
    .into_iter()
    .map(|s| (s.stock_id, s))
    .collect();

    let service_ids: Vec<Uuid> = finishing
        .iter()
        .map(|f| f.service_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let services: HashMap<Uuid, FinishingService> = sqlx::query_as::<_, FinishingService>(
        r#"
        SELECT service_id, shop_id, name, charge_by, selling_price, batch_size, setup_fee,
               minimum_order_quantity, active, created_utc
        FROM finishing_services
        WHERE service_id = ANY($1)
        "#,
    )
    .bind(&service_ids[..])
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to load finishing services: {}", e))
    })?
    .into_iter()
    .map(|s| (s.service_id, s))
    .collect();

    let mut parts_by_item = group_by(parts, |p| p.item_id);
    let mut finishing_by_item = group_by(finishing, |f| f.item_id);

    let items = items
        .into_iter()
        .map(|item| {
            let parts = parts_by_item
                .remove(&item.item_id)
                .unwrap_or_default()
                .into_iter()
                .map(|part| PartSpec {
                    part_id: part.part_id,
                    final_width: part.final_width,
                    final_height: part.final_height,
                    paper: part.paper_stock_id.and_then(|id| stocks.get(&id).cloned()),
                    machine_id: part.machine_id,
                    color_mode: ColorMode::from_string(&part.color_mode),
                    print_sides: PrintSides::from_string(&part.print_sides),
                })
                .collect();

            // service rows are FK-protected, so every entry resolves
            let finishing = finishing_by_item
                .remove(&item.item_id)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|entry| {
                    services.get(&entry.service_id).map(|service| FinishingSpec {
                        finishing_id: entry.finishing_id,
                        service: service.clone(),
                    })
                })
                .collect();

            ItemSpec {
                item_id: item.item_id,
                quantity: u32::try_from(item.quantity).unwrap_or(0),
                parts,
                finishing,
            }
        })
        .collect();

    Ok(QuoteSpec {
        quote_id: quote.quote_id,
        shop_id: quote.shop_id,
        tax_rate: quote.tax_rate,
        discount_amount: quote.discount_amount,
        items,
    })
}

/// Loads the shop's active printing rates, the tiers of its finishing
/// services and its paper capabilities.
async fn load_shop_catalog(
    conn: &mut PgConnection,
    shop_id: Uuid,
) -> Result<ShopRateCatalog, AppError> {
    let rates = sqlx::query_as::<_, PrintingRate>(
        r#"
        SELECT rate_id, shop_id, machine_id, sheet_size, color_mode, selling_price_per_side,
               duplex_price_per_sheet, minimum_order_quantity, active, created_utc
        FROM printing_rates
        WHERE shop_id = $1 AND active = TRUE
        "#,
    )
    .bind(shop_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load printing rates: {}", e)))?;

    let tiers = sqlx::query_as::<_, PricingTier>(
        r#"
        SELECT t.tier_id, t.service_id, t.min_quantity, t.max_quantity, t.price_per_unit
        FROM finishing_pricing_tiers t
        JOIN finishing_services s ON s.service_id = t.service_id
        WHERE s.shop_id = $1
        ORDER BY t.service_id, t.min_quantity
        "#,
    )
    .bind(shop_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load pricing tiers: {}", e)))?;

    let capabilities = fetch_capabilities(conn, shop_id).await?;

    Ok(ShopRateCatalog::new(rates, tiers, capabilities))
}

async fn persist_calculation(
    conn: &mut PgConnection,
    calculation: &QuoteCalculation,
) -> Result<Quote, AppError> {
    for item in &calculation.items {
        for part in &item.parts {
            sqlx::query(
                r#"
                UPDATE quote_item_parts
                SET pieces_per_sheet = $2, sheets_required = $3, printing_cost = $4,
                    material_cost = $5, part_cost = $6
                WHERE part_id = $1
                "#,
            )
            .bind(part.part_id)
            .bind(to_db_count(part.pieces_per_sheet))
            .bind(to_db_count(part.sheets_required))
            .bind(part.printing_cost)
            .bind(part.material_cost)
            .bind(part.part_cost)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to save part: {}", e)))?;
        }

        for entry in &item.finishing {
            sqlx::query("UPDATE quote_item_finishing SET calculated_cost = $2 WHERE finishing_id = $1")
                .bind(entry.finishing_id)
                .bind(entry.calculated_cost)
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to save finishing: {}", e))
                })?;
        }

        sqlx::query("UPDATE quote_items SET calculated_price = $2 WHERE item_id = $1")
            .bind(item.item_id)
            .bind(item.calculated_price)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to save item: {}", e)))?;
    }

    let totals = &calculation.totals;
    sqlx::query_as::<_, Quote>(
        r#"
        UPDATE quotes
        SET net_total = $2, tax_amount = $3, grand_total = $4,
            version = version + 1, updated_utc = NOW()
        WHERE quote_id = $1
        RETURNING quote_id, shop_id, customer_id, reference, status, net_total, tax_rate, tax_amount,
                  discount_amount, grand_total, valid_until, version, created_utc, updated_utc
        "#,
    )
    .bind(calculation.quote_id)
    .bind(totals.net_total)
    .bind(totals.tax_amount)
    .bind(totals.grand_total)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to save quote totals: {}", e)))
}

async fn fetch_items(conn: &mut PgConnection, quote_id: Uuid) -> Result<Vec<QuoteItem>, AppError> {
    sqlx::query_as::<_, QuoteItem>(
        r#"
        SELECT item_id, quote_id, name, quantity, calculated_price, sort_order, created_utc
        FROM quote_items
        WHERE quote_id = $1
        ORDER BY sort_order, created_utc
        "#,
    )
    .bind(quote_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load items: {}", e)))
}

async fn fetch_parts(
    conn: &mut PgConnection,
    item_ids: &[Uuid],
) -> Result<Vec<QuoteItemPart>, AppError> {
    sqlx::query_as::<_, QuoteItemPart>(
        r#"
        SELECT part_id, item_id, name, final_width, final_height, paper_stock_id, gsm, machine_id,
               color_mode, print_sides, pieces_per_sheet, sheets_required, printing_cost,
               material_cost, part_cost, created_utc
        FROM quote_item_parts
        WHERE item_id = ANY($1)
        ORDER BY created_utc
        "#,
    )
    .bind(item_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load parts: {}", e)))
}

async fn fetch_finishing(
    conn: &mut PgConnection,
    item_ids: &[Uuid],
) -> Result<Vec<QuoteItemFinishing>, AppError> {
    sqlx::query_as::<_, QuoteItemFinishing>(
        r#"
        SELECT finishing_id, item_id, service_id, calculated_cost, created_utc
        FROM quote_item_finishing
        WHERE item_id = ANY($1)
        ORDER BY created_utc
        "#,
    )
    .bind(item_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load finishing: {}", e)))
}

async fn fetch_capabilities(
    conn: &mut PgConnection,
    shop_id: Uuid,
) -> Result<Vec<ShopPaperCapability>, AppError> {
    sqlx::query_as::<_, ShopPaperCapability>(
        r#"
        SELECT capability_id, shop_id, sheet_size, min_gsm, max_gsm
        FROM shop_paper_capabilities
        WHERE shop_id = $1
        "#,
    )
    .bind(shop_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to load paper capabilities: {}", e))
    })
}

fn group_by<T>(rows: Vec<T>, key: impl Fn(&T) -> Uuid) -> HashMap<Uuid, Vec<T>> {
    let mut grouped: HashMap<Uuid, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(key(&row)).or_default().push(row);
    }
    grouped
}

/// Reference for a duplicated quote, kept within the 50 character column.
fn copy_reference(reference: &str) -> String {
    const SUFFIX: &str = " (Copy)";
    let keep = 50 - SUFFIX.len();
    let base: String = reference.chars().take(keep).collect();
    format!("{}{}", base, SUFFIX)
}

fn to_db_count(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// The item row as written by the recalculation pass.
fn refreshed_item(mut item: QuoteItem, result: &RecalculatedQuote) -> QuoteItem {
    if let Some(calc) = result
        .calculation
        .items
        .iter()
        .find(|i| i.item_id == item.item_id)
    {
        item.calculated_price = calc.calculated_price;
    }
    item
}
