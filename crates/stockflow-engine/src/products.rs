//! Product persistence
//!
//! `ProductStore` is the seam between the import engine and the database;
//! tests substitute an in-memory implementation. `PgProductStore` is the
//! production adapter: batch upserts keyed by case-folded SKU, each batch
//! in its own transaction, so a crash mid-file leaves earlier batches
//! durably applied and re-running the same file is idempotent per SKU.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use crate::import::normalize::NormalizedProduct;
use crate::models::Product;

/// Errors from product persistence.
#[derive(Debug, Error)]
pub enum ProductStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub created: u64,
    pub updated: u64,
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Insert-or-update every row in the batch, keyed by `lower(sku)`,
    /// updating only the mutable fields on conflict. One transaction per
    /// batch; the whole batch commits or none of it does.
    async fn upsert_batch(
        &self,
        batch: &[NormalizedProduct],
    ) -> Result<BatchOutcome, ProductStoreError>;

    /// Delete up to `limit` products; returns how many went away.
    async fn delete_batch(&self, limit: i64) -> Result<u64, ProductStoreError>;

    /// Total number of stored products.
    async fn count(&self) -> Result<i64, ProductStoreError>;

    /// Look up one product by SKU, case-insensitively.
    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, ProductStoreError>;
}

/// PostgreSQL-backed product store.
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn upsert_batch(
        &self,
        batch: &[NormalizedProduct],
    ) -> Result<BatchOutcome, ProductStoreError> {
        if batch.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut tx = self.pool.begin().await?;

        // Resolve which batch SKUs already exist, case-insensitively, so
        // created/updated accounting is exact even for in-batch duplicates.
        let folded: Vec<String> = batch.iter().map(NormalizedProduct::sku_folded).collect();
        let existing: Vec<String> = sqlx::query_scalar(
            "SELECT lower(sku) FROM products WHERE lower(sku) = ANY($1)",
        )
        .bind(&folded)
        .fetch_all(&mut *tx)
        .await?;
        let mut seen: HashSet<String> = existing.into_iter().collect();

        let mut outcome = BatchOutcome::default();

        for product in batch {
            sqlx::query(
                r#"
                INSERT INTO products (id, sku, name, description, active)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT ((lower(sku))) DO UPDATE
                SET name = EXCLUDED.name,
                    description = EXCLUDED.description,
                    active = EXCLUDED.active,
                    updated_at = NOW()
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&product.sku)
            .bind(&product.name)
            .bind(&product.description)
            .bind(product.active)
            .execute(&mut *tx)
            .await?;

            if seen.insert(product.sku_folded()) {
                outcome.created += 1;
            } else {
                outcome.updated += 1;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn delete_batch(&self, limit: i64) -> Result<u64, ProductStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM products
            WHERE id IN (SELECT id FROM products ORDER BY created_at LIMIT $1)
            "#,
        )
        .bind(limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<i64, ProductStoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, ProductStoreError> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, description, active, created_at, updated_at
            FROM products
            WHERE lower(sku) = lower($1)
            "#,
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }
}
