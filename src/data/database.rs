//! SQLite database operations
//!
//! All database access goes through this module.
//! Uses SQLx with runtime-checked queries and embedded migrations.

use chrono::Utc;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// One of the monthly counters in `account_usage`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageCounter {
    Content,
    Image,
    Fallback,
}

impl UsageCounter {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Content => "content_count",
            Self::Image => "image_count",
            Self::Fallback => "fallback_count",
        }
    }
}

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Create the account or refresh its plan
    pub async fn upsert_account(&self, id: &str, plan: PlanTier) -> Result<Account, AppError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO accounts (id, plan, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET plan = excluded.plan, updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(plan.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_account(id).await?.ok_or(AppError::NotFound)
    }

    /// Get an account by ID
    pub async fn get_account(&self, id: &str) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    // =========================================================================
    // Usage counters
    // =========================================================================

    /// Read the counters for one period; missing rows read as zero
    pub async fn get_usage(
        &self,
        account_id: &str,
        period: &str,
    ) -> Result<UsageCounters, AppError> {
        let usage = sqlx::query_as::<_, UsageCounters>(
            r#"
            SELECT content_count, image_count, fallback_count
            FROM account_usage WHERE account_id = ? AND period = ?
            "#,
        )
        .bind(account_id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;

        Ok(usage.unwrap_or_default())
    }

    /// Atomically increment a counter if it is below `limit`.
    ///
    /// `limit = None` increments unconditionally. The comparison and the
    /// increment happen in one statement, so concurrent callers can never
    /// push the counter past the limit.
    ///
    /// # Returns
    /// `true` if the slot was claimed.
    pub async fn try_increment_usage(
        &self,
        account_id: &str,
        period: &str,
        counter: UsageCounter,
        limit: Option<i64>,
    ) -> Result<bool, AppError> {
        sqlx::query(
            "INSERT OR IGNORE INTO account_usage (account_id, period) VALUES (?, ?)",
        )
        .bind(account_id)
        .bind(period)
        .execute(&self.pool)
        .await?;

        let column = counter.column();
        let result = match limit {
            Some(limit) => {
                let sql = format!(
                    "UPDATE account_usage SET {column} = {column} + 1 \
                     WHERE account_id = ? AND period = ? AND {column} < ?"
                );
                sqlx::query(&sql)
                    .bind(account_id)
                    .bind(period)
                    .bind(limit)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "UPDATE account_usage SET {column} = {column} + 1 \
                     WHERE account_id = ? AND period = ?"
                );
                sqlx::query(&sql)
                    .bind(account_id)
                    .bind(period)
                    .execute(&self.pool)
                    .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    /// Undo one increment; never goes below zero
    pub async fn decrement_usage(
        &self,
        account_id: &str,
        period: &str,
        counter: UsageCounter,
    ) -> Result<(), AppError> {
        let column = counter.column();
        let sql = format!(
            "UPDATE account_usage SET {column} = {column} - 1 \
             WHERE account_id = ? AND period = ? AND {column} > 0"
        );
        sqlx::query(&sql)
            .bind(account_id)
            .bind(period)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Businesses
    // =========================================================================

    /// Insert a business profile
    pub async fn insert_business(&self, business: &Business) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO businesses (
                id, account_id, name, industry, description, location, website, tagline,
                brand_primary_color, brand_secondary_color, preferred_styles, avoided_styles,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&business.id)
        .bind(&business.account_id)
        .bind(&business.name)
        .bind(&business.industry)
        .bind(&business.description)
        .bind(&business.location)
        .bind(&business.website)
        .bind(&business.tagline)
        .bind(&business.brand_primary_color)
        .bind(&business.brand_secondary_color)
        .bind(&business.preferred_styles)
        .bind(&business.avoided_styles)
        .bind(business.created_at)
        .bind(business.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a business owned by the account
    pub async fn get_business(
        &self,
        account_id: &str,
        id: &str,
    ) -> Result<Option<Business>, AppError> {
        let business = sqlx::query_as::<_, Business>(
            "SELECT * FROM businesses WHERE id = ? AND account_id = ?",
        )
        .bind(id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(business)
    }

    // =========================================================================
    // Generation records
    // =========================================================================

    /// Append a text generation record
    pub async fn insert_generated_text(
        &self,
        record: &GeneratedTextRecord,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO generated_texts (
                id, account_id, business_id, kind, topic, tone, content, content_format,
                draft_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.account_id)
        .bind(&record.business_id)
        .bind(&record.kind)
        .bind(&record.topic)
        .bind(&record.tone)
        .bind(&record.content)
        .bind(&record.content_format)
        .bind(&record.draft_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a text record by ID
    pub async fn get_generated_text(
        &self,
        id: &str,
    ) -> Result<Option<GeneratedTextRecord>, AppError> {
        let record =
            sqlx::query_as::<_, GeneratedTextRecord>("SELECT * FROM generated_texts WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    /// Append an image record
    pub async fn insert_generated_image(
        &self,
        record: &GeneratedImageRecord,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO generated_images (
                id, account_id, business_id, kind, topic, url, provenance, style, size,
                prompt, revised_prompt, ai_trigger, product_composited, stages_applied,
                background_removal_method, photographer_name, photographer_url,
                download_location, draft_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.account_id)
        .bind(&record.business_id)
        .bind(&record.kind)
        .bind(&record.topic)
        .bind(&record.url)
        .bind(&record.provenance)
        .bind(&record.style)
        .bind(&record.size)
        .bind(&record.prompt)
        .bind(&record.revised_prompt)
        .bind(&record.ai_trigger)
        .bind(record.product_composited)
        .bind(&record.stages_applied)
        .bind(&record.background_removal_method)
        .bind(&record.photographer_name)
        .bind(&record.photographer_url)
        .bind(&record.download_location)
        .bind(&record.draft_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get an image record by ID
    pub async fn get_generated_image(
        &self,
        id: &str,
    ) -> Result<Option<GeneratedImageRecord>, AppError> {
        let record = sqlx::query_as::<_, GeneratedImageRecord>(
            "SELECT * FROM generated_images WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    // =========================================================================
    // Drafts
    // =========================================================================

    /// Insert a draft and point its text/image records at it atomically.
    ///
    /// Dropping the future before commit rolls the transaction back.
    pub async fn insert_draft_with_links(&self, draft: &Draft) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO drafts (id, account_id, business_id, kind, topic, text_id, image_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&draft.id)
        .bind(&draft.account_id)
        .bind(&draft.business_id)
        .bind(&draft.kind)
        .bind(&draft.topic)
        .bind(&draft.text_id)
        .bind(&draft.image_id)
        .bind(draft.created_at)
        .execute(&mut *tx)
        .await?;

        if let Some(text_id) = &draft.text_id {
            sqlx::query("UPDATE generated_texts SET draft_id = ? WHERE id = ? AND account_id = ?")
                .bind(&draft.id)
                .bind(text_id)
                .bind(&draft.account_id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(image_id) = &draft.image_id {
            sqlx::query("UPDATE generated_images SET draft_id = ? WHERE id = ? AND account_id = ?")
                .bind(&draft.id)
                .bind(image_id)
                .bind(&draft.account_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get a draft owned by the account
    pub async fn get_draft(&self, account_id: &str, id: &str) -> Result<Option<Draft>, AppError> {
        let draft =
            sqlx::query_as::<_, Draft>("SELECT * FROM drafts WHERE id = ? AND account_id = ?")
                .bind(id)
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(draft)
    }

    /// Attach an image record to an existing draft, replacing any previous image.
    ///
    /// # Returns
    /// `false` if the draft does not exist for this account.
    pub async fn set_draft_image(
        &self,
        account_id: &str,
        draft_id: &str,
        image_id: &str,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated =
            sqlx::query("UPDATE drafts SET image_id = ? WHERE id = ? AND account_id = ?")
                .bind(image_id)
                .bind(draft_id)
                .bind(account_id)
                .execute(&mut *tx)
                .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE generated_images SET draft_id = ? WHERE id = ? AND account_id = ?")
            .bind(draft_id)
            .bind(image_id)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
