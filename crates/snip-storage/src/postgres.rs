use async_trait::async_trait;
use snip_core::batch::{check_batch, first_conflict};
use snip_core::{
    LinkPair, LinkRef, ReadStore, Result, ShortCode, Store, StoreError, StoreStats, UserId,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Default upper bound of pooled connections used by [`PostgresStore::connect`].
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// PostgreSQL implementation of the store contract.
///
/// Uniqueness is enforced by two partial unique indexes over live rows,
/// `(user_id, short_url)` and `(user_id, original_url)`. Inserts rely on the
/// resulting constraint violation instead of a read-then-write check, so
/// concurrent inserts need no application-level locking.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store from an existing connection pool.
    ///
    /// The schema is expected to exist already; see [`PostgresStore::migrate`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a new connection pool and applies the embedded migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!("database storage initialized");
        Ok(store)
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("failed to apply migrations: {e}")))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn live_code_for_url(
        &self,
        user_id: &UserId,
        original_url: &str,
    ) -> Result<Option<ShortCode>> {
        let row = sqlx::query(
            r#"
            SELECT short_url
            FROM short_links
            WHERE user_id = $1
              AND original_url = $2
              AND NOT is_deleted
            LIMIT 1
            "#,
        )
        .bind(user_id.as_str())
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|row| row.try_get::<String, _>("short_url"))
            .transpose()
            .map_err(map_sqlx_error)
            .map(|code| code.map(ShortCode::new_unchecked))
    }

    /// Works out which item of a rejected batch conflicted.
    async fn batch_conflict(&self, user_id: &UserId, batch: &[LinkPair]) -> Result<StoreError> {
        let urls: Vec<String> = batch.iter().map(|i| i.original_url.clone()).collect();
        let codes: Vec<String> = batch.iter().map(|i| i.short_url.to_string()).collect();

        let rows = sqlx::query(
            r#"
            SELECT short_url, original_url
            FROM short_links
            WHERE user_id = $1
              AND NOT is_deleted
              AND (original_url = ANY($2) OR short_url = ANY($3))
            "#,
        )
        .bind(user_id.as_str())
        .bind(urls)
        .bind(codes)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut live_urls: HashMap<String, ShortCode> = HashMap::with_capacity(rows.len());
        let mut live_codes: HashSet<ShortCode> = HashSet::with_capacity(rows.len());
        for row in rows {
            let code = ShortCode::new_unchecked(
                row.try_get::<String, _>("short_url")
                    .map_err(map_sqlx_error)?,
            );
            let url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
            live_codes.insert(code.clone());
            live_urls.insert(url, code);
        }

        // The conflicting row may be gone by now; report a code collision so
        // the caller simply retries with fresh codes.
        Ok(first_conflict(
            batch,
            |url| live_urls.get(url).cloned(),
            |code| live_codes.contains(code),
        )
        .unwrap_or_else(|| StoreError::DuplicateCode(batch[0].short_url.clone())))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    err.as_database_error().and_then(|e| e.constraint())
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StoreError::InvalidData(message),
        _ => StoreError::Query(message),
    }
}

#[async_trait]
impl ReadStore for PostgresStore {
    async fn get(&self, code: &ShortCode) -> Result<String> {
        // Live rows sort first: a code shared by several users resolves to a
        // live link whenever one exists.
        let row = sqlx::query(
            r#"
            SELECT original_url, is_deleted
            FROM short_links
            WHERE short_url = $1
            ORDER BY is_deleted ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StoreError::NotFound(code.to_string()));
        };

        let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if is_deleted {
            return Err(StoreError::Deleted(code.clone()));
        }

        row.try_get("original_url").map_err(map_sqlx_error)
    }

    async fn get_all_urls(&self, user_id: &UserId) -> Result<Vec<LinkPair>> {
        let rows = sqlx::query(
            r#"
            SELECT short_url, original_url
            FROM short_links
            WHERE user_id = $1
              AND NOT is_deleted
            ORDER BY id
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let code: String = row.try_get("short_url")?;
                let url: String = row.try_get("original_url")?;
                Ok(LinkPair::new(ShortCode::new_unchecked(code), url))
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(map_sqlx_error)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS urls, COUNT(DISTINCT user_id) AS users
            FROM short_links
            WHERE NOT is_deleted
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let users: i64 = row.try_get("users").map_err(map_sqlx_error)?;

        Ok(StoreStats {
            urls: urls as u64,
            users: users as u64,
        })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn set(
        &self,
        user_id: &UserId,
        code: &ShortCode,
        original_url: &str,
    ) -> Result<ShortCode> {
        let result = sqlx::query(
            r#"
            INSERT INTO short_links (user_id, short_url, original_url)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id.as_str())
        .bind(code.as_str())
        .bind(original_url)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(code.clone()),
            Err(err) if is_unique_violation(&err) => {
                debug!(
                    user_id = %user_id,
                    code = %code,
                    constraint = violated_constraint(&err).unwrap_or("unknown"),
                    "insert hit a unique index"
                );
                // Either index may fire first; an existing URL always wins.
                match self.live_code_for_url(user_id, original_url).await? {
                    Some(existing) => Err(StoreError::NotUnique {
                        short_url: existing,
                        original_url: original_url.to_owned(),
                    }),
                    None => Err(StoreError::DuplicateCode(code.clone())),
                }
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn set_batch(&self, user_id: &UserId, batch: Vec<LinkPair>) -> Result<Vec<LinkPair>> {
        check_batch(&batch)?;
        if batch.is_empty() {
            return Ok(batch);
        }

        let codes: Vec<String> = batch.iter().map(|i| i.short_url.to_string()).collect();
        let urls: Vec<String> = batch.iter().map(|i| i.original_url.clone()).collect();

        // A single statement for the whole batch: any violation aborts all rows.
        let result = sqlx::query(
            r#"
            INSERT INTO short_links (user_id, short_url, original_url)
            SELECT $1, batch.short_url, batch.original_url
            FROM UNNEST($2::text[], $3::text[]) WITH ORDINALITY AS batch(short_url, original_url, ord)
            ORDER BY batch.ord
            "#,
        )
        .bind(user_id.as_str())
        .bind(codes)
        .bind(urls)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => {
                debug!(user_id = %user_id, rows = done.rows_affected(), "stored link batch");
                Ok(batch)
            }
            Err(err) if is_unique_violation(&err) => {
                Err(self.batch_conflict(user_id, &batch).await?)
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn delete_short_urls(&self, links: Vec<LinkRef>) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }

        let users: Vec<String> = links.iter().map(|l| l.user_id.to_string()).collect();
        let codes: Vec<String> = links.iter().map(|l| l.short_url.to_string()).collect();

        let result = sqlx::query(
            r#"
            UPDATE short_links AS s
            SET is_deleted = TRUE
            FROM UNNEST($1::text[], $2::text[]) AS target(user_id, short_url)
            WHERE s.user_id = target.user_id
              AND s.short_url = target.short_url
              AND NOT s.is_deleted
            "#,
        )
        .bind(users)
        .bind(codes)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(
            requested = links.len(),
            flipped = result.rows_affected(),
            "soft-deleted links"
        );
        Ok(())
    }

    async fn hard_delete_urls(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM short_links WHERE is_deleted")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
