//! SQLite implementation of the ledger backend.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::schema::{create_table_sql, table, Documents};
use super::{Collection, Document, Filter, LedgerBackend, Result, StorageError, WriteMode};
use crate::model::SyncState;

/// Path value selecting a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// SQLite implementation of LedgerBackend.
pub struct SqliteLedgerBackend {
    pool: SqlitePool,
}

impl SqliteLedgerBackend {
    /// Create a backend over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database at `path`.
    ///
    /// `:memory:` opens a private in-memory database on a single pinned
    /// connection, since every SQLite connection sees its own memory database.
    pub async fn connect(path: &str) -> Result<Self> {
        let in_memory = path.is_empty() || path == IN_MEMORY_PATH;

        let mut opts = SqliteConnectOptions::new()
            .busy_timeout(Duration::from_secs(30))
            .create_if_missing(true);

        let pool_opts = if in_memory {
            opts = opts.filename(IN_MEMORY_PATH);
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StorageError::Backend(format!("{}: {}", parent.display(), e)))?;
                }
            }
            opts = opts.filename(path).journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_opts.connect_with(opts).await?;
        info!(path = %path, in_memory, "SQLite ledger connected");

        Ok(Self::new(pool))
    }

    fn row_to_document(row: &SqliteRow) -> Result<Document> {
        let key: String = row.try_get("key")?;
        let silo_id: Option<String> = row.try_get("silo_id")?;
        let sync_state: Option<String> = row.try_get("sync_state")?;
        let created_at: String = row.try_get("created_at")?;
        let body: String = row.try_get("body")?;

        let sync_state = sync_state
            .map(|s| s.parse::<SyncState>())
            .transpose()?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StorageError::InvalidTimestamp(format!("{}: {}", created_at, e)))?
            .with_timezone(&Utc);

        Ok(Document {
            key,
            silo_id,
            sync_state,
            created_at,
            body: serde_json::from_str(&body)?,
        })
    }

    /// Insert or upsert one document on the given connection.
    async fn write_on(
        conn: &mut SqliteConnection,
        collection: Collection,
        doc: &Document,
        mode: WriteMode,
    ) -> Result<()> {
        let body = serde_json::to_string(&doc.body)?;

        let mut insert = Query::insert();
        insert
            .into_table(table(collection))
            .columns([
                Documents::Key,
                Documents::SiloId,
                Documents::SyncState,
                Documents::CreatedAt,
                Documents::Body,
            ])
            .values_panic([
                doc.key.clone().into(),
                doc.silo_id.clone().into(),
                doc.sync_state.map(|s| s.as_str().to_string()).into(),
                doc.created_at.to_rfc3339().into(),
                body.into(),
            ]);

        if mode == WriteMode::Upsert {
            insert.on_conflict(
                OnConflict::column(Documents::Key)
                    .update_columns([
                        Documents::SiloId,
                        Documents::SyncState,
                        Documents::CreatedAt,
                        Documents::Body,
                    ])
                    .to_owned(),
            );
        }

        let (sql, values) = insert.build_sqlx(SqliteQueryBuilder);

        match sqlx::query_with(&sql, values).execute(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::Conflict {
                    collection,
                    key: doc.key.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl LedgerBackend for SqliteLedgerBackend {
    async fn init(&self) -> Result<()> {
        for collection in Collection::ALL {
            sqlx::query(&create_table_sql(collection))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn write(&self, collection: Collection, doc: Document, mode: WriteMode) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::write_on(&mut conn, collection, &doc, mode).await?;
        debug!(collection = %collection, key = %doc.key, ?mode, "Document written");
        Ok(())
    }

    async fn write_batch(&self, collection: Collection, docs: Vec<Document>) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        // BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
        // when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let mut result = Ok(());
        for doc in &docs {
            result = Self::write_on(&mut conn, collection, doc, WriteMode::Upsert).await;
            if result.is_err() {
                break;
            }
        }

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                debug!(collection = %collection, count = docs.len(), "Document batch written");
                Ok(())
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Document>> {
        let (sql, values) = Query::select()
            .columns([
                Documents::Key,
                Documents::SiloId,
                Documents::SyncState,
                Documents::CreatedAt,
                Documents::Body,
            ])
            .from(table(collection))
            .and_where(Expr::col(Documents::Key).eq(key))
            .build_sqlx(SqliteQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>> {
        let mut select = Query::select();
        select
            .columns([
                Documents::Key,
                Documents::SiloId,
                Documents::SyncState,
                Documents::CreatedAt,
                Documents::Body,
            ])
            .from(table(collection));

        if let Some(silo) = filter.silo() {
            select.and_where(Expr::col(Documents::SiloId).eq(silo));
        }
        if let Some(state) = filter.sync_state() {
            select.and_where(Expr::col(Documents::SyncState).eq(state.as_str()));
        }

        let (sql, values) = select.build_sqlx(SqliteQueryBuilder);
        let rows = sqlx::query_with(&sql, values).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_document).collect()
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<usize> {
        let mut select = Query::select();
        select
            .expr(Expr::col(Documents::Key).count())
            .from(table(collection));

        if let Some(silo) = filter.silo() {
            select.and_where(Expr::col(Documents::SiloId).eq(silo));
        }
        if let Some(state) = filter.sync_state() {
            select.and_where(Expr::col(Documents::SyncState).eq(state.as_str()));
        }

        let (sql, values) = select.build_sqlx(SqliteQueryBuilder);
        let row = sqlx::query_with(&sql, values).fetch_one(&self.pool).await?;
        let count: i64 = row.try_get(0)?;

        Ok(count as usize)
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        let (sql, values) = Query::delete()
            .from_table(table(collection))
            .and_where(Expr::col(Documents::Key).eq(key))
            .build_sqlx(SqliteQueryBuilder);

        let result = sqlx::query_with(&sql, values).execute(&self.pool).await?;

        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("SQLite ledger closed");
    }
}
