//! Database schema definitions using sea-query.
//!
//! All three collections share one table layout: primary key, the indexed
//! columns used for filter pushdown, and the JSON body.

use sea_query::{Alias, Iden};

use super::Collection;

/// Column identifiers shared by every collection table.
#[derive(Iden)]
pub enum Documents {
    #[iden = "key"]
    Key,
    #[iden = "silo_id"]
    SiloId,
    #[iden = "sync_state"]
    SyncState,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "body"]
    Body,
}

/// Table identifier for a collection.
pub fn table(collection: Collection) -> Alias {
    Alias::new(collection.as_str())
}

/// SQL for creating a collection table and its indexes.
pub fn create_table_sql(collection: Collection) -> String {
    let name = collection.as_str();
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {name} (
    key TEXT PRIMARY KEY NOT NULL,
    silo_id TEXT,
    sync_state TEXT,
    created_at TEXT NOT NULL,
    body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{name}_silo_id ON {name}(silo_id);
CREATE INDEX IF NOT EXISTS idx_{name}_sync_state ON {name}(sync_state);
CREATE INDEX IF NOT EXISTS idx_{name}_created_at ON {name}(created_at);
"#
    )
}
