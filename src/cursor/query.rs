//! `query`: bounded, read-only queries against one store at a time.
//!
//! Every call opens its own read-only connection and drops it before
//! returning. Arguments are validated before any store is touched.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::debug;

use crate::error::QueryError;

use super::registry::StoreRegistry;
use super::store::{StoreTable, StoredValue, column_text, open_read_only};

/// Default row cap for `get_all` and `search_keys`.
pub const DEFAULT_LIMIT: u32 = 100;

/// Chat panel state, per project (`ItemTable`).
pub const CHAT_DATA_KEY: &str = "workbench.panel.aichat.view.aichat.chatdata";

/// Composer index, per project (`ItemTable`).
pub const COMPOSER_INDEX_KEY: &str = "composer.composerData";

/// Global `cursorDiskKV` key prefix for one composer's data.
pub const COMPOSER_DETAIL_PREFIX: &str = "composerData:";

const COMPOSER_LIST_FIELD: &str = "allComposers";
const COMPOSER_ID_FIELD: &str = "composerId";

const GLOBAL_STORE_NAME: &str = "<global>";

// ── Query shape ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    GetAll,
    GetByKey,
    SearchKeys,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::GetAll => "get_all",
            QueryType::GetByKey => "get_by_key",
            QueryType::SearchKeys => "search_keys",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get_all" => Ok(QueryType::GetAll),
            "get_by_key" => Ok(QueryType::GetByKey),
            "search_keys" => Ok(QueryType::SearchKeys),
            other => Err(format!(
                "unknown query type '{other}' (expected one of: get_all, get_by_key, search_keys)"
            )),
        }
    }
}

/// A query request as it arrives from the protocol layer: strings unparsed.
#[derive(Debug, Clone)]
pub struct QueryRequest<'a> {
    pub project: &'a str,
    pub table: &'a str,
    pub query_type: &'a str,
    pub key: Option<&'a str>,
    pub limit: u32,
}

/// Validated form of a [`QueryRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan<'a> {
    GetAll { limit: u32 },
    GetByKey { key: &'a str },
    SearchKeys { needle: &'a str, limit: u32 },
}

/// One normalised row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRecord {
    pub key: String,
    pub value: StoredValue,
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Runs queries against stores known to a [`StoreRegistry`].
#[derive(Debug, Clone)]
pub struct QueryEngine {
    registry: Arc<StoreRegistry>,
}

impl QueryEngine {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    /// Run one of the three read patterns against a project's store.
    pub fn query(&self, request: &QueryRequest<'_>) -> Result<Vec<QueryRecord>, QueryError> {
        let store_path = self
            .registry
            .store_path(request.project)
            .ok_or_else(|| QueryError::NotFound(format!("project '{}'", request.project)))?;

        let table = request
            .table
            .parse::<StoreTable>()
            .map_err(QueryError::InvalidArgument)?;
        let query_type = request
            .query_type
            .parse::<QueryType>()
            .map_err(QueryError::InvalidArgument)?;
        let plan = plan(query_type, request.key, request.limit)?;

        run_plan(&store_path, request.project, table, &plan)
    }

    /// First value stored under `key` in a project's `ItemTable`.
    ///
    /// Absence is `Ok(None)`: optional IDE data is routinely missing.
    pub fn get_by_well_known_key(
        &self,
        project: &str,
        key: &str,
    ) -> Result<Option<StoredValue>, QueryError> {
        let rows = self.query(&QueryRequest {
            project,
            table: StoreTable::ItemTable.as_str(),
            query_type: QueryType::GetByKey.as_str(),
            key: Some(key),
            limit: DEFAULT_LIMIT,
        })?;
        Ok(rows.into_iter().next().map(|row| row.value))
    }

    /// First value stored under `key` in the global store's `cursorDiskKV`.
    pub fn get_global_by_key(&self, key: &str) -> Result<Option<StoredValue>, QueryError> {
        let store_path = self
            .registry
            .global_store_path()
            .ok_or_else(|| QueryError::NotFound("global store".into()))?;

        let rows = run_plan(
            &store_path,
            GLOBAL_STORE_NAME,
            StoreTable::CursorDiskKv,
            &Plan::GetByKey { key },
        )?;
        Ok(rows.into_iter().next().map(|row| row.value))
    }

    // ── Recipes ───────────────────────────────────────────────────────────────

    pub fn chat_history(&self, project: &str) -> Result<Option<StoredValue>, QueryError> {
        self.get_by_well_known_key(project, CHAT_DATA_KEY)
    }

    /// Composer identifiers listed in a project's composer index.
    ///
    /// `None` when the index key is absent; an index without a recognisable
    /// `allComposers` array yields an empty list.
    pub fn composer_ids(&self, project: &str) -> Result<Option<Vec<String>>, QueryError> {
        let Some(index) = self.get_by_well_known_key(project, COMPOSER_INDEX_KEY)? else {
            return Ok(None);
        };
        Ok(Some(extract_composer_ids(&index)))
    }

    pub fn composer_detail(&self, composer_id: &str) -> Result<Option<StoredValue>, QueryError> {
        if composer_id.is_empty() {
            return Err(QueryError::InvalidArgument("composer id must not be empty".into()));
        }
        self.get_global_by_key(&format!("{COMPOSER_DETAIL_PREFIX}{composer_id}"))
    }
}

// ── Internals ─────────────────────────────────────────────────────────────────

fn plan(query_type: QueryType, key: Option<&str>, limit: u32) -> Result<Plan<'_>, QueryError> {
    let require_key = || {
        key.ok_or_else(|| {
            QueryError::InvalidArgument(format!("query type '{query_type}' requires a key"))
        })
    };
    Ok(match query_type {
        QueryType::GetAll => Plan::GetAll { limit },
        QueryType::GetByKey => Plan::GetByKey {
            key: require_key()?,
        },
        QueryType::SearchKeys => Plan::SearchKeys {
            needle: require_key()?,
            limit,
        },
    })
}

fn run_plan(
    store_path: &Path,
    project: &str,
    table: StoreTable,
    plan: &Plan<'_>,
) -> Result<Vec<QueryRecord>, QueryError> {
    let storage_err = |source| QueryError::Storage {
        project: project.to_string(),
        table: table.to_string(),
        source,
    };

    debug!(project, %table, ?plan, store = %store_path.display(), "cursor: query");

    let conn = open_read_only(store_path).map_err(storage_err)?;
    fetch(&conn, table, plan).map_err(storage_err)
}

fn fetch(
    conn: &Connection,
    table: StoreTable,
    plan: &Plan<'_>,
) -> Result<Vec<QueryRecord>, rusqlite::Error> {
    // Table names come from the closed `StoreTable` set, never from input.
    let sql = match plan {
        Plan::GetAll { .. } => {
            format!("SELECT key, value FROM {table} WHERE key IS NOT NULL LIMIT ?1")
        }
        Plan::GetByKey { .. } => format!("SELECT key, value FROM {table} WHERE key = ?1"),
        // instr() is a case-sensitive substring test, unlike LIKE.
        Plan::SearchKeys { .. } => {
            format!("SELECT key, value FROM {table} WHERE instr(key, ?1) > 0 LIMIT ?2")
        }
    };

    let mut stmt = conn.prepare(&sql)?;
    // Keys are read as leniently as values: one odd row must not sink the rest.
    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Option<QueryRecord>> {
        let Some(key) = column_text(row.get_ref(0)?) else {
            return Ok(None);
        };
        Ok(Some(QueryRecord {
            key,
            value: StoredValue::from_column(row.get_ref(1)?),
        }))
    };

    let rows = match plan {
        Plan::GetAll { limit } => stmt.query_map(params![limit], map_row)?,
        Plan::GetByKey { key } => stmt.query_map(params![key], map_row)?,
        Plan::SearchKeys { needle, limit } => stmt.query_map(params![needle, limit], map_row)?,
    };

    let mut records = Vec::new();
    for row in rows {
        if let Some(record) = row? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Pull composer ids out of a decoded composer index.
///
/// Entries are normally objects carrying `composerId`; bare string entries
/// are accepted too.
pub fn extract_composer_ids(index: &StoredValue) -> Vec<String> {
    let Some(entries) = index
        .as_decoded()
        .and_then(|doc| doc.get(COMPOSER_LIST_FIELD))
        .and_then(|list| list.as_array())
    else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            serde_json::Value::String(id) => Some(id.clone()),
            other => other
                .get(COMPOSER_ID_FIELD)
                .and_then(|id| id.as_str())
                .map(str::to_string),
        })
        .collect()
}
