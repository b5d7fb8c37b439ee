//! `store`: on-disk contract of Cursor's `state.vscdb` files and the
//! read-only connection factory.
//!
//! ## What lives here
//! - **Layout constants**: file and directory names under the Cursor root.
//! - **Table names**: the two logical key/value tables, as [`StoreTable`].
//! - **Connection factory**: `open_read_only` (no pragmas that write).
//! - **Value decoding**: [`StoredValue`], decode-or-raw.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

// ── Layout ────────────────────────────────────────────────────────────────────

/// Directory under the root holding one subdirectory per workspace.
pub const WORKSPACE_STORAGE_DIR: &str = "workspaceStorage";

/// Directory under the root holding the shared store.
pub const GLOBAL_STORAGE_DIR: &str = "globalStorage";

/// Store file name, per workspace and global.
pub const STORE_FILENAME: &str = "state.vscdb";

/// Workspace descriptor file name.
pub const WORKSPACE_DESCRIPTOR: &str = "workspace.json";

/// Descriptor field holding the workspace folder URI.
pub const FOLDER_FIELD: &str = "folder";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ── Tables ────────────────────────────────────────────────────────────────────

/// The two key/value tables every `state.vscdb` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreTable {
    #[serde(rename = "ItemTable")]
    ItemTable,
    #[serde(rename = "cursorDiskKV")]
    CursorDiskKv,
}

impl StoreTable {
    pub const ALL: [StoreTable; 2] = [StoreTable::ItemTable, StoreTable::CursorDiskKv];

    pub fn as_str(self) -> &'static str {
        match self {
            StoreTable::ItemTable => "ItemTable",
            StoreTable::CursorDiskKv => "cursorDiskKV",
        }
    }
}

impl fmt::Display for StoreTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreTable::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                format!("unknown table '{s}' (expected one of: ItemTable, cursorDiskKV)")
            })
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

/// Open `db_path` read-only.
///
/// The IDE owns these files and may hold them in WAL mode, so nothing here
/// changes journal mode or writes pragmas; only the busy timeout is set.
pub fn open_read_only(db_path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

// ── Values ────────────────────────────────────────────────────────────────────

/// Text form of a column, with invalid UTF-8 replaced. `None` for NULL.
pub fn column_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(r) => Some(r.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// A stored value: the decoded JSON document when the text parses, the raw
/// text otherwise.
///
/// Serialises untagged, so RPC callers see either the document or a string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StoredValue {
    Decoded(serde_json::Value),
    Raw(String),
}

impl StoredValue {
    /// Decode text, falling back to the raw string. Never fails.
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => StoredValue::Decoded(value),
            Err(_) => StoredValue::Raw(text.to_string()),
        }
    }

    /// Decode a column value. `cursorDiskKV` stores JSON as BLOBs, so blobs are
    /// read as (lossy) UTF-8 text first.
    pub fn from_column(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => StoredValue::Decoded(serde_json::Value::Null),
            ValueRef::Integer(i) => StoredValue::Decoded(i.into()),
            ValueRef::Real(r) => StoredValue::Decoded(
                serde_json::Number::from_f64(r)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            ),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Self::from_text(&String::from_utf8_lossy(bytes))
            }
        }
    }

    pub fn as_decoded(&self) -> Option<&serde_json::Value> {
        match self {
            StoredValue::Decoded(value) => Some(value),
            StoredValue::Raw(_) => None,
        }
    }

    pub fn into_json(self) -> serde_json::Value {
        match self {
            StoredValue::Decoded(value) => value,
            StoredValue::Raw(text) => serde_json::Value::String(text),
        }
    }
}
