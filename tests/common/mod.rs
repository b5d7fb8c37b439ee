//! Shared fixtures: a fake Cursor root laid out on disk with real SQLite stores.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use tempfile::TempDir;

pub const SCHEMA: &str = "
    CREATE TABLE ItemTable (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);
    CREATE TABLE cursorDiskKV (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);
";

/// Create a `state.vscdb` at `path` with both tables and the given rows.
pub fn write_store(path: &Path, item_rows: &[(&str, &str)], disk_rows: &[(&str, &str)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    for (key, value) in item_rows {
        conn.execute("INSERT INTO ItemTable (key, value) VALUES (?1, ?2)", params![key, value])
            .unwrap();
    }
    for (key, value) in disk_rows {
        conn.execute("INSERT INTO cursorDiskKV (key, value) VALUES (?1, ?2)", params![key, value])
            .unwrap();
    }
}

/// A temporary `.../Cursor/User` tree.
pub struct CursorRoot {
    pub dir: TempDir,
}

impl CursorRoot {
    /// Root with an empty `workspaceStorage`.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("workspaceStorage")).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// `workspaceStorage/<id>` with a descriptor pointing at `folder` and a store.
    pub fn add_workspace(&self, id: &str, folder: &str, item_rows: &[(&str, &str)]) -> PathBuf {
        let ws = self.workspace_dir(id);
        fs::write(ws.join("workspace.json"), format!(r#"{{"folder":"{folder}"}}"#)).unwrap();
        write_store(&ws.join("state.vscdb"), item_rows, &[]);
        ws
    }

    /// Bare `workspaceStorage/<id>` directory, contents left to the caller.
    pub fn workspace_dir(&self, id: &str) -> PathBuf {
        let ws = self.path().join("workspaceStorage").join(id);
        fs::create_dir_all(&ws).unwrap();
        ws
    }

    /// `globalStorage/state.vscdb` with the given `cursorDiskKV` rows.
    pub fn add_global_store(&self, disk_rows: &[(&str, &str)]) -> PathBuf {
        let global = self.path().join("globalStorage");
        fs::create_dir_all(&global).unwrap();
        let store = global.join("state.vscdb");
        write_store(&store, &[], disk_rows);
        store
    }
}
