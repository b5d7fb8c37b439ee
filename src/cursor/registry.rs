//! `registry`: discovery of Cursor workspace stores and the in-memory
//! project map.
//!
//! ```text
//! {root}/                          e.g. ~/.config/Cursor/User
//! ├── workspaceStorage/
//! │   └── {workspace-id}/
//! │       ├── workspace.json       {"folder": "file:///home/u/code/my-app"}
//! │       └── state.vscdb
//! └── globalStorage/
//!     └── state.vscdb
//! ```
//!
//! Explicit project directories contribute a record when they hold a
//! top-level `state.vscdb`; their name is the directory's base name.
//!
//! Discovery never fails: every candidate directory yields a
//! [`DiscoveryOutcome`], and only accepted candidates become records.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CursorConfig;

use super::store::{
    FOLDER_FIELD, GLOBAL_STORAGE_DIR, STORE_FILENAME, WORKSPACE_DESCRIPTOR, WORKSPACE_STORAGE_DIR,
};

// ── Records ───────────────────────────────────────────────────────────────────

/// One discovered project.
///
/// `name` is not unique across sources; `store_path` is the real identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRecord {
    pub name: String,
    pub store_path: PathBuf,
    /// Originating `workspaceStorage/{id}` directory; absent for explicit directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,
    /// Raw `folder` value the name was derived from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

/// What happened to one `workspaceStorage` candidate directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Accepted(ProjectRecord),
    SkippedMissingDescriptor,
    SkippedMissingStore,
    SkippedMalformedDescriptor { reason: String },
    /// Descriptor parsed but had no usable `folder` (e.g. a multi-root workspace).
    SkippedMissingFolder,
}

impl DiscoveryOutcome {
    pub fn skip_reason(&self) -> Option<String> {
        match self {
            DiscoveryOutcome::Accepted(_) => None,
            DiscoveryOutcome::SkippedMissingDescriptor => Some("missing workspace.json".into()),
            DiscoveryOutcome::SkippedMissingStore => Some("missing state.vscdb".into()),
            DiscoveryOutcome::SkippedMalformedDescriptor { reason } => {
                Some(format!("malformed workspace.json: {reason}"))
            }
            DiscoveryOutcome::SkippedMissingFolder => Some("no folder in workspace.json".into()),
        }
    }
}

/// Result of scanning one root: per-candidate outcomes plus diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Candidates in enumeration (sorted directory name) order.
    pub candidates: Vec<(PathBuf, DiscoveryOutcome)>,
    pub global_store: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl DiscoveryReport {
    /// Accepted records, in enumeration order.
    pub fn projects(&self) -> Vec<ProjectRecord> {
        self.candidates
            .iter()
            .filter_map(|(_, outcome)| match outcome {
                DiscoveryOutcome::Accepted(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Platform default Cursor root (`<config_dir>/Cursor/User`).
///
/// Known platforms: Windows (`%APPDATA%`), macOS
/// (`~/Library/Application Support`), Linux (`~/.config`).
pub fn resolve_default_root() -> Option<PathBuf> {
    default_root_for(std::env::consts::OS, dirs::config_dir())
}

pub(crate) fn default_root_for(os: &str, config_dir: Option<PathBuf>) -> Option<PathBuf> {
    match os {
        "windows" | "macos" | "linux" => match config_dir {
            Some(dir) => Some(dir.join("Cursor").join("User")),
            None => {
                warn!(os, "cursor: no config directory for this user; no default root");
                None
            }
        },
        other => {
            warn!(os = other, "cursor: unrecognised platform; no default root");
            None
        }
    }
}

/// Derive a project name from a workspace folder URI: the last non-empty
/// path segment, ignoring trailing separators and any `scheme://` prefix.
pub fn project_name_from_folder(folder: &str) -> Option<String> {
    let path = match folder.find("://") {
        Some(idx) => &folder[idx + 3..],
        None => folder,
    };
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Scan `root/workspaceStorage` and probe `root/globalStorage`.
///
/// Soft-fails with an empty report when `root` is absent, missing on disk, or
/// has no `workspaceStorage` directory.
pub fn discover_from_root(root: Option<&Path>) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();

    let Some(root) = root else {
        debug!("cursor: no root configured; skipping workspace scan");
        return report;
    };
    if !root.is_dir() {
        report.warn(format!("cursor: root {} does not exist", root.display()));
        return report;
    }

    report.global_store = probe_global_store(root);

    let storage = root.join(WORKSPACE_STORAGE_DIR);
    if !storage.is_dir() {
        report.warn(format!(
            "cursor: {} not found under {}",
            WORKSPACE_STORAGE_DIR,
            root.display()
        ));
        return report;
    }

    let entries = match fs::read_dir(&storage) {
        Ok(entries) => entries,
        Err(e) => {
            report.warn(format!("cursor: cannot read {}: {e}", storage.display()));
            return report;
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    for dir in dirs {
        let outcome = inspect_workspace_dir(&dir);
        if let DiscoveryOutcome::SkippedMalformedDescriptor { reason } = &outcome {
            report.warn(format!(
                "cursor: skipping {}: malformed {WORKSPACE_DESCRIPTOR}: {reason}",
                dir.display()
            ));
        } else if let Some(reason) = outcome.skip_reason() {
            debug!(dir = %dir.display(), reason = %reason, "cursor: skipping workspace");
        }
        report.candidates.push((dir, outcome));
    }

    report
}

/// Classify a single `workspaceStorage/{id}` directory.
pub fn inspect_workspace_dir(dir: &Path) -> DiscoveryOutcome {
    let descriptor = dir.join(WORKSPACE_DESCRIPTOR);
    let store_path = dir.join(STORE_FILENAME);

    if !descriptor.is_file() {
        return DiscoveryOutcome::SkippedMissingDescriptor;
    }
    if !store_path.is_file() {
        return DiscoveryOutcome::SkippedMissingStore;
    }

    let parsed = fs::read_to_string(&descriptor)
        .map_err(|e| e.to_string())
        .and_then(|raw| {
            serde_json::from_str::<serde_json::Value>(&raw).map_err(|e| e.to_string())
        });
    let descriptor = match parsed {
        Ok(value) => value,
        Err(reason) => return DiscoveryOutcome::SkippedMalformedDescriptor { reason },
    };

    let Some(folder) = descriptor.get(FOLDER_FIELD).and_then(|v| v.as_str()) else {
        return DiscoveryOutcome::SkippedMissingFolder;
    };
    let Some(name) = project_name_from_folder(folder) else {
        return DiscoveryOutcome::SkippedMissingFolder;
    };

    DiscoveryOutcome::Accepted(ProjectRecord {
        name,
        store_path,
        workspace_dir: Some(dir.to_path_buf()),
        source_uri: Some(folder.to_string()),
    })
}

fn probe_global_store(root: &Path) -> Option<PathBuf> {
    let path = root.join(GLOBAL_STORAGE_DIR).join(STORE_FILENAME);
    if path.is_file() {
        Some(path)
    } else {
        debug!(path = %path.display(), "cursor: no global store");
        None
    }
}

/// Register a project directory that carries its own `state.vscdb`.
pub fn register_explicit_directory(path: &Path) -> Option<ProjectRecord> {
    let resolved = match fs::canonicalize(path) {
        Ok(p) => p,
        Err(e) => {
            warn!(path = %path.display(), "cursor: project directory unavailable: {e}");
            return None;
        }
    };

    let store_path = resolved.join(STORE_FILENAME);
    if !store_path.is_file() {
        warn!(path = %resolved.display(), "cursor: no {STORE_FILENAME} in project directory");
        return None;
    }

    let Some(name) = resolved.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        warn!(path = %resolved.display(), "cursor: project directory has no base name");
        return None;
    };

    Some(ProjectRecord {
        name,
        store_path,
        workspace_dir: None,
        source_uri: None,
    })
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Complete result of one discovery pass. Replaced wholesale by `refresh`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryState {
    pub projects: BTreeMap<String, PathBuf>,
    pub details: BTreeMap<String, ProjectRecord>,
    pub global_store: Option<PathBuf>,
}

impl RegistryState {
    /// Last write wins on name collisions.
    fn insert(&mut self, record: ProjectRecord) {
        if let Some(previous) = self.details.get(&record.name) {
            debug!(
                name = %record.name,
                previous = %previous.store_path.display(),
                replacement = %record.store_path.display(),
                "cursor: project name collision; replacing"
            );
        }
        self.projects.insert(record.name.clone(), record.store_path.clone());
        self.details.insert(record.name.clone(), record);
    }
}

/// Where discovery looks. Changes take effect on the next `refresh`.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySources {
    pub root: Option<PathBuf>,
    pub project_dirs: Vec<PathBuf>,
}

/// `list_projects` output: flat name → store path, or name → full record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProjectListing {
    Flat(BTreeMap<String, PathBuf>),
    Detailed(BTreeMap<String, ProjectRecord>),
}

/// Summary of a `refresh`, suitable for returning over RPC.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub root: Option<PathBuf>,
    pub project_count: usize,
    pub global_store: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedCandidate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedCandidate {
    pub dir: PathBuf,
    pub reason: String,
}

/// Process-held project registry.
///
/// Never holds store handles. State sits behind `RwLock<Arc<_>>`: `refresh`
/// builds a new [`RegistryState`] off to the side and swaps it in with one
/// write, so readers see either the old or the new state, never a partial one.
/// Refreshes run one at a time, so the last one to finish also read the
/// latest sources.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    sources: RwLock<DiscoverySources>,
    state: RwLock<Arc<RegistryState>>,
    refresh_gate: Mutex<()>,
}

impl StoreRegistry {
    /// Empty registry; call [`refresh`](Self::refresh) to populate.
    pub fn new(sources: DiscoverySources) -> Self {
        Self {
            sources: RwLock::new(sources),
            state: RwLock::new(Arc::new(RegistryState::default())),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Build from config, falling back to the platform default root.
    pub fn from_config(config: &CursorConfig) -> Self {
        let root = config.root.clone().or_else(resolve_default_root);
        Self::new(DiscoverySources {
            root,
            project_dirs: config.project_dirs.clone(),
        })
    }

    pub fn sources(&self) -> DiscoverySources {
        self.sources.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_root(&self, root: Option<PathBuf>) {
        self.sources.write().unwrap_or_else(PoisonError::into_inner).root = root;
    }

    /// Re-run discovery and replace the current state.
    pub fn refresh(&self) -> RefreshSummary {
        let _gate = self.refresh_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let sources = self.sources();
        let report = discover_from_root(sources.root.as_deref());

        let mut next = RegistryState {
            global_store: report.global_store.clone(),
            ..RegistryState::default()
        };
        for record in report.projects() {
            next.insert(record);
        }
        for dir in &sources.project_dirs {
            if let Some(record) = register_explicit_directory(dir) {
                next.insert(record);
            }
        }

        let summary = RefreshSummary {
            root: sources.root.clone(),
            project_count: next.details.len(),
            global_store: next.global_store.clone(),
            skipped: report
                .candidates
                .iter()
                .filter_map(|(dir, outcome)| {
                    outcome.skip_reason().map(|reason| SkippedCandidate {
                        dir: dir.clone(),
                        reason,
                    })
                })
                .collect(),
            warnings: report.warnings,
        };

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);

        info!(
            projects = summary.project_count,
            skipped = summary.skipped.len(),
            global_store = summary.global_store.is_some(),
            "cursor: registry refreshed"
        );
        summary
    }

    /// Current state. Cheap: clones the `Arc`.
    pub fn snapshot(&self) -> Arc<RegistryState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// In-memory view only; no I/O.
    pub fn list_projects(&self, detailed: bool) -> ProjectListing {
        let state = self.snapshot();
        if detailed {
            ProjectListing::Detailed(state.details.clone())
        } else {
            ProjectListing::Flat(state.projects.clone())
        }
    }

    pub fn store_path(&self, name: &str) -> Option<PathBuf> {
        self.snapshot().projects.get(name).cloned()
    }

    pub fn global_store_path(&self) -> Option<PathBuf> {
        self.snapshot().global_store.clone()
    }
}
