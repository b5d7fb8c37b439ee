//! Configuration loading with env-var overrides.
//!
//! Reads an optional TOML file (`--config <PATH>` or
//! `<config_dir>/phalcon-mcp/config.toml`), then applies
//! `PHALCON_MCP_LOG_LEVEL`, `PHALCON_MCP_CURSOR_ROOT` and
//! `PHALCON_MCP_PHALCON_BIN` env overrides.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;
use crate::logger;

const CONFIG_DIR_NAME: &str = "phalcon-mcp";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Cursor store discovery configuration.
#[derive(Debug, Clone, Default)]
pub struct CursorConfig {
    /// Explicit root (`.../Cursor/User`). `None` means use the platform default.
    pub root: Option<PathBuf>,
    /// Project directories that carry their own `state.vscdb`.
    pub project_dirs: Vec<PathBuf>,
}

/// Phalcon devtools configuration.
#[derive(Debug, Clone)]
pub struct PhalconConfig {
    /// Executable name or path used for every pass-through command.
    pub executable: String,
}

/// Fully-resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Append logs here instead of stderr.
    pub log_file: Option<PathBuf>,
    pub cursor: CursorConfig,
    pub phalcon: PhalconConfig,
}

/// Env-var overrides, collected up front so tests never touch the process env.
#[derive(Debug, Clone, Default)]
pub struct Overrides<'a> {
    pub log_level: Option<&'a str>,
    pub cursor_root: Option<&'a str>,
    pub phalcon_bin: Option<&'a str>,
}

/// Raw TOML shape, before resolution.
#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    cursor: RawCursor,
    #[serde(default)]
    phalcon: RawPhalcon,
}

#[derive(Deserialize)]
struct RawServer {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

#[derive(Deserialize, Default)]
struct RawCursor {
    #[serde(default)]
    root: Option<String>,
    #[serde(default)]
    project_dirs: Vec<String>,
}

#[derive(Deserialize)]
struct RawPhalcon {
    #[serde(default = "default_phalcon_executable")]
    executable: String,
}

impl Default for RawPhalcon {
    fn default() -> Self {
        Self {
            executable: default_phalcon_executable(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_phalcon_executable() -> String {
    "phalcon".to_string()
}

/// Load config, then apply env-var overrides.
///
/// An explicit path must exist. Without one, the per-user config file is
/// used when present and defaults apply otherwise.
pub fn load(explicit_path: Option<&str>) -> Result<Config, AppError> {
    let log_level = env::var("PHALCON_MCP_LOG_LEVEL").ok();
    let cursor_root = env::var("PHALCON_MCP_CURSOR_ROOT").ok();
    let phalcon_bin = env::var("PHALCON_MCP_PHALCON_BIN").ok();
    let overrides = Overrides {
        log_level: log_level.as_deref(),
        cursor_root: cursor_root.as_deref(),
        phalcon_bin: phalcon_bin.as_deref(),
    };

    match explicit_path {
        Some(path) => load_from(Path::new(path), &overrides),
        None => match default_config_path() {
            Some(path) if path.is_file() => load_from(&path, &overrides),
            _ => resolve(RawConfig::default(), &overrides),
        },
    }
}

/// Load from an explicit path with the given overrides.
pub fn load_from(path: &Path, overrides: &Overrides<'_>) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;
    resolve(parsed, overrides)
}

/// Parse TOML text into a resolved [`Config`].
pub fn parse(raw: &str, overrides: &Overrides<'_>) -> Result<Config, AppError> {
    let parsed: RawConfig =
        toml::from_str(raw).map_err(|e| AppError::Config(format!("parse error: {e}")))?;
    resolve(parsed, overrides)
}

fn resolve(parsed: RawConfig, overrides: &Overrides<'_>) -> Result<Config, AppError> {
    let log_level = overrides.log_level.unwrap_or(&parsed.server.log_level).to_string();
    logger::validate_level(&log_level)?;

    let root = overrides
        .cursor_root
        .map(str::to_string)
        .or(parsed.cursor.root)
        .filter(|r| !r.trim().is_empty())
        .map(|r| expand_home(&r));

    Ok(Config {
        log_level,
        log_file: parsed.server.log_file.map(|p| expand_home(&p)),
        cursor: CursorConfig {
            root,
            project_dirs: parsed
                .cursor
                .project_dirs
                .iter()
                .map(|p| expand_home(p))
                .collect(),
        },
        phalcon: PhalconConfig {
            executable: overrides
                .phalcon_bin
                .unwrap_or(&parsed.phalcon.executable)
                .to_string(),
        },
    })
}

/// `<config_dir>/phalcon-mcp/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
