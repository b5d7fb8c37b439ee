//! Tool catalogue and dispatch.
//!
//! Every tool returns a JSON payload. Failures inside a tool become an
//! `{"error": "..."}` payload with `isError: true`; only an unknown tool name
//! is a protocol-level error.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cursor::query::DEFAULT_LIMIT;
use crate::cursor::{QueryEngine, QueryRequest, StoredValue};
use crate::error::QueryError;
use crate::phalcon::{
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TEMPLATE, PhalconCommand, PhalconRunner,
};

#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// Result of one tool call, before wrapping into MCP content.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub payload: Value,
    pub is_error: bool,
}

impl ToolOutput {
    fn ok(payload: Value) -> Self {
        Self {
            payload,
            is_error: false,
        }
    }

    fn error(message: impl std::fmt::Display) -> Self {
        Self {
            payload: json!({ "error": message.to_string() }),
            is_error: true,
        }
    }

    /// `tools/call` result: the payload as one JSON text block.
    pub fn into_call_result(self) -> Value {
        let text = serde_json::to_string_pretty(&self.payload)
            .unwrap_or_else(|e| format!("{{\"error\": \"serialise tool output: {e}\"}}"));
        json!({
            "content": [{ "type": "text", "text": text }],
            "isError": self.is_error
        })
    }
}

impl From<QueryError> for ToolOutput {
    fn from(e: QueryError) -> Self {
        ToolOutput::error(e)
    }
}

// ── Arguments ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateProjectArgs {
    name: String,
    #[serde(default = "default_template")]
    template: Option<String>,
    #[serde(default)]
    directory: Option<String>,
}

#[derive(Deserialize)]
struct CreateModuleArgs {
    name: String,
    #[serde(default)]
    project_path: Option<String>,
}

#[derive(Deserialize)]
struct CreateControllerArgs {
    name: String,
    #[serde(default)]
    base_class: Option<String>,
}

#[derive(Deserialize)]
struct CreateModelArgs {
    name: String,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Deserialize)]
struct CreateAllModelsArgs {
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Deserialize)]
struct CreateMigrationArgs {
    name: String,
    #[serde(default)]
    table_name: Option<String>,
    #[serde(default)]
    directory: Option<String>,
}

#[derive(Deserialize)]
struct CreateScaffoldArgs {
    name: String,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    force: bool,
}

#[derive(Deserialize)]
struct ServeArgs {
    #[serde(default = "default_host")]
    host: Option<String>,
    #[serde(default = "default_port")]
    port: Option<u16>,
}

#[derive(Deserialize)]
struct ListProjectsArgs {
    #[serde(default)]
    detailed: bool,
}

#[derive(Deserialize)]
struct QueryArgs {
    project_name: String,
    table_name: String,
    query_type: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
}

#[derive(Deserialize)]
struct ProjectArgs {
    project_name: String,
}

#[derive(Deserialize)]
struct ComposerArgs {
    composer_id: String,
}

fn default_template() -> Option<String> {
    Some(DEFAULT_TEMPLATE.to_string())
}

fn default_host() -> Option<String> {
    Some(DEFAULT_HOST.to_string())
}

fn default_port() -> Option<u16> {
    Some(DEFAULT_PORT)
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ToolOutput> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments)
        .map_err(|e| ToolOutput::error(format!("invalid arguments for {tool}: {e}")))
}

/// `{"found": false}` or `{"found": true, "value": ...}`.
fn lookup_payload(value: Option<StoredValue>) -> Value {
    match value {
        Some(value) => json!({ "found": true, "value": value }),
        None => json!({ "found": false }),
    }
}

// ── Toolbox ───────────────────────────────────────────────────────────────────

/// Dispatches `tools/call` requests to the Phalcon runner and the Cursor
/// query engine.
#[derive(Debug, Clone)]
pub struct Toolbox {
    engine: QueryEngine,
    runner: PhalconRunner,
}

impl Toolbox {
    pub fn new(engine: QueryEngine, runner: PhalconRunner) -> Self {
        Self { engine, runner }
    }

    pub fn call(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolCallError> {
        debug!(tool = name, "tools/call");
        let output = match name {
            "phalcon_info" => self.run(PhalconCommand::Info),
            "phalcon_create_project" => self.run_with(name, arguments, |a: CreateProjectArgs| {
                PhalconCommand::CreateProject {
                    name: a.name,
                    template: a.template,
                    directory: a.directory,
                }
            }),
            "phalcon_create_module" => self.run_with(name, arguments, |a: CreateModuleArgs| {
                PhalconCommand::CreateModule {
                    name: a.name,
                    project_path: a.project_path,
                }
            }),
            "phalcon_create_controller" => {
                self.run_with(name, arguments, |a: CreateControllerArgs| {
                    PhalconCommand::CreateController {
                        name: a.name,
                        base_class: a.base_class,
                    }
                })
            }
            "phalcon_create_model" => self.run_with(name, arguments, |a: CreateModelArgs| {
                PhalconCommand::CreateModel {
                    name: a.name,
                    schema: a.schema,
                    namespace: a.namespace,
                }
            }),
            "phalcon_create_all_models" => {
                self.run_with(name, arguments, |a: CreateAllModelsArgs| {
                    PhalconCommand::CreateAllModels {
                        schema: a.schema,
                        namespace: a.namespace,
                    }
                })
            }
            "phalcon_create_migration" => {
                self.run_with(name, arguments, |a: CreateMigrationArgs| {
                    PhalconCommand::CreateMigration {
                        name: a.name,
                        table_name: a.table_name,
                        directory: a.directory,
                    }
                })
            }
            "phalcon_create_scaffold" => self.run_with(name, arguments, |a: CreateScaffoldArgs| {
                PhalconCommand::CreateScaffold {
                    name: a.name,
                    schema: a.schema,
                    template: a.template,
                    force: a.force,
                }
            }),
            "phalcon_create_webtools" => self.run(PhalconCommand::CreateWebtools),
            "phalcon_serve" => self.run_with(name, arguments, |a: ServeArgs| {
                PhalconCommand::Serve {
                    host: a.host,
                    port: a.port,
                }
            }),
            "phalcon_list_commands" => self.run(PhalconCommand::ListCommands),

            "cursor_list_projects" => self.list_projects(name, arguments),
            "cursor_refresh" => self.refresh(),
            "cursor_query" => self.query(name, arguments),
            "cursor_chat_history" => self.chat_history(name, arguments),
            "cursor_composer_ids" => self.composer_ids(name, arguments),
            "cursor_composer_detail" => self.composer_detail(name, arguments),

            other => return Err(ToolCallError::UnknownTool(other.to_string())),
        };

        if output.is_error {
            warn!(tool = name, payload = %output.payload, "tool call failed");
        }
        Ok(output)
    }

    // ── phalcon ───────────────────────────────────────────────────────────────

    fn run(&self, command: PhalconCommand) -> ToolOutput {
        let outcome = self.runner.run(&command);
        let is_error = !outcome.success;
        match serde_json::to_value(&outcome) {
            Ok(payload) => ToolOutput { payload, is_error },
            Err(e) => ToolOutput::error(format!("serialise command outcome: {e}")),
        }
    }

    fn run_with<A: DeserializeOwned>(
        &self,
        tool: &str,
        arguments: Value,
        build: impl FnOnce(A) -> PhalconCommand,
    ) -> ToolOutput {
        match parse_args::<A>(tool, arguments) {
            Ok(args) => self.run(build(args)),
            Err(output) => output,
        }
    }

    // ── cursor ────────────────────────────────────────────────────────────────

    fn list_projects(&self, tool: &str, arguments: Value) -> ToolOutput {
        let args: ListProjectsArgs = match parse_args(tool, arguments) {
            Ok(a) => a,
            Err(output) => return output,
        };
        let listing = self.engine.registry().list_projects(args.detailed);
        match serde_json::to_value(&listing) {
            Ok(payload) => ToolOutput::ok(payload),
            Err(e) => ToolOutput::error(format!("serialise project listing: {e}")),
        }
    }

    fn refresh(&self) -> ToolOutput {
        let summary = self.engine.registry().refresh();
        match serde_json::to_value(&summary) {
            Ok(payload) => ToolOutput::ok(payload),
            Err(e) => ToolOutput::error(format!("serialise refresh summary: {e}")),
        }
    }

    fn query(&self, tool: &str, arguments: Value) -> ToolOutput {
        let args: QueryArgs = match parse_args(tool, arguments) {
            Ok(a) => a,
            Err(output) => return output,
        };
        let request = QueryRequest {
            project: &args.project_name,
            table: &args.table_name,
            query_type: &args.query_type,
            key: args.key.as_deref(),
            limit: args.limit,
        };
        match self.engine.query(&request) {
            Ok(records) => match serde_json::to_value(&records) {
                Ok(payload) => ToolOutput::ok(payload),
                Err(e) => ToolOutput::error(format!("serialise query result: {e}")),
            },
            Err(e) => e.into(),
        }
    }

    fn chat_history(&self, tool: &str, arguments: Value) -> ToolOutput {
        let args: ProjectArgs = match parse_args(tool, arguments) {
            Ok(a) => a,
            Err(output) => return output,
        };
        match self.engine.chat_history(&args.project_name) {
            Ok(value) => ToolOutput::ok(lookup_payload(value)),
            Err(e) => e.into(),
        }
    }

    fn composer_ids(&self, tool: &str, arguments: Value) -> ToolOutput {
        let args: ProjectArgs = match parse_args(tool, arguments) {
            Ok(a) => a,
            Err(output) => return output,
        };
        match self.engine.composer_ids(&args.project_name) {
            Ok(Some(ids)) => ToolOutput::ok(json!({ "found": true, "composer_ids": ids })),
            Ok(None) => ToolOutput::ok(json!({ "found": false, "composer_ids": [] })),
            Err(e) => e.into(),
        }
    }

    fn composer_detail(&self, tool: &str, arguments: Value) -> ToolOutput {
        let args: ComposerArgs = match parse_args(tool, arguments) {
            Ok(a) => a,
            Err(output) => return output,
        };
        match self.engine.composer_detail(&args.composer_id) {
            Ok(value) => ToolOutput::ok(lookup_payload(value)),
            Err(e) => e.into(),
        }
    }
}

// ── Catalogue ─────────────────────────────────────────────────────────────────

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

fn string_prop(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

/// `tools/list` result.
pub fn catalogue() -> Value {
    let tools = vec![
        tool("phalcon_info", "Show Phalcon version and environment information", json!({}), &[]),
        tool(
            "phalcon_create_project",
            "Create a new Phalcon project",
            json!({
                "name": string_prop("Project name"),
                "template": { "type": "string", "description": "Project template", "default": DEFAULT_TEMPLATE },
                "directory": string_prop("Base directory for the project"),
            }),
            &["name"],
        ),
        tool(
            "phalcon_create_module",
            "Create a new module",
            json!({
                "name": string_prop("Module name"),
                "project_path": string_prop("Path to the project"),
            }),
            &["name"],
        ),
        tool(
            "phalcon_create_controller",
            "Create a new controller",
            json!({
                "name": string_prop("Controller name"),
                "base_class": string_prop("Base class to extend"),
            }),
            &["name"],
        ),
        tool(
            "phalcon_create_model",
            "Create a new model",
            json!({
                "name": string_prop("Model (table) name"),
                "schema": string_prop("Database schema"),
                "namespace": string_prop("Model namespace"),
            }),
            &["name"],
        ),
        tool(
            "phalcon_create_all_models",
            "Create models for every database table",
            json!({
                "schema": string_prop("Database schema"),
                "namespace": string_prop("Model namespace"),
            }),
            &[],
        ),
        tool(
            "phalcon_create_migration",
            "Create a new database migration",
            json!({
                "name": string_prop("Migration name"),
                "table_name": string_prop("Table to migrate"),
                "directory": string_prop("Migrations directory"),
            }),
            &["name"],
        ),
        tool(
            "phalcon_create_scaffold",
            "Create a full CRUD scaffold",
            json!({
                "name": string_prop("Table name"),
                "schema": string_prop("Database schema"),
                "template": string_prop("Template path"),
                "force": { "type": "boolean", "description": "Overwrite existing files", "default": false },
            }),
            &["name"],
        ),
        tool("phalcon_create_webtools", "Set up Phalcon Webtools", json!({}), &[]),
        tool(
            "phalcon_serve",
            "Start the development server",
            json!({
                "host": { "type": "string", "description": "Bind host", "default": DEFAULT_HOST },
                "port": { "type": "integer", "description": "Bind port", "default": DEFAULT_PORT, "minimum": 0, "maximum": 65535 },
            }),
            &[],
        ),
        tool("phalcon_list_commands", "List every available Phalcon command", json!({}), &[]),
        tool(
            "cursor_list_projects",
            "List Cursor projects that have a local state store",
            json!({
                "detailed": { "type": "boolean", "description": "Return full project records instead of name → store path", "default": false },
            }),
            &[],
        ),
        tool(
            "cursor_refresh",
            "Rescan Cursor workspace storage and explicit project directories",
            json!({}),
            &[],
        ),
        tool(
            "cursor_query",
            "Read-only query against a project's state store",
            json!({
                "project_name": string_prop("Project name from cursor_list_projects"),
                "table_name": { "type": "string", "enum": ["ItemTable", "cursorDiskKV"] },
                "query_type": { "type": "string", "enum": ["get_all", "get_by_key", "search_keys"] },
                "key": string_prop("Exact key (get_by_key) or case-sensitive substring (search_keys)"),
                "limit": { "type": "integer", "minimum": 0, "default": DEFAULT_LIMIT },
            }),
            &["project_name", "table_name", "query_type"],
        ),
        tool(
            "cursor_chat_history",
            "Chat panel state stored for a project",
            json!({ "project_name": string_prop("Project name") }),
            &["project_name"],
        ),
        tool(
            "cursor_composer_ids",
            "Composer identifiers recorded for a project",
            json!({ "project_name": string_prop("Project name") }),
            &["project_name"],
        ),
        tool(
            "cursor_composer_detail",
            "Stored data for one composer, from the global store",
            json!({ "composer_id": string_prop("Composer identifier") }),
            &["composer_id"],
        ),
    ];
    json!({ "tools": tools })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use crate::cursor::{DiscoverySources, StoreRegistry};

    fn toolbox() -> Toolbox {
        let registry = Arc::new(StoreRegistry::new(DiscoverySources::default()));
        Toolbox::new(
            QueryEngine::new(registry),
            PhalconRunner::new("/nonexistent/phalcon-devtools-bin"),
        )
    }

    #[test]
    fn catalogue_names_are_unique_and_dispatchable() {
        let catalogue = catalogue();
        let tools = catalogue["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 17);

        let names: HashSet<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names.len(), tools.len());

        let toolbox = toolbox();
        for name in names {
            assert!(
                !matches!(toolbox.call(name, json!({})), Err(ToolCallError::UnknownTool(_))),
                "{name} is listed but not dispatched"
            );
        }
    }

    #[test]
    fn unknown_tool_is_rejected() {
        assert!(matches!(
            toolbox().call("rm_rf", json!({})),
            Err(ToolCallError::UnknownTool(_))
        ));
    }

    #[test]
    fn missing_arguments_become_error_payload() {
        let out = toolbox().call("cursor_query", json!({ "project_name": "x" })).unwrap();
        assert!(out.is_error);
        assert!(out.payload["error"].as_str().unwrap().contains("invalid arguments"));
    }

    #[test]
    fn unknown_project_becomes_error_payload() {
        let out = toolbox()
            .call("cursor_chat_history", json!({ "project_name": "ghost" }))
            .unwrap();
        assert!(out.is_error);
        assert!(out.payload["error"].as_str().unwrap().contains("not found"));
    }

    #[test]
    fn failed_command_is_flagged() {
        let out = toolbox().call("phalcon_info", Value::Null).unwrap();
        assert!(out.is_error);
        assert_eq!(out.payload["success"], false);
    }

    #[test]
    fn call_result_wraps_payload_as_text() {
        let result = ToolOutput::ok(json!({ "a": 1 })).into_call_result();
        assert_eq!(result["isError"], false);
        let text = result["content"][0]["text"].as_str().unwrap();
        assert_eq!(serde_json::from_str::<Value>(text).unwrap(), json!({ "a": 1 }));
    }
}
