//! MCP prompts. There is one: a help overview of the tool catalogue.

use serde_json::{Value, json};

pub const HELP_PROMPT: &str = "phalcon_help";

const HELP_TEXT: &str = "\
The Phalcon MCP server provides the following tools:

1. Project management
   - phalcon_create_project: create a new Phalcon project
   - phalcon_create_module: create a new module
   - phalcon_serve: start the development server

2. Code generation
   - phalcon_create_controller: create a new controller
   - phalcon_create_model: create a new model
   - phalcon_create_all_models: create models for every database table
   - phalcon_create_migration: create a new database migration
   - phalcon_create_scaffold: create a full CRUD scaffold

3. Development tools
   - phalcon_info: show Phalcon version and environment information
   - phalcon_create_webtools: set up Phalcon Webtools
   - phalcon_list_commands: list every available Phalcon command

4. Cursor workspace data (read-only)
   - cursor_list_projects: list projects with a local state store
   - cursor_refresh: rescan workspace storage
   - cursor_query: query ItemTable or cursorDiskKV (get_all, get_by_key, search_keys)
   - cursor_chat_history: chat panel state for a project
   - cursor_composer_ids: composer identifiers for a project
   - cursor_composer_detail: stored data for one composer
";

pub fn list() -> Value {
    json!({
        "prompts": [{
            "name": HELP_PROMPT,
            "description": "Overview of the Phalcon and Cursor tools this server exposes",
            "arguments": []
        }]
    })
}

/// `prompts/get` result, or `None` for an unknown prompt name.
pub fn get(name: &str) -> Option<Value> {
    (name == HELP_PROMPT).then(|| {
        json!({
            "description": "Phalcon MCP tool help",
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": HELP_TEXT }
            }]
        })
    })
}
