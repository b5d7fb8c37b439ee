//! Phalcon devtools pass-through.
//!
//! Each [`PhalconCommand`] renders to a fixed argv for the `phalcon`
//! executable; [`PhalconRunner`] executes it and reports the exit status.
//! Nothing here knows what the commands do.

use std::process::Command;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::PhalconConfig;

pub const DEFAULT_TEMPLATE: &str = "basic";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8000;

/// A devtools invocation with its options. Empty strings and a zero port are
/// treated as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhalconCommand {
    Info,
    CreateProject {
        name: String,
        template: Option<String>,
        directory: Option<String>,
    },
    CreateModule {
        name: String,
        project_path: Option<String>,
    },
    CreateController {
        name: String,
        base_class: Option<String>,
    },
    CreateModel {
        name: String,
        schema: Option<String>,
        namespace: Option<String>,
    },
    CreateAllModels {
        schema: Option<String>,
        namespace: Option<String>,
    },
    CreateMigration {
        name: String,
        table_name: Option<String>,
        directory: Option<String>,
    },
    CreateScaffold {
        name: String,
        schema: Option<String>,
        template: Option<String>,
        force: bool,
    },
    CreateWebtools,
    Serve {
        host: Option<String>,
        port: Option<u16>,
    },
    ListCommands,
}

impl PhalconCommand {
    /// Devtools subcommand name.
    pub fn subcommand(&self) -> &'static str {
        match self {
            PhalconCommand::Info => "info",
            PhalconCommand::CreateProject { .. } => "create-project",
            PhalconCommand::CreateModule { .. } => "create-module",
            PhalconCommand::CreateController { .. } => "create-controller",
            PhalconCommand::CreateModel { .. } => "create-model",
            PhalconCommand::CreateAllModels { .. } => "create-all-models",
            PhalconCommand::CreateMigration { .. } => "create-migration",
            PhalconCommand::CreateScaffold { .. } => "create-scaffold",
            PhalconCommand::CreateWebtools => "create-webtools",
            PhalconCommand::Serve { .. } => "serve",
            PhalconCommand::ListCommands => "list",
        }
    }

    /// Full argument list, subcommand first.
    pub fn args(&self) -> Vec<String> {
        let mut args = ArgList::new(self.subcommand());
        match self {
            PhalconCommand::Info
            | PhalconCommand::CreateWebtools
            | PhalconCommand::ListCommands => {}
            PhalconCommand::CreateProject {
                name,
                template,
                directory,
            } => {
                args.positional(name);
                args.flag("--template", template.as_deref());
                args.flag("--directory", directory.as_deref());
            }
            PhalconCommand::CreateModule { name, project_path } => {
                args.positional(name);
                args.flag("--project-path", project_path.as_deref());
            }
            PhalconCommand::CreateController { name, base_class } => {
                args.positional(name);
                args.flag("--base-class", base_class.as_deref());
            }
            PhalconCommand::CreateModel {
                name,
                schema,
                namespace,
            } => {
                args.positional(name);
                args.flag("--schema", schema.as_deref());
                args.flag("--namespace", namespace.as_deref());
            }
            PhalconCommand::CreateAllModels { schema, namespace } => {
                args.flag("--schema", schema.as_deref());
                args.flag("--namespace", namespace.as_deref());
            }
            PhalconCommand::CreateMigration {
                name,
                table_name,
                directory,
            } => {
                args.positional(name);
                args.flag("--table-name", table_name.as_deref());
                args.flag("--directory", directory.as_deref());
            }
            PhalconCommand::CreateScaffold {
                name,
                schema,
                template,
                force,
            } => {
                args.positional(name);
                args.flag("--schema", schema.as_deref());
                args.flag("--template", template.as_deref());
                args.switch("--force", *force);
            }
            PhalconCommand::Serve { host, port } => {
                args.flag("--host", host.as_deref());
                let port = port.filter(|p| *p != 0).map(|p| p.to_string());
                args.flag("--port", port.as_deref());
            }
        }
        args.0
    }
}

struct ArgList(Vec<String>);

impl ArgList {
    fn new(subcommand: &str) -> Self {
        Self(vec![subcommand.to_string()])
    }

    fn positional(&mut self, value: &str) {
        self.0.push(value.to_string());
    }

    fn flag(&mut self, flag: &str, value: Option<&str>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.0.push(flag.to_string());
            self.0.push(value.to_string());
        }
    }

    fn switch(&mut self, flag: &str, on: bool) {
        if on {
            self.0.push(flag.to_string());
        }
    }
}

/// Outcome of one invocation. `success` mirrors the exit status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub output: String,
    pub error: String,
}

/// Executes [`PhalconCommand`]s with a configured executable.
#[derive(Debug, Clone)]
pub struct PhalconRunner {
    executable: String,
}

impl PhalconRunner {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn from_config(config: &PhalconConfig) -> Self {
        Self::new(config.executable.clone())
    }

    /// Run to completion, capturing stdout and stderr. Spawn failures are
    /// reported in the outcome, not raised.
    pub fn run(&self, command: &PhalconCommand) -> CommandOutcome {
        let args = command.args();
        debug!(executable = %self.executable, ?args, "phalcon: running");

        match Command::new(&self.executable).args(&args).output() {
            Ok(output) => {
                let success = output.status.success();
                if !success {
                    warn!(
                        subcommand = command.subcommand(),
                        status = %output.status,
                        "phalcon: command failed"
                    );
                }
                CommandOutcome {
                    success,
                    output: String::from_utf8_lossy(&output.stdout).into_owned(),
                    error: String::from_utf8_lossy(&output.stderr).into_owned(),
                }
            }
            Err(e) => {
                warn!(executable = %self.executable, "phalcon: cannot spawn: {e}");
                CommandOutcome {
                    success: false,
                    output: String::new(),
                    error: format!("failed to run '{}': {e}", self.executable),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn bare_commands() {
        assert_eq!(PhalconCommand::Info.args(), vec!["info"]);
        assert_eq!(PhalconCommand::CreateWebtools.args(), vec!["create-webtools"]);
        assert_eq!(PhalconCommand::ListCommands.args(), vec!["list"]);
    }

    #[test]
    fn create_project_flags() {
        let cmd = PhalconCommand::CreateProject {
            name: "shop".into(),
            template: s("basic"),
            directory: s("/srv/www"),
        };
        assert_eq!(
            cmd.args(),
            vec!["create-project", "shop", "--template", "basic", "--directory", "/srv/www"]
        );
    }

    #[test]
    fn empty_options_are_dropped() {
        let cmd = PhalconCommand::CreateModel {
            name: "Users".into(),
            schema: s(""),
            namespace: None,
        };
        assert_eq!(cmd.args(), vec!["create-model", "Users"]);
    }

    #[test]
    fn module_controller_and_migration_flags() {
        assert_eq!(
            PhalconCommand::CreateModule {
                name: "admin".into(),
                project_path: s("/app"),
            }
            .args(),
            vec!["create-module", "admin", "--project-path", "/app"]
        );
        assert_eq!(
            PhalconCommand::CreateController {
                name: "Index".into(),
                base_class: s("Base"),
            }
            .args(),
            vec!["create-controller", "Index", "--base-class", "Base"]
        );
        assert_eq!(
            PhalconCommand::CreateMigration {
                name: "init".into(),
                table_name: s("users"),
                directory: None,
            }
            .args(),
            vec!["create-migration", "init", "--table-name", "users"]
        );
    }

    #[test]
    fn all_models_has_no_positional() {
        let cmd = PhalconCommand::CreateAllModels {
            schema: s("shop"),
            namespace: s("App\\Models"),
        };
        assert_eq!(
            cmd.args(),
            vec!["create-all-models", "--schema", "shop", "--namespace", "App\\Models"]
        );
    }

    #[test]
    fn scaffold_force_is_a_switch() {
        let forced = PhalconCommand::CreateScaffold {
            name: "posts".into(),
            schema: None,
            template: s("volt"),
            force: true,
        };
        assert_eq!(
            forced.args(),
            vec!["create-scaffold", "posts", "--template", "volt", "--force"]
        );

        let plain = PhalconCommand::CreateScaffold {
            name: "posts".into(),
            schema: None,
            template: None,
            force: false,
        };
        assert_eq!(plain.args(), vec!["create-scaffold", "posts"]);
    }

    #[test]
    fn serve_skips_zero_port() {
        let cmd = PhalconCommand::Serve {
            host: s("0.0.0.0"),
            port: Some(0),
        };
        assert_eq!(cmd.args(), vec!["serve", "--host", "0.0.0.0"]);

        let cmd = PhalconCommand::Serve {
            host: s(DEFAULT_HOST),
            port: Some(DEFAULT_PORT),
        };
        assert_eq!(cmd.args(), vec!["serve", "--host", "localhost", "--port", "8000"]);
    }

    #[test]
    fn missing_executable_reports_failure() {
        let runner = PhalconRunner::new("/nonexistent/phalcon-devtools-bin");
        let outcome = runner.run(&PhalconCommand::Info);
        assert!(!outcome.success);
        assert!(outcome.output.is_empty());
        assert!(outcome.error.contains("failed to run"));
    }
}
