//! Actions that runbook steps dispatch to.
//!
//! Provides:
//! - The scope-gated [`ActionRegistry`]
//! - [`ActionArgs`], the uniform argument map every handler receives
//! - The built-in catalog: notifications, workspace file edits, the
//!   governance index, milestones, and wrappers around the `aaa` and `gh`
//!   command lines and the eval suite runner
//!
//! Anything implementing [`ActionHandler`] (including plain closures) can be
//! registered next to the built-ins.

mod args;
mod cli;
mod evals;
mod fs;
mod index;
mod milestone;
mod notify;
mod registry;

pub use args::ActionArgs;
pub use cli::{AAA_CLI_SCOPE, GH_CLI_SCOPE};
pub use evals::{CommandOutput, CommandRunner, ProcessRunner, SuiteCommand, EVAL_RUN_SCOPE};
pub use fs::{fs_update_frontmatter, fs_write, parse_frontmatter, FS_WRITE_SCOPE};
pub use index::{update_index, IndexedFile, GOV_INDEX_SCOPE};
pub use milestone::{complete_milestone, init_milestone, MILESTONE_SCOPE};
pub use notify::{MemoryNotifier, Notifier, NullNotifier, StdoutNotifier, NOTIFY_SCOPE};
pub use registry::{ActionHandler, ActionOutput, ActionRegistry, ActionSpec};

use std::path::PathBuf;
use std::sync::Arc;

/// Built-in action names.
pub mod names {
    /// Structured notification.
    pub const NOTIFY: &str = "notify";
    /// Write a file under the workspace.
    pub const FS_WRITE: &str = "fs_write";
    /// Upsert Markdown frontmatter keys.
    pub const FS_UPDATE_FRONTMATTER: &str = "fs_update_frontmatter";
    /// Rebuild a governance document index.
    pub const UPDATE_INDEX: &str = "governance.update_index";
    /// Run an external eval suite.
    pub const EVALS_RUN: &str = "aaa_evals.run";
    /// Short alias of [`EVALS_RUN`].
    pub const EVALS_RUN_ALIAS: &str = "evals.run";
    /// Scaffold a milestone.
    pub const MILESTONE_INIT: &str = "milestone.init";
    /// Close a milestone with a completion report.
    pub const MILESTONE_COMPLETE: &str = "milestone.complete";
    /// Forward arguments to the `aaa` command line.
    pub const AAA_CLI: &str = "aaa_cli";
    /// Forward arguments to the GitHub command line.
    pub const GH_CLI: &str = "gh_cli";
}

const GH_PROGRAM: &str = "gh";

/// Collaborators the built-in actions are wired to.
#[derive(Clone)]
pub struct BuiltinContext {
    /// Directory filesystem actions are confined to
    pub base_dir: PathBuf,
    /// Where `notify` records go
    pub notifier: Arc<dyn Notifier>,
    /// Spawns external commands
    pub runner: Arc<dyn CommandRunner>,
    /// Suite-runner command line
    pub suite_command: SuiteCommand,
    /// Executable behind `aaa_cli`
    pub cli_program: String,
}

impl BuiltinContext {
    /// Context rooted at `base_dir` with stdout notifications and the
    /// default `aaa eval run` suite runner.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            runner: Arc::new(ProcessRunner::new().with_working_dir(&base_dir)),
            base_dir,
            notifier: Arc::new(StdoutNotifier),
            suite_command: SuiteCommand {
                program: "aaa".to_string(),
                args: vec!["eval".to_string(), "run".to_string()],
            },
            cli_program: "aaa".to_string(),
        }
    }

    /// Replace the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the command runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the suite-runner command line.
    #[must_use]
    pub fn with_suite_command(mut self, command: SuiteCommand) -> Self {
        self.suite_command = command;
        self
    }

    /// Replace the executable behind `aaa_cli`.
    #[must_use]
    pub fn with_cli_program(mut self, program: impl Into<String>) -> Self {
        self.cli_program = program.into();
        self
    }
}

impl ActionRegistry {
    /// Create a registry holding the built-in catalog.
    pub fn with_builtins(ctx: BuiltinContext) -> Self {
        let mut registry = Self::new();
        registry.register(names::NOTIFY, notify::handler(ctx.notifier), [NOTIFY_SCOPE]);
        registry.register(names::FS_WRITE, fs::write_handler(ctx.base_dir.clone()), [FS_WRITE_SCOPE]);
        registry.register(
            names::FS_UPDATE_FRONTMATTER,
            fs::frontmatter_handler(ctx.base_dir.clone()),
            [FS_WRITE_SCOPE],
        );
        registry.register(names::UPDATE_INDEX, index::handler(ctx.base_dir.clone()), [GOV_INDEX_SCOPE]);
        registry.register(
            names::MILESTONE_INIT,
            milestone::init_handler(ctx.base_dir.clone(), Arc::clone(&ctx.runner)),
            [MILESTONE_SCOPE],
        );
        registry.register(
            names::MILESTONE_COMPLETE,
            milestone::complete_handler(ctx.base_dir, Arc::clone(&ctx.runner)),
            [MILESTONE_SCOPE],
        );
        for name in [names::EVALS_RUN, names::EVALS_RUN_ALIAS] {
            registry.register(
                name,
                evals::handler(ctx.suite_command.clone(), Arc::clone(&ctx.runner)),
                [EVAL_RUN_SCOPE],
            );
        }
        registry.register(
            names::AAA_CLI,
            cli::handler(ctx.cli_program, Arc::clone(&ctx.runner)),
            [AAA_CLI_SCOPE],
        );
        registry.register(names::GH_CLI, cli::handler(GH_PROGRAM.to_string(), ctx.runner), [GH_CLI_SCOPE]);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runbook::ScopePolicy;

    #[test]
    fn test_builtins_registered_with_scopes() {
        let registry = ActionRegistry::with_builtins(BuiltinContext::new("."));

        assert_eq!(
            registry.names(),
            vec![
                "aaa_cli",
                "aaa_evals.run",
                "evals.run",
                "fs_update_frontmatter",
                "fs_write",
                "gh_cli",
                "governance.update_index",
                "milestone.complete",
                "milestone.init",
                "notify"
            ]
        );
        let scopes = |name: &str| registry.get(name).unwrap().scopes.iter().cloned().collect::<Vec<_>>();
        assert_eq!(scopes("notify"), vec!["notify:send"]);
        assert_eq!(scopes("fs_write"), vec!["fs:write"]);
        assert_eq!(scopes("fs_update_frontmatter"), vec!["fs:write"]);
        assert_eq!(scopes("governance.update_index"), vec!["gov:index"]);
        assert_eq!(scopes("aaa_evals.run"), vec!["eval:run"]);
        assert_eq!(scopes("evals.run"), vec!["eval:run"]);
        assert_eq!(scopes("milestone.init"), vec!["milestone:write"]);
        assert_eq!(scopes("milestone.complete"), vec!["milestone:write"]);
        assert_eq!(scopes("aaa_cli"), vec!["cli:aaa"]);
        assert_eq!(scopes("gh_cli"), vec!["cli:gh"]);
    }

    struct EchoRunner;

    impl CommandRunner for EchoRunner {
        fn run(&self, program: &str, args: &[String]) -> anyhow::Result<CommandOutput> {
            Ok(CommandOutput { code: 0, stdout: format!("{program} {}", args.join(" ")), stderr: String::new() })
        }
    }

    #[test]
    fn test_subprocess_builtins_share_runner() {
        let registry = ActionRegistry::with_builtins(
            BuiltinContext::new(".").with_runner(Arc::new(EchoRunner)).with_cli_program("aaa-dev"),
        );
        let policy = ScopePolicy::restricted(["eval:run", "cli:aaa", "cli:gh"]);

        let suite = ActionArgs::from_value(serde_json::json!(["suite", "security"]));
        for name in ["aaa_evals.run", "evals.run"] {
            let out = registry.execute(name, &suite, &policy).unwrap();
            assert_eq!(out["stdout"], "aaa eval run security");
        }

        let check = ActionArgs::from_value(serde_json::json!(["check", "--mode=blocking"]));
        let out = registry.execute("aaa_cli", &check, &policy).unwrap();
        assert_eq!(out["stdout"], "aaa-dev check --mode=blocking");

        let prs = ActionArgs::from_value(serde_json::json!(["pr", "list"]));
        let out = registry.execute("gh_cli", &prs, &policy).unwrap();
        assert_eq!(out["stdout"], "gh pr list");
    }

    #[test]
    fn test_builtin_notify_dispatch() {
        let notifier = Arc::new(MemoryNotifier::new());
        let registry =
            ActionRegistry::with_builtins(BuiltinContext::new(".").with_notifier(notifier.clone()));

        let args = ActionArgs::from_value(serde_json::json!(["message", "hi"]));
        registry.execute("notify", &args, &ScopePolicy::restricted(["notify:send"])).unwrap();

        assert_eq!(notifier.records().len(), 1);
    }
}
