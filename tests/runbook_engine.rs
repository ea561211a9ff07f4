//! Integration tests for runbook resolution and execution.
//!
//! Drives the library the way the CLI does: resolve from a store on disk,
//! then execute through the built-in action catalog.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use govrun::actions::{
    ActionArgs, ActionOutput, BuiltinContext, CommandOutput, CommandRunner, MemoryNotifier,
    SuiteCommand,
};
use govrun::runbook::{compute_checksum, resolve_path, Inputs, RunbookRegistry, RunbookRuntime};
use govrun::{ActionRegistry, RunbookError, RunbookResult};

fn seal(mut document: Value) -> Value {
    document["metadata"]["checksum"] = json!(compute_checksum(&document));
    document
}

fn store(root: &Path, id: &str, document: &Value) {
    let path = resolve_path(root, id);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_yaml::to_string(document).unwrap()).unwrap();
}

fn inputs(pairs: &[(&str, &str)]) -> Inputs {
    pairs.iter().map(|(k, v)| ((*k).to_string(), json!(v))).collect()
}

struct FakeSuite;

impl CommandRunner for FakeSuite {
    fn run(&self, program: &str, args: &[String]) -> anyhow::Result<CommandOutput> {
        Ok(CommandOutput { code: 1, stdout: format!("{program} {}", args.join(" ")), stderr: "1 failed".into() })
    }
}

mod resolution {
    use super::*;

    #[test]
    fn test_version_and_checksum_gate_execution() {
        let temp = TempDir::new().unwrap();
        let document = seal(json!({
            "metadata": {"id": "gov/release", "version": "2.1.0", "checksum": ""},
            "contract": {"required_scopes": ["notify:send"]},
            "steps": [{"name": "n", "action": "notify", "args": ["message", "release"]}],
        }));
        store(temp.path(), "gov/release", &document);

        let registry = RunbookRegistry::new(temp.path());
        assert!(registry.resolve("gov/release@2.1.0").is_ok());
        assert!(matches!(
            registry.resolve("gov/release@2.1").unwrap_err(),
            RunbookError::VersionMismatch { .. }
        ));
    }

    #[test]
    fn test_json_runbooks_are_accepted() {
        let temp = TempDir::new().unwrap();
        let document = seal(json!({
            "metadata": {"id": "plain", "version": "1", "checksum": ""},
            "contract": {"required_scopes": null},
            "steps": [],
        }));
        let path = resolve_path(temp.path(), "plain");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_string_pretty(&document).unwrap()).unwrap();

        let loaded = RunbookRegistry::new(temp.path()).resolve("plain@1").unwrap();
        assert!(loaded.runbook.contract.required_scopes.is_unrestricted());
    }

    #[test]
    fn test_non_ascii_content_checksum() {
        let temp = TempDir::new().unwrap();
        let document = seal(json!({
            "metadata": {"id": "intl", "version": "1", "checksum": ""},
            "contract": {"required_scopes": ["notify:send"]},
            "steps": [{"name": "café ✓", "action": "notify", "args": ["message", "déploiement terminé"]}],
        }));
        store(temp.path(), "intl", &document);

        assert!(RunbookRegistry::new(temp.path()).resolve("intl@1").is_ok());
    }
}

mod execution {
    use super::*;

    fn runtime(base: &Path, notifier: Arc<MemoryNotifier>) -> RunbookRuntime {
        let ctx = BuiltinContext::new(base)
            .with_notifier(notifier)
            .with_runner(Arc::new(FakeSuite))
            .with_suite_command(SuiteCommand { program: "evals".into(), args: vec!["run".into()] });
        RunbookRuntime::new(ActionRegistry::with_builtins(ctx))
    }

    #[test]
    fn test_governance_pipeline() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("docs/plan.md"), "---\nstatus: Draft\ntitle: Plan\n---\n# Plan\n")
            .unwrap();

        let document = seal(json!({
            "metadata": {"id": "gov/close", "version": "1.0.0", "checksum": ""},
            "contract": {"required_scopes": ["fs:write", "gov:index", "eval:run", "notify:send"]},
            "observability": {"emit_events": true},
            "steps": [
                {"name": "approve", "action": "fs_update_frontmatter",
                 "args": ["--path", "docs/plan.md", "--set", "status={{ inputs.status }}"]},
                {"name": "report", "action": "fs_write",
                 "args": {"path": "docs/report.md", "content": "# Report for {{ inputs.milestone }}\n"}},
                {"name": "index", "action": "governance.update_index",
                 "args": ["--target-dir", "docs", "--pattern", "*.md"]},
                {"name": "evals", "action": "aaa_evals.run", "args": ["suite", "{{ inputs.milestone }}"]},
                {"name": "announce", "action": "notify",
                 "args": ["message", "{{ inputs.milestone }} closed", "level", "warning"]},
            ],
        }));
        store(&root, "gov/close", &document);

        let loaded = RunbookRegistry::new(&root).resolve("gov/close@1.0.0").unwrap();
        let notifier = Arc::new(MemoryNotifier::new());
        let trace = runtime(&root, notifier.clone())
            .execute(&loaded.runbook, &inputs(&[("status", "Approved"), ("milestone", "v0.5")]))
            .unwrap();

        let names: Vec<_> = trace.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["approve", "report", "index", "evals", "announce"]);

        let plan = std::fs::read_to_string(root.join("docs/plan.md")).unwrap();
        assert!(plan.contains("status: Approved"));
        assert!(plan.ends_with("# Plan\n"));

        assert_eq!(trace.steps[2].output["payload"]["count"], 2);
        assert!(root.join("docs/index.json").exists());

        assert_eq!(trace.steps[3].output["returncode"], 1);
        assert_eq!(trace.steps[3].output["stdout"], "evals run v0.5");

        let records = notifier.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["level"], "WARNING");
        assert_eq!(records[0]["message"], "v0.5 closed");
    }

    #[test]
    fn test_failure_discards_trace_and_stops() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();

        let document = seal(json!({
            "metadata": {"id": "partial", "version": "1", "checksum": ""},
            "contract": {"required_scopes": ["notify:send"]},
            "steps": [
                {"name": "first", "action": "notify", "args": ["message", "one"]},
                {"name": "write", "action": "fs_write", "args": ["path", "x.txt", "content", "x"]},
                {"name": "third", "action": "notify", "args": ["message", "three"]},
            ],
        }));
        store(&root, "partial", &document);

        let loaded = RunbookRegistry::new(&root).resolve("partial@1").unwrap();
        let notifier = Arc::new(MemoryNotifier::new());
        let err = runtime(&root, notifier.clone()).execute(&loaded.runbook, &Inputs::new()).unwrap_err();

        assert_eq!(err.code(), "SCOPE_VIOLATION");
        assert_eq!(notifier.records().len(), 1);
        assert!(!root.join("x.txt").exists());
    }

    #[test]
    fn test_custom_actions_register_alongside_builtins() {
        let mut registry = ActionRegistry::with_builtins(
            BuiltinContext::new(".").with_notifier(Arc::new(MemoryNotifier::new())),
        );
        registry.register(
            "echo",
            |args: &ActionArgs| -> RunbookResult<ActionOutput> { Ok(args.as_map().clone()) },
            ["echo:run"],
        );

        let runbook: govrun::Runbook = serde_json::from_value(json!({
            "contract": {"required_scopes": ["echo:run"]},
            "steps": [{"name": "e", "action": "echo", "args": ["--greeting", "hi {{ inputs.who }}"]}],
        }))
        .unwrap();

        let trace = RunbookRuntime::new(registry)
            .execute(&runbook, &inputs(&[("who", "ops")]))
            .unwrap();
        assert_eq!(trace.steps[0].output["greeting"], "hi ops");
    }
}
