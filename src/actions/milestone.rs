//! Milestone lifecycle actions: `milestone.init` and `milestone.complete`.
//!
//! Milestones live in `internal/development/milestones/<id>/` and are
//! registered in `internal/index.json`. Both actions accept the id as `id`
//! or `milestone_id`, and an optional `workspace_root` that must itself stay
//! inside the workspace.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Map, Value};

use super::{ActionArgs, ActionOutput, CommandRunner};
use crate::error::RunbookResult;
use crate::security::resolve_safe;

/// Scope required by both milestone actions.
pub const MILESTONE_SCOPE: &str = "milestone:write";

const MILESTONES_DIR: &str = "internal/development/milestones";
const INDEX_FILE: &str = "internal/index.json";
const PRD_TEMPLATE: &str = "templates/PRD-template.md";
const PRD_FILE: &str = "PRD.md";
const REPORT_FILE: &str = "completion_report.md";
const UNKNOWN_AUTHOR: &str = "Unknown Author";
const EVIDENCE_LIMIT: usize = 20;

/// Build the `milestone.init` handler rooted at `base`.
pub fn init_handler(
    base: PathBuf,
    runner: Arc<dyn CommandRunner>,
) -> impl Fn(&ActionArgs) -> RunbookResult<ActionOutput> + Send + Sync {
    move |args: &ActionArgs| init_milestone(args, &base, runner.as_ref())
}

/// Build the `milestone.complete` handler rooted at `base`.
pub fn complete_handler(
    base: PathBuf,
    runner: Arc<dyn CommandRunner>,
) -> impl Fn(&ActionArgs) -> RunbookResult<ActionOutput> + Send + Sync {
    move |args: &ActionArgs| complete_milestone(args, &base, runner.as_ref())
}

/// Create a milestone directory, seed its PRD and register it in the index.
///
/// An existing milestone is left alone and reported as
/// `skipped_or_warned`.
pub fn init_milestone(
    args: &ActionArgs,
    base: &Path,
    runner: &dyn CommandRunner,
) -> RunbookResult<ActionOutput> {
    let root = workspace_root(args, base)?;
    let id = milestone_id(args)?;
    let dir = resolve_safe(&format!("{MILESTONES_DIR}/{id}"), &root)?;

    if dir.exists() {
        tracing::warn!(milestone = id, "Milestone already exists");
        return Ok(outcome(
            "skipped_or_warned",
            format!("Milestone directory {id} already exists."),
            &id,
            &dir,
        ));
    }

    std::fs::create_dir_all(&dir)?;

    let template = resolve_safe(PRD_TEMPLATE, &root)?;
    if template.is_file() {
        let content = std::fs::read_to_string(&template)
            .with_context(|| format!("failed to read {}", template.display()))?;
        let content = content
            .replace("<AUTHOR>", &git_author(runner, &root))
            .replace("<DATE>", &today())
            .replace("<STATUS>", "Draft");
        std::fs::write(resolve_safe(&format!("{MILESTONES_DIR}/{id}/{PRD_FILE}"), &root)?, content)?;
    }

    let index_path = resolve_safe(INDEX_FILE, &root)?;
    let mut index = read_index(&index_path)?;
    let mut milestones = take_milestones(&mut index);
    if !milestones.iter().any(|entry| entry_id(entry) == Some(id.as_str())) {
        milestones.push(json!(id));
    }
    index.insert("milestones".to_string(), Value::Array(milestones));
    write_index(&index_path, &index)?;

    tracing::info!(milestone = id, path = %dir.display(), "Initialized milestone");
    Ok(outcome("success", format!("Milestone {id} initialized successfully."), &id, &dir))
}

/// Write a completion report with git evidence and mark the milestone
/// completed in the index.
pub fn complete_milestone(
    args: &ActionArgs,
    base: &Path,
    runner: &dyn CommandRunner,
) -> RunbookResult<ActionOutput> {
    let root = workspace_root(args, base)?;
    let id = milestone_id(args)?;
    let dir = resolve_safe(&format!("{MILESTONES_DIR}/{id}"), &root)?;
    if !dir.is_dir() {
        return Err(anyhow::anyhow!("milestone {id} has not been initialized").into());
    }

    let date = today();
    let evidence = git_evidence(runner, &root);
    let report_path = resolve_safe(&format!("{MILESTONES_DIR}/{id}/{REPORT_FILE}"), &root)?;
    std::fs::write(&report_path, render_report(&id, &date, &evidence))?;

    let index_path = resolve_safe(INDEX_FILE, &root)?;
    let mut index = read_index(&index_path)?;
    let mut milestones = take_milestones(&mut index);
    let completed = json!({ "id": id, "status": "completed", "completed_at": date });

    match milestones.iter_mut().find(|entry| entry_id(entry) == Some(id.as_str())) {
        Some(Value::Object(entry)) => {
            entry.insert("status".to_string(), json!("completed"));
            entry.insert("completed_at".to_string(), json!(date));
        }
        Some(entry) => *entry = completed,
        None => milestones.push(completed),
    }
    index.insert("milestones".to_string(), Value::Array(milestones));
    write_index(&index_path, &index)?;

    tracing::info!(milestone = id, evidence = evidence.len(), "Completed milestone");

    let mut out = outcome("success", format!("Milestone {id} completed."), &id, &dir);
    out.insert("report".to_string(), json!(report_path.display().to_string()));
    out.insert("evidence_count".to_string(), json!(evidence.len()));
    Ok(out)
}

fn workspace_root(args: &ActionArgs, base: &Path) -> RunbookResult<PathBuf> {
    let requested = args.get_str("workspace_root").filter(|s| !s.is_empty());
    resolve_safe(requested.as_deref().unwrap_or("."), base)
}

fn milestone_id(args: &ActionArgs) -> anyhow::Result<String> {
    let id = args
        .get_str("id")
        .or_else(|| args.get_str("milestone_id"))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing required argument 'id'"))?;

    let mut components = Path::new(&id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(id),
        _ => anyhow::bail!("invalid milestone id '{id}'"),
    }
}

fn outcome(status: &str, message: String, id: &str, dir: &Path) -> ActionOutput {
    let mut out = ActionOutput::new();
    out.insert("status".to_string(), json!(status));
    out.insert("message".to_string(), json!(message));
    out.insert("milestone_id".to_string(), json!(id));
    out.insert("path".to_string(), json!(dir.display().to_string()));
    out
}

fn entry_id(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(id) => Some(id.as_str()),
        Value::Object(fields) => fields.get("id").and_then(Value::as_str),
        _ => None,
    }
}

/// Read the milestone index; a missing or unreadable index starts empty.
fn read_index(path: &Path) -> RunbookResult<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }

    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str(&content) {
        Ok(Value::Object(index)) => Ok(index),
        _ => {
            tracing::warn!(path = %path.display(), "Replacing unreadable milestone index");
            Ok(Map::new())
        }
    }
}

fn take_milestones(index: &mut Map<String, Value>) -> Vec<Value> {
    match index.remove("milestones") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn write_index(path: &Path, index: &Map<String, Value>) -> RunbookResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rendered = serde_json::to_string_pretty(index).context("failed to serialize index")?;
    std::fs::write(path, rendered)?;
    Ok(())
}

fn git_author(runner: &dyn CommandRunner, root: &Path) -> String {
    git(runner, root, &["config", "user.name"])
        .map(|out| out.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}

fn git_evidence(runner: &dyn CommandRunner, root: &Path) -> Vec<String> {
    let limit = EVIDENCE_LIMIT.to_string();
    git(runner, root, &["log", "--oneline", "-n", &limit])
        .map(|out| out.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Run git in `root`, returning stdout on a zero exit.
fn git(runner: &dyn CommandRunner, root: &Path, args: &[&str]) -> Option<String> {
    let mut argv = vec!["-C".to_string(), root.display().to_string()];
    argv.extend(args.iter().map(|a| (*a).to_string()));

    match runner.run("git", &argv) {
        Ok(out) if out.code == 0 => Some(out.stdout),
        Ok(out) => {
            tracing::debug!(code = out.code, stderr = out.stderr.trim(), "git exited non-zero");
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "git unavailable");
            None
        }
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn render_report(id: &str, date: &str, evidence: &[String]) -> String {
    let mut out = format!("# Milestone {id} Completion Report\n\n- Completed: {date}\n\n");
    out.push_str("## Evidence Collection\n\n");
    if evidence.is_empty() {
        out.push_str("_No git history found._\n");
    }
    for line in evidence {
        out.push_str(&format!("- `{line}`\n"));
    }
    out
}
