//! The `aaa_cli` and `gh_cli` actions.
//!
//! Thin wrappers that forward a step's arguments, verbatim, to an external
//! command through the [`CommandRunner`] seam. As with the eval suite, a
//! non-zero exit is reported as data.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{ActionArgs, ActionOutput, CommandRunner};
use crate::error::RunbookResult;

/// Scope required by `aaa_cli`.
pub const AAA_CLI_SCOPE: &str = "cli:aaa";

/// Scope required by `gh_cli`.
pub const GH_CLI_SCOPE: &str = "cli:gh";

/// Build a handler forwarding to `program`.
///
/// Token-list arguments become the argv as written; mapping arguments must
/// carry an `argv` list.
pub fn handler(
    program: String,
    runner: Arc<dyn CommandRunner>,
) -> impl Fn(&ActionArgs) -> RunbookResult<ActionOutput> + Send + Sync {
    move |args: &ActionArgs| {
        let argv = argv(args)?;

        tracing::info!(program, args = ?argv, "Running command");
        let result = runner.run(&program, &argv)?;

        let mut command = vec![program.clone()];
        command.extend(argv);

        let mut out = ActionOutput::new();
        out.insert("command".to_string(), json!(command));
        out.insert("returncode".to_string(), json!(result.code));
        out.insert("stdout".to_string(), json!(result.stdout));
        out.insert("stderr".to_string(), json!(result.stderr));
        Ok(out)
    }
}

fn argv(args: &ActionArgs) -> anyhow::Result<Vec<String>> {
    let tokens: &[Value] = if args.tokens().is_empty() {
        match args.get("argv") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(other) => anyhow::bail!("argv must be a list, got {other}"),
            None => &[],
        }
    } else {
        args.tokens()
    };

    Ok(tokens
        .iter()
        .map(|token| match token {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect())
}
