//! Error taxonomy for runbook resolution and execution.
//!
//! Every failure in the engine is one of these variants. Each carries the
//! structured detail a caller needs to tell "forbidden" apart from "corrupt"
//! apart from "missing", plus a stable machine code and exit code.

use std::path::PathBuf;

use serde_json::{json, Value};
use thiserror::Error;

/// Result type for runbook operations.
pub type RunbookResult<T> = Result<T, RunbookError>;

/// Errors raised while resolving or executing a runbook.
#[derive(Debug, Error)]
pub enum RunbookError {
    /// The `<id>@<version>` specifier is malformed.
    #[error("runbook spec must be <id>@<version>, got '{spec}'")]
    InvalidSpec { spec: String },

    /// No runbook file at the resolved path.
    #[error("runbook not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The runbook document could not be parsed.
    #[error("runbook is not valid YAML/JSON ({}): {message}", path.display())]
    MalformedDocument { path: PathBuf, message: String },

    /// The document's stated version differs from the requested one.
    #[error("runbook version mismatch: requested {expected}, document declares {}", found.as_deref().unwrap_or("<none>"))]
    VersionMismatch { expected: String, found: Option<String> },

    /// The document has no checksum.
    #[error("runbook checksum missing")]
    ChecksumMissing,

    /// The stated checksum does not match the recomputed one.
    #[error("runbook checksum mismatch: stated {expected}, computed {computed}")]
    ChecksumMismatch { expected: String, computed: String },

    /// A step names an action with no registered handler.
    #[error("unsupported action: {action}")]
    UnsupportedAction { action: String },

    /// The runbook contract does not grant a scope the action requires.
    #[error("action '{action}' requires one of [{}], runbook allows [{}]", required_any_of.join(", "), allowed.join(", "))]
    ScopeViolation {
        action: String,
        required_any_of: Vec<String>,
        allowed: Vec<String>,
        missing: Vec<String>,
    },

    /// A filesystem target resolves outside the trusted base directory.
    #[error("path escapes workspace: {} is not under {}", resolved.display(), base.display())]
    PathTraversal { base: PathBuf, resolved: PathBuf },

    /// A run was driven after it had already started.
    #[error("run {run_id} already started (state: {state})")]
    RunAlreadyStarted { run_id: String, state: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure raised inside an action handler.
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

impl RunbookError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSpec { .. } => "INVALID_SPEC",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::MalformedDocument { .. } => "MALFORMED_DOCUMENT",
            Self::VersionMismatch { .. } => "VERSION_MISMATCH",
            Self::ChecksumMissing => "CHECKSUM_MISSING",
            Self::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            Self::UnsupportedAction { .. } => "UNSUPPORTED_ACTION",
            Self::ScopeViolation { .. } => "SCOPE_VIOLATION",
            Self::PathTraversal { .. } => "PATH_TRAVERSAL",
            Self::RunAlreadyStarted { .. } => "RUN_ALREADY_STARTED",
            Self::Io(_) | Self::Handler(_) => "RUNTIME_ERROR",
        }
    }

    /// Structured detail payload for machine consumers.
    pub fn details(&self) -> Value {
        match self {
            Self::InvalidSpec { spec } => json!({ "spec": spec }),
            Self::NotFound { path } => json!({ "path": path.display().to_string() }),
            Self::MalformedDocument { path, message } => {
                json!({ "path": path.display().to_string(), "parser_message": message })
            }
            Self::VersionMismatch { expected, found } => {
                json!({ "expected": expected, "found": found })
            }
            Self::ChecksumMismatch { expected, computed } => {
                json!({ "expected": expected, "computed": computed })
            }
            Self::UnsupportedAction { action } => json!({ "action": action }),
            Self::ScopeViolation { action, required_any_of, allowed, missing } => json!({
                "action": action,
                "required_any_of": required_any_of,
                "allowed": allowed,
                "missing": missing,
            }),
            Self::PathTraversal { base, resolved } => {
                json!({
                    "base": base.display().to_string(),
                    "resolved_path": resolved.display().to_string(),
                })
            }
            Self::RunAlreadyStarted { run_id, state } => {
                json!({ "run_id": run_id, "state": state })
            }
            Self::ChecksumMissing | Self::Io(_) | Self::Handler(_) => json!({}),
        }
    }

    /// Process exit code the CLI should use for this error.
    ///
    /// Resolution, registry and security failures exit with `2`; anything
    /// raised at run time exits with `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::RunAlreadyStarted { .. } | Self::Io(_) | Self::Handler(_) => 1,
            _ => 2,
        }
    }

    /// Whether this error belongs to the integrity contract.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            Self::VersionMismatch { .. } | Self::ChecksumMissing | Self::ChecksumMismatch { .. }
        )
    }
}
