//! # Govrun
//!
//! Versioned, integrity-checked runbooks for governance automation.
//!
//! A runbook is a YAML document listing steps that dispatch to named
//! actions. Govrun resolves runbooks by `<id>@<version>`, refuses any whose
//! version or checksum does not match, and executes the rest through a
//! capability-scoped action registry.
//!
//! ## Features
//!
//! - **Integrity**: `sha256` checksum over a canonical JSON form, verified before execution
//! - **Scopes**: every action declares the capability scopes it needs
//! - **Templates**: `{{ inputs.<key> }}` placeholders in step arguments
//! - **Path guards**: filesystem actions cannot escape the workspace
//!
//! ## Quick Start
//!
//! ```bash
//! # Run a runbook
//! govrun run runbook ops/notify@1.0.0 --input id=42
//!
//! # Check a runbook without running it
//! govrun resolve runbook ops/notify@1.0.0
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::unnecessary_map_or)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::use_self)]

pub mod actions;
pub mod core;
pub mod error;
pub mod output;
pub mod runbook;
pub mod security;

// Re-export commonly used types
pub use actions::{ActionArgs, ActionRegistry, BuiltinContext};
pub use crate::core::Config;
pub use error::{RunbookError, RunbookResult};
pub use output::{OutputFormat, Response};
pub use runbook::{ExecutionTrace, Inputs, Runbook, RunbookRegistry, RunbookRuntime, ScopePolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "govrun";
