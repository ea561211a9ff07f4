//! Runbook system for versioned, integrity-checked automation.
//!
//! Runbooks are YAML documents holding ordered steps that dispatch to
//! registered actions. A runbook is resolved by `<id>@<version>`, its
//! checksum is verified, and only then are its steps executed.

mod checksum;
mod registry;
mod runtime;
mod schema;
mod template;

pub use checksum::{blank_checksum, canonical_json, compute_checksum, CHECKSUM_PREFIX};
pub use registry::{
    load_file, parse_spec, read_document, resolve_path, verify_checksum, IntegrityStatus,
    LoadedRunbook, RunbookEntry, RunbookRegistry, RunbookSpec, RUNBOOK_DIR, RUNBOOK_EXT,
};
pub use runtime::{ExecutionTrace, Run, RunState, RunbookRuntime, TraceEntry};
pub use schema::{Contract, Metadata, Observability, Runbook, ScopePolicy, Step, StepArgs};
pub use template::{render, render_str, Inputs};
