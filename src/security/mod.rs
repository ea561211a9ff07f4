//! Security boundary for runbook actions.
//!
//! Runbook content is treated as less trusted than the workspace invoking
//! it. Filesystem-mutating actions confine their targets to the workspace
//! base directory through [`resolve_safe`].

mod paths;

pub use paths::{resolve_safe, resolve_safe_cwd};
