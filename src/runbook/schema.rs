//! Runbook schema definitions.
//!
//! Defines the document structure for runbook files: `metadata`, `contract`,
//! `observability` and the ordered `steps`.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A runbook definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runbook {
    /// Identity and integrity fields
    #[serde(default)]
    pub metadata: Metadata,

    /// What the runbook needs and promises
    #[serde(default)]
    pub contract: Contract,

    /// Event and audit declarations
    #[serde(default)]
    pub observability: Observability,

    /// Steps to execute, in order
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Runbook metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Identifier, unique within a runbook store (e.g. `ops/notify`)
    #[serde(default)]
    pub id: String,

    /// Version string, compared to requests by exact equality
    #[serde(default)]
    pub version: String,

    /// `sha256:<hex>` digest of the canonical document
    #[serde(default)]
    pub checksum: String,

    /// Optional human description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Runbook contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    /// Capability scopes the steps collectively need
    #[serde(
        default = "ScopePolicy::deny_all",
        deserialize_with = "deserialize_scope_policy",
        serialize_with = "serialize_scope_policy"
    )]
    pub required_scopes: ScopePolicy,

    /// Advisory timeout; not enforced by the runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Declared inputs
    #[serde(default)]
    pub inputs: Vec<Value>,

    /// Declared preconditions
    #[serde(default)]
    pub preconditions: Vec<Value>,

    /// Declared outputs
    #[serde(default)]
    pub outputs: Vec<Value>,

    /// Idempotency probe description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_check: Option<Value>,

    /// Declared error codes
    #[serde(default)]
    pub error_codes: Vec<Value>,
}

impl Default for Contract {
    fn default() -> Self {
        Self {
            required_scopes: ScopePolicy::deny_all(),
            timeout_seconds: None,
            inputs: Vec::new(),
            preconditions: Vec::new(),
            outputs: Vec::new(),
            idempotency_check: None,
            error_codes: Vec::new(),
        }
    }
}

/// Which capability scopes a runbook's steps may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopePolicy {
    /// No scope enforcement at all.
    Unrestricted,
    /// Only actions requiring one of these scopes may run.
    RestrictedTo(BTreeSet<String>),
}

impl ScopePolicy {
    /// A restricted policy that grants nothing.
    pub fn deny_all() -> Self {
        Self::RestrictedTo(BTreeSet::new())
    }

    /// Restrict to the given scopes.
    pub fn restricted<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::RestrictedTo(scopes.into_iter().map(Into::into).collect())
    }

    /// Whether enforcement is disabled.
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }
}

fn deserialize_scope_policy<'de, D>(deserializer: D) -> Result<ScopePolicy, D::Error>
where
    D: Deserializer<'de>,
{
    let scopes: Option<Vec<String>> = Option::deserialize(deserializer)?;
    Ok(match scopes {
        None => ScopePolicy::Unrestricted,
        Some(list) => ScopePolicy::RestrictedTo(list.into_iter().collect()),
    })
}

fn serialize_scope_policy<S>(policy: &ScopePolicy, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match policy {
        ScopePolicy::Unrestricted => serializer.serialize_none(),
        ScopePolicy::RestrictedTo(scopes) => scopes.serialize(serializer),
    }
}

/// Observability declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observability {
    /// Whether the runtime should emit a structured event per step
    #[serde(default)]
    pub emit_events: bool,

    /// Artifacts an auditor should expect
    #[serde(default)]
    pub audit_artifacts: Vec<Value>,

    /// Known failure modes
    #[serde(default)]
    pub failure_modes: Vec<Value>,

    /// Side effects the steps declare
    #[serde(default)]
    pub declared_side_effects: Vec<Value>,
}

/// A step in the runbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Label used in the execution trace
    #[serde(default)]
    pub name: String,

    /// Key into the action registry
    pub action: String,

    /// Arguments, possibly templated
    #[serde(default)]
    pub args: StepArgs,
}

/// Step arguments as written in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepArgs {
    /// Alternating key/value tokens
    List(Vec<Value>),
    /// Native mapping
    Map(Map<String, Value>),
}

impl Default for StepArgs {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl StepArgs {
    /// View the arguments as a JSON value for rendering.
    pub fn to_value(&self) -> Value {
        match self {
            Self::List(items) => Value::Array(items.clone()),
            Self::Map(map) => Value::Object(map.clone()),
        }
    }
}

impl Runbook {
    /// Get the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// The `id@version` label of this runbook.
    pub fn label(&self) -> String {
        format!("{}@{}", self.metadata.id, self.metadata.version)
    }
}
