//! Scope-gated action dispatch.
//!
//! Maps action names to handlers. Each handler declares the capability
//! scopes it needs; [`ActionRegistry::execute`] checks them against the
//! caller's [`ScopePolicy`] before the handler runs.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::ActionArgs;
use crate::error::{RunbookError, RunbookResult};
use crate::runbook::ScopePolicy;

/// Payload returned by an action.
pub type ActionOutput = Map<String, Value>;

/// Something that can run as a runbook step.
pub trait ActionHandler: Send + Sync {
    /// Run the action with already-rendered arguments.
    fn call(&self, args: &ActionArgs) -> RunbookResult<ActionOutput>;
}

impl<F> ActionHandler for F
where
    F: Fn(&ActionArgs) -> RunbookResult<ActionOutput> + Send + Sync,
{
    fn call(&self, args: &ActionArgs) -> RunbookResult<ActionOutput> {
        self(args)
    }
}

/// A registered action.
#[derive(Clone)]
pub struct ActionSpec {
    /// Dispatch key
    pub name: String,
    /// Handler invoked on dispatch
    pub handler: Arc<dyn ActionHandler>,
    /// Scopes, any one of which authorizes the action
    pub scopes: BTreeSet<String>,
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec").field("name", &self.name).field("scopes", &self.scopes).finish()
    }
}

/// Registry of dispatchable actions.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, ActionSpec>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action, replacing any previous registration of `name`.
    pub fn register<H, I, S>(&mut self, name: impl Into<String>, handler: H, scopes: I)
    where
        H: ActionHandler + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let spec = ActionSpec {
            name: name.clone(),
            handler: Arc::new(handler),
            scopes: scopes.into_iter().map(Into::into).collect(),
        };
        if self.actions.insert(name.clone(), spec).is_some() {
            tracing::debug!(action = name, "Replaced action registration");
        }
    }

    /// Get an action by name.
    pub fn get(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.get(name)
    }

    /// Check if an action exists.
    pub fn has(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered action names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Get count of actions.
    pub fn count(&self) -> usize {
        self.actions.len()
    }

    /// Dispatch `name` with `args` under `policy`.
    ///
    /// Handler failures are returned exactly as the handler produced them.
    pub fn execute(
        &self,
        name: &str,
        args: &ActionArgs,
        policy: &ScopePolicy,
    ) -> RunbookResult<ActionOutput> {
        let spec = self
            .actions
            .get(name)
            .ok_or_else(|| RunbookError::UnsupportedAction { action: name.to_string() })?;

        check_scopes(spec, policy)?;

        spec.handler.call(args)
    }
}

fn check_scopes(spec: &ActionSpec, policy: &ScopePolicy) -> RunbookResult<()> {
    let allowed = match policy {
        ScopePolicy::Unrestricted => return Ok(()),
        ScopePolicy::RestrictedTo(allowed) => allowed,
    };

    if spec.scopes.is_empty() || !spec.scopes.is_disjoint(allowed) {
        return Ok(());
    }

    let missing: Vec<String> = spec.scopes.difference(allowed).cloned().collect();
    tracing::warn!(action = spec.name, missing = ?missing, "Scope violation");

    Err(RunbookError::ScopeViolation {
        action: spec.name.clone(),
        required_any_of: spec.scopes.iter().cloned().collect(),
        allowed: allowed.iter().cloned().collect(),
        missing,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use serde_json::json;

    fn ok_handler(_: &ActionArgs) -> RunbookResult<ActionOutput> {
        let mut out = ActionOutput::new();
        out.insert("ok".to_string(), json!(true));
        Ok(out)
    }

    #[test]
    fn test_registry_executes_handler() {
        let mut registry = ActionRegistry::new();
        registry.register("notify", ok_handler, ["notify:send"]);

        let result = registry
            .execute("notify", &ActionArgs::new(), &ScopePolicy::restricted(["notify:send"]))
            .unwrap();
        assert_eq!(result.get("ok"), Some(&json!(true)));
    }

    #[test]
    fn test_registry_blocks_missing_scope() {
        let mut registry = ActionRegistry::new();
        registry.register("fs_write", ok_handler, ["fs:write"]);

        let err = registry
            .execute("fs_write", &ActionArgs::new(), &ScopePolicy::deny_all())
            .unwrap_err();
        match err {
            RunbookError::ScopeViolation { required_any_of, allowed, missing, .. } => {
                assert_eq!(required_any_of, vec!["fs:write"]);
                assert!(allowed.is_empty());
                assert_eq!(missing, vec!["fs:write"]);
            }
            other => panic!("expected ScopeViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_any_matching_scope_authorizes() {
        let mut registry = ActionRegistry::new();
        registry.register("index", ok_handler, ["gov:index", "gov:admin"]);

        let policy = ScopePolicy::restricted(["gov:admin"]);
        assert!(registry.execute("index", &ActionArgs::new(), &policy).is_ok());
    }

    #[test]
    fn test_unrestricted_skips_enforcement() {
        let mut registry = ActionRegistry::new();
        registry.register("fs_write", ok_handler, ["fs:write"]);

        assert!(registry
            .execute("fs_write", &ActionArgs::new(), &ScopePolicy::Unrestricted)
            .is_ok());
    }

    #[test]
    fn test_unscoped_action_always_allowed() {
        let mut registry = ActionRegistry::new();
        registry.register("noop", ok_handler, Vec::<String>::new());

        assert!(registry.execute("noop", &ActionArgs::new(), &ScopePolicy::deny_all()).is_ok());
    }

    #[test]
    fn test_unsupported_action() {
        let registry = ActionRegistry::new();
        let err = registry
            .execute("missing", &ActionArgs::new(), &ScopePolicy::Unrestricted)
            .unwrap_err();
        assert!(matches!(err, RunbookError::UnsupportedAction { action } if action == "missing"));
    }

    #[test]
    fn test_last_registration_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut registry = ActionRegistry::new();
        registry.register("notify", ok_handler, ["notify:send"]);
        registry.register(
            "notify",
            move |_: &ActionArgs| -> RunbookResult<ActionOutput> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ActionOutput::new())
            },
            ["notify:send"],
        );

        let out = registry
            .execute("notify", &ActionArgs::new(), &ScopePolicy::Unrestricted)
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_handler_errors_propagate_unchanged() {
        let mut registry = ActionRegistry::new();
        registry.register(
            "boom",
            |_: &ActionArgs| -> RunbookResult<ActionOutput> {
                Err(anyhow::anyhow!("handler exploded").into())
            },
            Vec::<String>::new(),
        );

        let err = registry.execute("boom", &ActionArgs::new(), &ScopePolicy::Unrestricted);
        let err = err.unwrap_err();
        assert_eq!(err.code(), "RUNTIME_ERROR");
        assert_eq!(err.to_string(), "handler exploded");
    }
}
