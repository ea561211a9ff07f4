//! Runbook execution.
//!
//! Steps run strictly in document order on the calling thread. Each step's
//! arguments are rendered, normalized and dispatched through the action
//! registry under the runbook's scope policy. The first failure aborts the
//! run and the partial trace is dropped.

use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use super::template::{render, Inputs};
use super::Runbook;
use crate::actions::{ActionArgs, ActionOutput, ActionRegistry};
use crate::error::{RunbookError, RunbookResult};

/// Output of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    /// Step name
    pub name: String,
    /// Action output
    pub output: ActionOutput,
}

/// Ordered outputs of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionTrace {
    /// Entries in execution order
    pub steps: Vec<TraceEntry>,
}

impl ExecutionTrace {
    /// Number of executed steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no step ran.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> {
        self.steps.iter()
    }
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Created, no step dispatched yet
    NotStarted,
    /// Dispatching steps
    Running,
    /// Every step succeeded
    Completed,
    /// A step failed
    Failed,
}

impl RunState {
    /// Whether the run is over.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One execution of a runbook.
#[derive(Debug)]
pub struct Run {
    /// Identifier attached to log events
    pub id: Uuid,
    state: RunState,
    trace: ExecutionTrace,
}

impl Run {
    /// Create a fresh run.
    pub fn new() -> Self {
        Self { id: Uuid::new_v4(), state: RunState::NotStarted, trace: ExecutionTrace::default() }
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Trace accumulated so far.
    pub fn trace(&self) -> &ExecutionTrace {
        &self.trace
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(!self.state.is_terminal(), "run already finished");
        tracing::debug!(run_id = %self.id, from = ?self.state, to = ?next, "Run state change");
        self.state = next;
    }
}

impl Default for Run {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes runbooks against an action registry.
#[derive(Debug, Clone)]
pub struct RunbookRuntime {
    registry: ActionRegistry,
}

impl RunbookRuntime {
    /// Create a runtime dispatching through `registry`.
    pub fn new(registry: ActionRegistry) -> Self {
        Self { registry }
    }

    /// The action registry.
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Run every step of `runbook` with `inputs`.
    pub fn execute(&self, runbook: &Runbook, inputs: &Inputs) -> RunbookResult<ExecutionTrace> {
        let mut run = Run::new();
        self.drive(&mut run, runbook, inputs)?;
        Ok(run.trace)
    }

    /// Drive a fresh `run` to a terminal state.
    ///
    /// On failure the run is left `Failed` with the trace of the steps that
    /// succeeded before it. A run that has left `NotStarted` is rejected
    /// untouched.
    pub fn drive(&self, run: &mut Run, runbook: &Runbook, inputs: &Inputs) -> RunbookResult<()> {
        if run.state != RunState::NotStarted {
            return Err(RunbookError::RunAlreadyStarted {
                run_id: run.id.to_string(),
                state: format!("{:?}", run.state),
            });
        }

        let policy = &runbook.contract.required_scopes;
        let label = runbook.label();

        if let Some(timeout) = runbook.contract.timeout_seconds {
            tracing::debug!(runbook = label, timeout, "Advisory timeout is not enforced");
        }

        run.transition(RunState::Running);

        for (index, step) in runbook.steps.iter().enumerate() {
            tracing::info!(
                run_id = %run.id,
                runbook = label,
                step = step.name,
                action = step.action,
                "Dispatching step {}/{}",
                index + 1,
                runbook.step_count()
            );

            let started = Instant::now();
            let rendered = render(&step.args.to_value(), inputs, &run.trace.steps);
            let args = ActionArgs::from_value(rendered);

            let output = match self.registry.execute(&step.action, &args, policy) {
                Ok(output) => output,
                Err(e) => {
                    tracing::debug!(run_id = %run.id, step = step.name, code = e.code(), "Step failed");
                    run.transition(RunState::Failed);
                    return Err(e);
                }
            };

            if runbook.observability.emit_events {
                tracing::info!(
                    run_id = %run.id,
                    runbook = label,
                    step = step.name,
                    action = step.action,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Step completed"
                );
            }

            run.trace.steps.push(TraceEntry { name: step.name.clone(), output });
        }

        run.transition(RunState::Completed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::actions::{BuiltinContext, MemoryNotifier};
    use crate::runbook::ScopePolicy;

    fn runbook(value: serde_json::Value) -> Runbook {
        serde_json::from_value(value).unwrap()
    }

    fn inputs(pairs: &[(&str, &str)]) -> Inputs {
        pairs.iter().map(|(k, v)| ((*k).to_string(), json!(v))).collect()
    }

    fn echo(args: &ActionArgs) -> RunbookResult<ActionOutput> {
        Ok(args.as_map().clone())
    }

    #[test]
    fn test_steps_run_in_order() {
        let mut registry = ActionRegistry::new();
        registry.register("echo", echo, Vec::<String>::new());
        let runtime = RunbookRuntime::new(registry);

        let rb = runbook(json!({
            "contract": {"required_scopes": null},
            "steps": [
                {"name": "first", "action": "echo", "args": {"n": "1"}},
                {"name": "second", "action": "echo", "args": ["n", "{{ inputs.n }}"]},
            ],
        }));

        let trace = runtime.execute(&rb, &inputs(&[("n", "2")])).unwrap();

        let names: Vec<_> = trace.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(trace.steps[1].output["n"], "2");
    }

    #[test]
    fn test_first_failure_aborts_run() {
        let third_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&third_calls);

        let mut registry = ActionRegistry::new();
        registry.register("ok", echo, Vec::<String>::new());
        registry.register(
            "fail",
            |_: &ActionArgs| -> RunbookResult<ActionOutput> { Err(anyhow::anyhow!("step 2 broke").into()) },
            Vec::<String>::new(),
        );
        registry.register(
            "count",
            move |_: &ActionArgs| -> RunbookResult<ActionOutput> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ActionOutput::new())
            },
            Vec::<String>::new(),
        );
        let runtime = RunbookRuntime::new(registry);

        let rb = runbook(json!({
            "contract": {"required_scopes": null},
            "steps": [
                {"name": "one", "action": "ok"},
                {"name": "two", "action": "fail"},
                {"name": "three", "action": "count"},
            ],
        }));

        let err = runtime.execute(&rb, &Inputs::new()).unwrap_err();
        assert_eq!(err.to_string(), "step 2 broke");
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);

        let mut run = Run::new();
        assert!(runtime.drive(&mut run, &rb, &Inputs::new()).is_err());
        assert_eq!(run.state(), RunState::Failed);
        assert_eq!(run.trace().len(), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_completed_run_state() {
        let mut registry = ActionRegistry::new();
        registry.register("echo", echo, Vec::<String>::new());
        let runtime = RunbookRuntime::new(registry);
        let rb = runbook(json!({"steps": [{"name": "a", "action": "echo"}]}));

        let mut run = Run::new();
        assert_eq!(run.state(), RunState::NotStarted);
        runtime.drive(&mut run, &rb, &Inputs::new()).unwrap();
        assert_eq!(run.state(), RunState::Completed);
        assert!(run.state().is_terminal());
    }

    #[test]
    fn test_finished_run_cannot_be_driven_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = ActionRegistry::new();
        registry.register(
            "count",
            move |_: &ActionArgs| -> RunbookResult<ActionOutput> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ActionOutput::new())
            },
            Vec::<String>::new(),
        );
        let runtime = RunbookRuntime::new(registry);
        let rb = runbook(json!({"steps": [{"name": "a", "action": "count"}]}));

        let mut run = Run::new();
        runtime.drive(&mut run, &rb, &Inputs::new()).unwrap();

        let err = runtime.drive(&mut run, &rb, &Inputs::new()).unwrap_err();
        assert_eq!(err.code(), "RUN_ALREADY_STARTED");
        assert_eq!(err.details()["state"], "Completed");
        assert_eq!(run.state(), RunState::Completed);
        assert_eq!(run.trace().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scope_violation_stops_run() {
        let registry = ActionRegistry::with_builtins(
            BuiltinContext::new(".").with_notifier(Arc::new(MemoryNotifier::new())),
        );
        let runtime = RunbookRuntime::new(registry);

        let rb = runbook(json!({
            "contract": {"required_scopes": []},
            "steps": [{"name": "notify", "action": "notify", "args": ["message", "hi"]}],
        }));
        assert_eq!(rb.contract.required_scopes, ScopePolicy::deny_all());

        let err = runtime.execute(&rb, &Inputs::new()).unwrap_err();
        assert!(matches!(err, RunbookError::ScopeViolation { .. }));
    }

    #[test]
    fn test_unsupported_action_stops_run() {
        let runtime = RunbookRuntime::new(ActionRegistry::new());
        let rb = runbook(json!({"steps": [{"name": "x", "action": "nope"}]}));

        let err = runtime.execute(&rb, &Inputs::new()).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_ACTION");
    }

    #[test]
    fn test_end_to_end_notify() {
        let notifier = Arc::new(MemoryNotifier::new());
        let registry =
            ActionRegistry::with_builtins(BuiltinContext::new(".").with_notifier(notifier.clone()));
        let runtime = RunbookRuntime::new(registry);

        let rb = runbook(json!({
            "metadata": {"id": "ops/notify", "version": "1.0.0"},
            "contract": {"required_scopes": ["notify:send"]},
            "observability": {"emit_events": true},
            "steps": [
                {"name": "notify", "action": "notify", "args": ["message", "Build {{inputs.id}} done"]}
            ],
        }));

        let trace = runtime.execute(&rb, &inputs(&[("id", "42")])).unwrap();

        assert_eq!(trace.len(), 1);
        assert_eq!(trace.steps[0].name, "notify");
        assert_eq!(trace.steps[0].output["message"], "Build 42 done");
        assert_eq!(notifier.records()[0]["message"], "Build 42 done");

        let serialized = serde_json::to_value(&trace).unwrap();
        assert_eq!(serialized["steps"][0]["output"]["action"], "notify");
    }
}
