//! The `notify` action.
//!
//! Builds a structured notification record and hands it to a [`Notifier`].
//! The record is also the step output, so it lands in the execution trace.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{ActionArgs, ActionOutput};
use crate::error::RunbookResult;

/// Scope required by `notify`.
pub const NOTIFY_SCOPE: &str = "notify:send";

/// Destination for notification records.
pub trait Notifier: Send + Sync {
    /// Deliver one record.
    fn send(&self, record: &Value) -> anyhow::Result<()>;
}

/// Writes each record as one JSON line on stdout.
#[derive(Debug, Default)]
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn send(&self, record: &Value) -> anyhow::Result<()> {
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer(&mut stdout, record)?;
        writeln!(stdout)?;
        Ok(())
    }
}

/// Discards records.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn send(&self, _record: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    records: Mutex<Vec<Value>>,
}

impl MemoryNotifier {
    /// Create an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records delivered so far.
    pub fn records(&self) -> Vec<Value> {
        self.records.lock().clone()
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, record: &Value) -> anyhow::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Build the `notify` handler.
pub fn handler(
    notifier: Arc<dyn Notifier>,
) -> impl Fn(&ActionArgs) -> RunbookResult<ActionOutput> + Send + Sync {
    move |args: &ActionArgs| {
        let record = build_record(args);
        notifier.send(&record)?;

        match record {
            Value::Object(map) => Ok(map),
            _ => Ok(ActionOutput::new()),
        }
    }
}

fn build_record(args: &ActionArgs) -> Value {
    let level = args.get_str("level").unwrap_or_else(|| "INFO".to_string()).to_uppercase();
    json!({
        "level": level,
        "source": "runbook_runtime",
        "action": "notify",
        "timestamp": iso_now(),
        "message": args.get_str("message").unwrap_or_default(),
        "payload": args.clone().into_value(),
    })
}

fn iso_now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
