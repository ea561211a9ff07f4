//! Response rendering for the CLI.
//!
//! Every command outcome becomes a [`Response`], printed in one of three
//! formats: plain text for people, JSON for automation, and a Markdown
//! report with tagged sections for language-model agents.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RunbookError;

/// Output format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain text
    #[default]
    Human,
    /// Machine-readable JSON
    Json,
    /// Markdown report for agents
    Llm,
}

/// Outcome of a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    /// Success with a result payload
    Ok { result: Value },
    /// Failure with a machine code and structured detail
    Error { error_code: String, message: String, details: Value },
}

impl Response {
    /// Successful response.
    pub fn ok(result: impl Serialize) -> anyhow::Result<Self> {
        Ok(Self::Ok { result: serde_json::to_value(result)? })
    }

    /// Error response for `err`.
    pub fn error(err: &RunbookError) -> Self {
        Self::Error {
            error_code: err.code().to_string(),
            message: err.to_string(),
            details: err.details(),
        }
    }

    /// Whether this is a success.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// Render in `format`. `subject` names what the command acted on.
    pub fn render(&self, format: OutputFormat, subject: &str) -> String {
        match format {
            OutputFormat::Human => self.render_human(subject),
            OutputFormat::Json => {
                serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Llm => self.render_llm(subject),
        }
    }

    fn render_human(&self, subject: &str) -> String {
        match self {
            Self::Ok { result } => {
                let mut out = format!("runbook executed: {subject}");
                for name in step_names(result) {
                    let _ = write!(out, "\n  \u{2713} {name}");
                }
                out
            }
            Self::Error { error_code, message, .. } => {
                format!("runbook error: {message} [{error_code}]")
            }
        }
    }

    fn render_llm(&self, subject: &str) -> String {
        let mut lines = vec![format!("# Runbook Report: {subject}")];
        match self {
            Self::Ok { result } => {
                lines.push("Status: **OK**".to_string());
                let names = step_names(result);
                if !names.is_empty() {
                    lines.push("\n## Steps".to_string());
                    for (i, name) in names.iter().enumerate() {
                        lines.push(format!("{}. {name}", i + 1));
                    }
                }
                lines.push(format!("\n## Result\n```json\n{}\n```", pretty(result)));
            }
            Self::Error { error_code, message, details } => {
                lines.push("Status: **ERROR**".to_string());
                lines.push(format!("\n### <ERROR_CODE>{error_code}</ERROR_CODE>"));
                lines.push(format!("\n#### <ERROR_DETAIL>\n{message}\n</ERROR_DETAIL>"));
                if details.as_object().is_some_and(|d| !d.is_empty()) {
                    lines.push(format!("\n```json\n{}\n```", pretty(details)));
                }
            }
        }
        lines.join("\n")
    }
}

fn step_names(result: &Value) -> Vec<&str> {
    result
        .get("steps")
        .and_then(Value::as_array)
        .map(|steps| steps.iter().filter_map(|s| s.get("name").and_then(Value::as_str)).collect())
        .unwrap_or_default()
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trace() -> Value {
        json!({"steps": [{"name": "notify", "output": {"message": "Build 42 done"}}]})
    }

    #[test]
    fn test_json_ok_shape() {
        let response = Response::ok(trace()).unwrap();
        let parsed: Value =
            serde_json::from_str(&response.render(OutputFormat::Json, "ops/notify@1.0.0")).unwrap();

        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["result"]["steps"][0]["output"]["message"], "Build 42 done");
    }

    #[test]
    fn test_json_error_shape() {
        let err = RunbookError::UnsupportedAction { action: "nope".to_string() };
        let parsed: Value =
            serde_json::from_str(&Response::error(&err).render(OutputFormat::Json, "x")).unwrap();

        assert_eq!(parsed["status"], "error");
        assert_eq!(parsed["error_code"], "UNSUPPORTED_ACTION");
        assert_eq!(parsed["details"]["action"], "nope");
        assert!(parsed["message"].as_str().unwrap().contains("nope"));
    }

    #[test]
    fn test_human_lists_steps() {
        let text = Response::ok(trace()).unwrap().render(OutputFormat::Human, "runbooks/a.yaml");
        assert!(text.starts_with("runbook executed: runbooks/a.yaml"));
        assert!(text.contains("notify"));
    }

    #[test]
    fn test_llm_error_is_tagged() {
        let err = RunbookError::ChecksumMissing;
        let text = Response::error(&err).render(OutputFormat::Llm, "ops/x@1");
        assert!(text.contains("<ERROR_CODE>CHECKSUM_MISSING</ERROR_CODE>"));
        assert!(text.contains("Status: **ERROR**"));
    }

    #[test]
    fn test_format_parses_from_config() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: OutputFormat,
        }
        let w: Wrapper = toml::from_str("format = \"llm\"").unwrap();
        assert_eq!(w.format, OutputFormat::Llm);
    }
}
