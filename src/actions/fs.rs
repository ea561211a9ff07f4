//! Filesystem actions: `fs_write` and `fs_update_frontmatter`.
//!
//! Both confine their target to the workspace base through the safe path
//! resolver before touching the disk.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{json, Value};
use serde_yaml::Mapping;

use super::{ActionArgs, ActionOutput};
use crate::error::RunbookResult;
use crate::security::resolve_safe;

/// Scope required by both filesystem actions.
pub const FS_WRITE_SCOPE: &str = "fs:write";

const FENCE: &str = "---";

/// Build the `fs_write` handler rooted at `base`.
pub fn write_handler(
    base: PathBuf,
) -> impl Fn(&ActionArgs) -> RunbookResult<ActionOutput> + Send + Sync {
    move |args: &ActionArgs| fs_write(args, &base)
}

/// Build the `fs_update_frontmatter` handler rooted at `base`.
pub fn frontmatter_handler(
    base: PathBuf,
) -> impl Fn(&ActionArgs) -> RunbookResult<ActionOutput> + Send + Sync {
    move |args: &ActionArgs| fs_update_frontmatter(args, &base)
}

/// Write (or append) `content` to `path`.
pub fn fs_write(args: &ActionArgs, base: &Path) -> RunbookResult<ActionOutput> {
    let target = resolve_safe(&args.require_str("path")?, base)?;
    let content = args.get_str("content").unwrap_or_default();
    let append = args.get_bool("append");

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(&target)?;
    file.write_all(content.as_bytes())?;

    tracing::info!(path = %target.display(), bytes = content.len(), append, "Wrote file");

    let mut out = ActionOutput::new();
    out.insert("path".to_string(), json!(target.display().to_string()));
    out.insert("bytes".to_string(), json!(content.len()));
    Ok(out)
}

/// Upsert keys in a Markdown file's YAML frontmatter.
pub fn fs_update_frontmatter(args: &ActionArgs, base: &Path) -> RunbookResult<ActionOutput> {
    let target = resolve_safe(&args.require_str("path")?, base)?;
    let updates = parse_updates(args.get("set"))?;

    let content = std::fs::read_to_string(&target)
        .with_context(|| format!("failed to read {}", target.display()))?;
    let (mut meta, body) = parse_frontmatter(&content)?;

    let mut updated = Vec::with_capacity(updates.len());
    for (key, value) in updates {
        meta.insert(serde_yaml::Value::String(key.clone()), value);
        updated.push(key);
    }

    std::fs::write(&target, render_frontmatter(&meta, &body)?)?;
    tracing::info!(path = %target.display(), keys = ?updated, "Updated frontmatter");

    let mut out = ActionOutput::new();
    out.insert("path".to_string(), json!(target.display().to_string()));
    out.insert("updated".to_string(), json!(updated));
    Ok(out)
}

/// Split a document into its frontmatter mapping and body.
///
/// A document without a leading `---` fence has empty frontmatter and is
/// returned whole as the body.
pub fn parse_frontmatter(content: &str) -> anyhow::Result<(Mapping, String)> {
    let Some(rest) = content.strip_prefix(FENCE).and_then(strip_line_end) else {
        return Ok((Mapping::new(), content.to_string()));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let meta = if yaml.trim().is_empty() {
                Mapping::new()
            } else {
                serde_yaml::from_str(yaml).context("frontmatter is not a YAML mapping")?
            };
            return Ok((meta, body.to_string()));
        }
        offset += line.len();
    }

    Ok((Mapping::new(), content.to_string()))
}

fn strip_line_end(s: &str) -> Option<&str> {
    s.strip_prefix("\r\n").or_else(|| s.strip_prefix('\n'))
}

fn render_frontmatter(meta: &Mapping, body: &str) -> anyhow::Result<String> {
    let yaml = serde_yaml::to_string(meta)?;
    Ok(format!("{FENCE}\n{yaml}{FENCE}\n{body}"))
}

/// Collect `set` updates from a mapping, a `k=v` string, or a list of them.
fn parse_updates(set: Option<&Value>) -> anyhow::Result<Vec<(String, serde_yaml::Value)>> {
    let mut updates = Vec::new();
    match set {
        None | Some(Value::Null) => anyhow::bail!("missing required argument 'set'"),
        Some(Value::Object(map)) => {
            for (key, value) in map {
                updates.push((key.clone(), serde_yaml::to_value(value)?));
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                updates.push(parse_assignment(item)?);
            }
        }
        Some(other) => updates.push(parse_assignment(other)?),
    }
    Ok(updates)
}

fn parse_assignment(item: &Value) -> anyhow::Result<(String, serde_yaml::Value)> {
    let text = match item {
        Value::String(s) => s.as_str(),
        other => anyhow::bail!("frontmatter update must be 'key=value', got {other}"),
    };
    let (key, raw) = text
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("frontmatter update must be 'key=value', got '{text}'"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("frontmatter update has an empty key: '{text}'");
    }
    // Scalars keep their YAML type so `ver=2` stays a number.
    let value = serde_yaml::from_str::<serde_yaml::Value>(raw)
        .ok()
        .filter(|v| !raw.trim().is_empty() && !v.is_mapping() && !v.is_sequence())
        .unwrap_or_else(|| serde_yaml::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
