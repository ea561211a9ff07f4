//! The `governance.update_index` action.
//!
//! Rebuilds a JSON index of the governance documents matching a glob under
//! a target directory, with a SHA-256 per file and, optionally, a README
//! listing rendered from a header template.

use std::path::{Path, PathBuf};

use anyhow::Context;
use globset::{Glob, GlobMatcher};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::fs::parse_frontmatter;
use super::{ActionArgs, ActionOutput};
use crate::error::RunbookResult;
use crate::security::resolve_safe;

/// Scope required by `governance.update_index`.
pub const GOV_INDEX_SCOPE: &str = "gov:index";

const DEFAULT_PATTERN: &str = "*.md";
const DEFAULT_INDEX: &str = "index.json";
const README: &str = "README.md";

/// One indexed document.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedFile {
    /// Path relative to the target directory
    pub path: String,
    /// `sha256:<hex>` of the file content
    pub hash: String,
    /// Title from frontmatter, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Build the handler rooted at `base`.
pub fn handler(base: PathBuf) -> impl Fn(&ActionArgs) -> RunbookResult<ActionOutput> + Send + Sync {
    move |args: &ActionArgs| update_index(args, &base)
}

/// Rebuild the index described by `args`.
pub fn update_index(args: &ActionArgs, base: &Path) -> RunbookResult<ActionOutput> {
    let target_dir = resolve_safe(&args.require_str("target_dir")?, base)?;
    if !target_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "target_dir must be an existing directory: {}",
            target_dir.display()
        )
        .into());
    }

    let pattern = args.get_str("pattern").unwrap_or_else(|| DEFAULT_PATTERN.to_string());
    let matcher = Glob::new(&pattern)
        .with_context(|| format!("invalid pattern '{pattern}'"))?
        .compile_matcher();

    let index_output = args.get_str("index_output").unwrap_or_else(|| DEFAULT_INDEX.to_string());
    let index_path = resolve_safe(&index_output, &target_dir)?;
    let template = args.get_str("template").filter(|t| !t.is_empty());
    let dry_run = args.get_bool("dry_run");
    let allow_empty = args.get_bool("allow_empty");

    let files = collect(&target_dir, &matcher, &index_path)?;
    if files.is_empty() && !allow_empty {
        return Err(anyhow::anyhow!("no files matched pattern '{pattern}'").into());
    }

    let index = json!({ "pattern": pattern, "count": files.len(), "files": files });

    if !dry_run {
        let rendered = serde_json::to_string_pretty(&index).context("failed to serialize index")?;
        std::fs::write(&index_path, rendered + "\n")?;
        if let Some(ref header) = template {
            let readme_path = resolve_safe(README, &target_dir)?;
            std::fs::write(readme_path, render_readme(header, &files))?;
        }
    }

    tracing::info!(
        dir = %target_dir.display(),
        count = files.len(),
        dry_run,
        "Rebuilt governance index"
    );

    let mut out = ActionOutput::new();
    out.insert(
        "payload".to_string(),
        json!({
            "count": files.len(),
            "index_path": index_path.display().to_string(),
            "files": files,
            "dry_run": dry_run,
        }),
    );
    Ok(out)
}

fn collect(dir: &Path, matcher: &GlobMatcher, index_path: &Path) -> anyhow::Result<Vec<IndexedFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path == index_path {
            continue;
        }

        let relative = path.strip_prefix(dir).unwrap_or(path);
        if relative == Path::new(README) || !matcher.is_match(relative) {
            continue;
        }

        let content = std::fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&content);

        let title = std::str::from_utf8(&content)
            .ok()
            .and_then(|text| parse_frontmatter(text).ok())
            .and_then(|(meta, _)| meta.get("title").and_then(|t| t.as_str()).map(str::to_string));

        files.push(IndexedFile {
            path: relative.to_string_lossy().replace('\\', "/"),
            hash: format!("sha256:{:x}", hasher.finalize()),
            title,
        });
    }

    Ok(files)
}

fn render_readme(header: &str, files: &[IndexedFile]) -> String {
    let mut out = header.trim_end().to_string();
    out.push_str("\n\n");
    for file in files {
        let label = file.title.as_deref().unwrap_or(&file.path);
        out.push_str(&format!("- [{}]({})\n", label, file.path));
    }
    out
}
