//! Runbook resolution and integrity checking.
//!
//! A runbook is addressed as `<id>@<version>` and stored at
//! `<repo_root>/runbooks/<id>.yaml`. Nothing is returned for execution
//! unless the document's stated version and checksum match.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use walkdir::WalkDir;

use super::checksum::compute_checksum;
use super::Runbook;
use crate::error::{RunbookError, RunbookResult};

/// Directory under the repo root holding runbook documents.
pub const RUNBOOK_DIR: &str = "runbooks";

/// File extension of runbook documents.
pub const RUNBOOK_EXT: &str = "yaml";

/// A parsed `<id>@<version>` specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunbookSpec {
    /// Runbook identifier, may contain `/`
    pub id: String,
    /// Requested version, matched exactly
    pub version: String,
}

impl FromStr for RunbookSpec {
    type Err = RunbookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_spec(s)
    }
}

impl fmt::Display for RunbookSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// Split a specifier on its first `@`.
///
/// The id must be a relative path of plain segments so it always maps
/// inside the runbook store.
pub fn parse_spec(spec: &str) -> RunbookResult<RunbookSpec> {
    match spec.split_once('@') {
        Some((id, version)) if is_store_id(id) && !version.is_empty() => {
            Ok(RunbookSpec { id: id.to_string(), version: version.to_string() })
        }
        _ => Err(RunbookError::InvalidSpec { spec: spec.to_string() }),
    }
}

fn is_store_id(id: &str) -> bool {
    !id.is_empty()
        && !id.contains('\\')
        && Path::new(id).components().all(|c| matches!(c, Component::Normal(_)))
}

/// Path a runbook id maps to. Does not touch the filesystem.
pub fn resolve_path(repo_root: &Path, id: &str) -> PathBuf {
    repo_root.join(RUNBOOK_DIR).join(format!("{id}.{RUNBOOK_EXT}"))
}

/// A runbook that passed its integrity checks.
#[derive(Debug, Clone)]
pub struct LoadedRunbook {
    /// File the runbook was read from
    pub path: PathBuf,
    /// Raw document as parsed
    pub document: Value,
    /// Typed view of the document
    pub runbook: Runbook,
}

/// Integrity status of a discovered runbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
    /// Checksum present and correct.
    Verified,
    /// Document unusable; carries the error code and message.
    Rejected { code: String, message: String },
}

/// A runbook found on disk by [`RunbookRegistry::discover`].
#[derive(Debug, Clone)]
pub struct RunbookEntry {
    /// Id derived from the path under `runbooks/`
    pub id: String,
    /// Version the document declares, if readable
    pub version: Option<String>,
    /// Document path
    pub path: PathBuf,
    /// Integrity check result
    pub status: IntegrityStatus,
}

impl RunbookEntry {
    /// The `id@version` label, with `?` for an unknown version.
    pub fn label(&self) -> String {
        format!("{}@{}", self.id, self.version.as_deref().unwrap_or("?"))
    }
}

/// Read-only access to a runbook store.
#[derive(Debug, Clone)]
pub struct RunbookRegistry {
    root: PathBuf,
}

impl RunbookRegistry {
    /// Create a registry over `repo_root`.
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self { root: repo_root.into() }
    }

    /// The repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `spec` and verify version and checksum.
    pub fn resolve(&self, spec: &str) -> RunbookResult<LoadedRunbook> {
        let spec = parse_spec(spec)?;
        let path = resolve_path(&self.root, &spec.id);
        tracing::debug!(spec = %spec, path = %path.display(), "Resolving runbook");

        if !path.is_file() {
            return Err(RunbookError::NotFound { path });
        }

        let document = read_document(&path)?;
        check_version(&document, &spec.version)?;
        verify_checksum(&document)?;
        let runbook = to_runbook(&document, &path)?;

        Ok(LoadedRunbook { path, document, runbook })
    }

    /// Load an explicit runbook file.
    ///
    /// No version was requested so none is compared, but the checksum must
    /// be present and correct.
    pub fn load_file(&self, path: &Path) -> RunbookResult<LoadedRunbook> {
        load_file(path)
    }

    /// Find every runbook under `runbooks/`, sorted by id.
    ///
    /// Unreadable or tampered documents are reported with a rejected status
    /// rather than failing the scan.
    pub fn discover(&self) -> RunbookResult<Vec<RunbookEntry>> {
        let dir = self.root.join(RUNBOOK_DIR);
        let mut entries = Vec::new();
        if !dir.is_dir() {
            return Ok(entries);
        }

        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| RunbookError::Io(e.into()))?;
            let path = entry.path();
            let is_yaml = path.extension().map_or(false, |e| e == "yaml" || e == "yml");
            if !entry.file_type().is_file() || !is_yaml {
                continue;
            }

            let id = path
                .strip_prefix(&dir)
                .unwrap_or(path)
                .with_extension("")
                .to_string_lossy()
                .replace('\\', "/");

            let (version, status) = match read_document(path) {
                Ok(document) => {
                    let version = declared_version(&document);
                    let status = match verify_checksum(&document)
                        .and_then(|_| to_runbook(&document, path).map(|_| ()))
                    {
                        Ok(()) => IntegrityStatus::Verified,
                        Err(e) => rejected(&e),
                    };
                    (version, status)
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable runbook");
                    (None, rejected(&e))
                }
            };

            entries.push(RunbookEntry { id, version, path: path.to_path_buf(), status });
        }

        Ok(entries)
    }
}

/// Load and checksum-verify a runbook file.
pub fn load_file(path: &Path) -> RunbookResult<LoadedRunbook> {
    if !path.is_file() {
        return Err(RunbookError::NotFound { path: path.to_path_buf() });
    }

    let document = read_document(path)?;
    verify_checksum(&document)?;
    let runbook = to_runbook(&document, path)?;

    Ok(LoadedRunbook { path: path.to_path_buf(), document, runbook })
}

/// Parse a runbook file into a raw document.
pub fn read_document(path: &Path) -> RunbookResult<Value> {
    let content = std::fs::read_to_string(path)?;
    let document: Value = serde_yaml::from_str(&content).map_err(|e| {
        RunbookError::MalformedDocument { path: path.to_path_buf(), message: e.to_string() }
    })?;

    if !document.is_object() {
        return Err(RunbookError::MalformedDocument {
            path: path.to_path_buf(),
            message: "runbook document must be a mapping".to_string(),
        });
    }
    Ok(document)
}

/// Check the stated checksum against the recomputed one.
///
/// Returns the verified checksum.
pub fn verify_checksum(document: &Value) -> RunbookResult<String> {
    let stated = document
        .pointer("/metadata/checksum")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(RunbookError::ChecksumMissing)?;

    let computed = compute_checksum(document);
    if stated != computed {
        return Err(RunbookError::ChecksumMismatch { expected: stated.to_string(), computed });
    }
    Ok(computed)
}

fn check_version(document: &Value, requested: &str) -> RunbookResult<()> {
    let stated = document.pointer("/metadata/version").and_then(Value::as_str);
    if stated == Some(requested) {
        return Ok(());
    }
    Err(RunbookError::VersionMismatch {
        expected: requested.to_string(),
        found: declared_version(document),
    })
}

fn declared_version(document: &Value) -> Option<String> {
    match document.pointer("/metadata/version")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn to_runbook(document: &Value, path: &Path) -> RunbookResult<Runbook> {
    serde_json::from_value(document.clone()).map_err(|e| RunbookError::MalformedDocument {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn rejected(err: &RunbookError) -> IntegrityStatus {
    IntegrityStatus::Rejected { code: err.code().to_string(), message: err.to_string() }
}
