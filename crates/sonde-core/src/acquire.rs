//! Producing a local copy of a repository's contents.
//!
//! The analysis handler only needs a directory back; how it gets there
//! (clone, archive extraction, or an existing checkout) is the
//! [`Materializer`]'s business.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::{SondeError, SondeResult};

const SYMLINK_MODE: u32 = 0o120000;
const FILE_TYPE_MASK: u32 = 0o170000;

/// Where a repository's contents come from, as carried in a job payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RepositorySource {
    Git {
        url: String,
        #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },
    Archive {
        path: PathBuf,
    },
    Local {
        path: PathBuf,
    },
}

impl RepositorySource {
    /// Read the source out of a job payload. Extra keys are ignored.
    pub fn from_payload(payload: &Value) -> SondeResult<Self> {
        serde_json::from_value(payload.clone())
            .map_err(|e| SondeError::InvalidPayload(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RepositorySource::Git { .. } => "git",
            RepositorySource::Archive { .. } => "archive",
            RepositorySource::Local { .. } => "local",
        }
    }
}

#[async_trait]
pub trait Materializer: Send + Sync {
    /// Produce a directory holding the repository's files.
    async fn materialize(
        &self,
        repository_id: &str,
        source: &RepositorySource,
    ) -> SondeResult<PathBuf>;
}

/// Clones and extractions land in `<workspace_root>/<repository_id>`;
/// local sources are used in place.
#[derive(Clone, Debug)]
pub struct WorkspaceMaterializer {
    workspace_root: PathBuf,
}

impl WorkspaceMaterializer {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    fn destination(&self, repository_id: &str) -> PathBuf {
        let safe: String = repository_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let safe = safe.trim_matches('.');
        let name = if safe.is_empty() { "repository" } else { safe };
        self.workspace_root.join(name)
    }
}

#[async_trait]
impl Materializer for WorkspaceMaterializer {
    async fn materialize(
        &self,
        repository_id: &str,
        source: &RepositorySource,
    ) -> SondeResult<PathBuf> {
        let fetch: Box<dyn FnOnce(&Path) -> SondeResult<()> + Send> = match source {
            RepositorySource::Local { path } => return local_directory(path),
            RepositorySource::Git { url, reference } => {
                let (url, reference) = (url.clone(), reference.clone());
                Box::new(move |dest: &Path| clone_repository(&url, reference.as_deref(), dest))
            }
            RepositorySource::Archive { path } => {
                let path = path.clone();
                Box::new(move |dest: &Path| extract_archive(&path, dest))
            }
        };

        let dest = self.destination(repository_id);
        let kind = source.kind();
        let repository_id = repository_id.to_string();
        tokio::task::spawn_blocking(move || {
            prepare_destination(&dest)?;
            let result = fetch(&dest);
            match result {
                Ok(()) => {
                    info!(
                        repository_id = %repository_id,
                        source = kind,
                        path = %dest.display(),
                        "repository materialized"
                    );
                    Ok(dest)
                }
                Err(err) => {
                    if let Err(cleanup) = std::fs::remove_dir_all(&dest) {
                        if cleanup.kind() != io::ErrorKind::NotFound {
                            warn!(path = %dest.display(), error = %cleanup, "failed to remove partial output");
                        }
                    }
                    Err(err)
                }
            }
        })
        .await?
    }
}

fn local_directory(path: &Path) -> SondeResult<PathBuf> {
    let resolved = std::fs::canonicalize(path).map_err(|e| {
        SondeError::Acquisition(format!("cannot resolve {}: {e}", path.display()))
    })?;
    if !resolved.is_dir() {
        return Err(SondeError::Acquisition(format!(
            "{} is not a directory",
            resolved.display()
        )));
    }
    Ok(resolved)
}

/// Start from an empty destination; a previous run's output is replaced.
fn prepare_destination(dest: &Path) -> SondeResult<()> {
    match std::fs::remove_dir_all(dest) {
        Ok(()) => debug!(path = %dest.display(), "removed previous workspace"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    std::fs::create_dir_all(dest)?;
    Ok(())
}

/// Clone `url` into `dest`, then check out `reference` when one is given.
pub fn clone_repository(url: &str, reference: Option<&str>, dest: &Path) -> SondeResult<()> {
    let repo = git2::Repository::clone(url, dest)
        .map_err(|e| SondeError::Acquisition(format!("clone of {url} failed: {}", e.message())))?;

    let Some(reference) = reference else {
        return Ok(());
    };
    let object = repo
        .revparse_single(reference)
        .or_else(|_| repo.revparse_single(&format!("origin/{reference}")))
        .map_err(|_| SondeError::Acquisition(format!("unknown ref {reference:?} in {url}")))?;
    let commit = object.peel_to_commit()?;
    let mut checkout = git2::build::CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
    repo.set_head_detached(commit.id())?;
    debug!(url, reference, commit = %commit.id(), "checked out ref");
    Ok(())
}

/// Resolve an archive entry name to a path under the extraction root,
/// refusing anything that could escape it.
fn safe_entry_path(name: &str) -> SondeResult<PathBuf> {
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') || normalized.contains(':') {
        return Err(SondeError::UnsafeArchiveEntry(name.to_string()));
    }
    let mut out = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(SondeError::UnsafeArchiveEntry(name.to_string()));
            }
        }
    }
    Ok(out)
}

/// Extract a zip archive into `dest`. Every entry is validated before
/// anything is written.
pub fn extract_archive(archive: &Path, dest: &Path) -> SondeResult<()> {
    let file = File::open(archive).map_err(|e| {
        SondeError::Acquisition(format!("cannot open archive {}: {e}", archive.display()))
    })?;
    let mut zip = zip::ZipArchive::new(file)?;

    let mut plan = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let entry = zip.by_index(index)?;
        let name = entry.name().to_string();
        if let Some(mode) = entry.unix_mode() {
            if mode & FILE_TYPE_MASK == SYMLINK_MODE {
                return Err(SondeError::UnsafeArchiveEntry(name));
            }
        }
        let relative = safe_entry_path(&name)?;
        plan.push((index, relative, entry.is_dir()));
    }

    for (index, relative, is_dir) in plan {
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(&relative);
        if is_dir {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut entry = zip.by_index(index)?;
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, body) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_source_from_payload() {
        let git = RepositorySource::from_payload(&json!({
            "source": "git", "url": "https://example.com/r.git", "ref": "v1"
        }))
        .unwrap();
        assert_eq!(
            git,
            RepositorySource::Git {
                url: "https://example.com/r.git".to_string(),
                reference: Some("v1".to_string()),
            }
        );

        let local = RepositorySource::from_payload(&json!({"source": "local", "path": "/tmp", "extra": 1}))
            .unwrap();
        assert_eq!(local.kind(), "local");
    }

    #[test]
    fn test_bad_payload_is_invalid() {
        let err = RepositorySource::from_payload(&json!({"source": "ftp"})).unwrap_err();
        assert!(matches!(err, SondeError::InvalidPayload(_)));
        let err = RepositorySource::from_payload(&json!(null)).unwrap_err();
        assert!(matches!(err, SondeError::InvalidPayload(_)));
    }

    #[test]
    fn test_safe_entry_path() {
        assert_eq!(safe_entry_path("src/a.ts").unwrap(), PathBuf::from("src/a.ts"));
        assert_eq!(safe_entry_path("./b.py").unwrap(), PathBuf::from("b.py"));
        for bad in ["/etc/passwd", "../up.txt", "a/../../x", "C:\\win.ini", "..\\x"] {
            assert!(
                matches!(safe_entry_path(bad), Err(SondeError::UnsafeArchiveEntry(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_archive_is_extracted_into_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("repo.zip");
        build_zip(&archive, &[("src/a.ts", "export const a = 1;\n"), ("README.md", "# r\n")]);

        let materializer = WorkspaceMaterializer::new(dir.path().join("ws"));
        let out = materializer
            .materialize("repo-1", &RepositorySource::Archive { path: archive })
            .await
            .unwrap();
        assert_eq!(out, dir.path().join("ws").join("repo-1"));
        assert_eq!(
            std::fs::read_to_string(out.join("src/a.ts")).unwrap(),
            "export const a = 1;\n"
        );
        assert!(out.join("README.md").is_file());
    }

    #[tokio::test]
    async fn test_traversal_entry_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        build_zip(&archive, &[("ok.txt", "fine"), ("../escape.txt", "bad")]);

        let materializer = WorkspaceMaterializer::new(dir.path().join("ws"));
        let err = materializer
            .materialize("evil", &RepositorySource::Archive { path: archive })
            .await
            .unwrap_err();
        assert!(matches!(err, SondeError::UnsafeArchiveEntry(_)));
        assert!(!dir.path().join("escape.txt").exists());
        assert!(!dir.path().join("ws").join("evil").exists());
    }

    #[tokio::test]
    async fn test_missing_archive_fails_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let materializer = WorkspaceMaterializer::new(dir.path());
        let err = materializer
            .materialize(
                "r",
                &RepositorySource::Archive {
                    path: dir.path().join("nope.zip"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SondeError::Acquisition(_)));
    }

    #[tokio::test]
    async fn test_local_source_is_used_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let materializer = WorkspaceMaterializer::new(dir.path().join("ws"));
        let out = materializer
            .materialize(
                "r",
                &RepositorySource::Local {
                    path: dir.path().to_path_buf(),
                },
            )
            .await
            .unwrap();
        assert_eq!(out, std::fs::canonicalize(dir.path()).unwrap());

        let file = dir.path().join("f.txt");
        std::fs::write(&file, "x").unwrap();
        let err = materializer
            .materialize("r", &RepositorySource::Local { path: file })
            .await
            .unwrap_err();
        assert!(matches!(err, SondeError::Acquisition(_)));
    }

    #[test]
    fn test_destination_is_sanitized() {
        let materializer = WorkspaceMaterializer::new("/ws");
        assert_eq!(materializer.destination("a/b"), PathBuf::from("/ws/a_b"));
        assert_eq!(materializer.destination(".."), PathBuf::from("/ws/repository"));
    }
}
