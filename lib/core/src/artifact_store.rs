//! Reads, writes, and diffs artifact files under the managed root.
//! Writes are atomic per file (temp file + rename); deletes only ever
//! happen after the caller has already written and reloaded the new
//! set, never as part of `write()` itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::{content_hash, Artifact};

pub struct ArtifactStore {
  root: PathBuf,
  managed_extensions: &'static [&'static str],
  /// launchd only: restrict `list()` to plists whose base name starts
  /// with this prefix, so unrelated user agents are never touched.
  name_prefix: Option<String>,
}

impl ArtifactStore {
  pub fn new(
    root: PathBuf,
    managed_extensions: &'static [&'static str],
    name_prefix: Option<String>,
  ) -> Self {
    ArtifactStore { root, managed_extensions, name_prefix }
  }

  pub async fn list(&self) -> anyhow::Result<HashMap<PathBuf, Artifact>> {
    let mut out = HashMap::new();
    let mut entries = match tokio::fs::read_dir(&self.root).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
      Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if !self.is_managed(&path) {
        continue;
      }
      let content = tokio::fs::read(&path).await?;
      let metadata = entry.metadata().await?;
      let mode = file_mode(&metadata);
      let relative = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| path.clone());
      let hash = content_hash(&content);
      out.insert(relative.clone(), Artifact { path: relative, content, mode, hash });
    }

    Ok(out)
  }

  fn is_managed(&self, path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
      return false;
    };
    if !self.managed_extensions.contains(&ext) {
      return false;
    }
    if let Some(prefix) = &self.name_prefix {
      let Some(stem) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
      };
      return stem.starts_with(prefix.as_str());
    }
    true
  }

  /// Writes every artifact atomically, returning the absolute paths
  /// written. Individual failures are collected, not short-circuited,
  /// so one bad write doesn't strand the rest of the batch half-done.
  pub async fn write(
    &self,
    artifacts: &[Artifact],
  ) -> (Vec<PathBuf>, Vec<(PathBuf, anyhow::Error)>) {
    let mut written = Vec::new();
    let mut errors = Vec::new();

    if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
      errors.push((self.root.clone(), e.into()));
      return (written, errors);
    }

    for artifact in artifacts {
      let target = self.root.join(&artifact.path);
      match write_atomic(&target, &artifact.content, artifact.mode).await {
        Ok(()) => written.push(target),
        Err(e) => errors.push((target, e)),
      }
    }

    (written, errors)
  }

  pub async fn delete(
    &self,
    paths: &[PathBuf],
  ) -> Vec<(PathBuf, anyhow::Error)> {
    let mut errors = Vec::new();
    for relative in paths {
      let target = self.root.join(relative);
      if let Err(e) = tokio::fs::remove_file(&target).await {
        if e.kind() != std::io::ErrorKind::NotFound {
          errors.push((target, e.into()));
        }
      }
    }
    errors
  }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
  use std::os::unix::fs::PermissionsExt;
  metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
  0o644
}

async fn write_atomic(
  target: &Path,
  content: &[u8],
  mode: u32,
) -> anyhow::Result<()> {
  let tmp = target.with_extension(format!(
    "{}.tmp",
    target.extension().and_then(|e| e.to_str()).unwrap_or("artifact")
  ));
  tokio::fs::write(&tmp, content).await?;
  set_mode(&tmp, mode).await?;
  tokio::fs::rename(&tmp, target).await?;
  Ok(())
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> anyhow::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  let perms = std::fs::Permissions::from_mode(mode);
  tokio::fs::set_permissions(path, perms).await?;
  Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> anyhow::Result<()> {
  Ok(())
}
