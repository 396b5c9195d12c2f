//! Filesystem-backed instruction store.
//!
//! All methods are blocking (`std::fs`). Async callers run them through
//! `tokio::task::spawn_blocking`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use super::claim::{self, ClaimedInstruction};
use super::StoreError;

#[derive(Debug)]
struct Layout {
    watch_dir: PathBuf,
    done_dir: PathBuf,
    download_dir: PathBuf,
}

/// Watch / done / download directories. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InstructionStore {
    layout: Arc<Layout>,
}

impl InstructionStore {
    pub fn new(
        watch_dir: impl Into<PathBuf>,
        done_dir: impl Into<PathBuf>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            layout: Arc::new(Layout {
                watch_dir: watch_dir.into(),
                done_dir: done_dir.into(),
                download_dir: download_dir.into(),
            }),
        }
    }

    pub fn watch_dir(&self) -> &Path {
        &self.layout.watch_dir
    }

    pub fn done_dir(&self) -> &Path {
        &self.layout.done_dir
    }

    pub fn download_dir(&self) -> &Path {
        &self.layout.download_dir
    }

    pub fn ensure_dirs(&self) -> Result<(), StoreError> {
        for dir in [self.watch_dir(), self.done_dir(), self.download_dir()] {
            fs::create_dir_all(dir).map_err(|e| StoreError::io("create dir", dir, e))?;
        }
        Ok(())
    }

    /// Unclaimed instruction files, oldest first.
    ///
    /// Ordering uses the birth time where the filesystem records one and the
    /// modification time otherwise; ties are broken by name. It is a hint only.
    pub fn scan(&self) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.watch_dir();
        let entries = fs::read_dir(dir).map_err(|e| StoreError::io("list", dir, e))?;

        let mut candidates: Vec<(SystemTime, String, PathBuf)> = Vec::new();
        for entry in entries {
            // エントリ単位のエラーはスキップ（同時に消されたファイルなど）
            let Ok(entry) = entry else { continue };
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !claim::is_instruction_name(&name) {
                continue;
            }
            let path = entry.path();
            if dir.join(claim::claim_name(&name)).exists() {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let created = meta
                .created()
                .or_else(|_| meta.modified())
                .unwrap_or(UNIX_EPOCH);
            candidates.push((created, name, path));
        }

        candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(candidates.into_iter().map(|(_, _, path)| path).collect())
    }

    /// Claim one instruction by moving it to its claim marker.
    ///
    /// The move never replaces an existing marker, so whoever moves first owns
    /// the file, across threads and processes alike.
    pub fn claim(&self, path: &Path) -> Result<ClaimedInstruction, StoreError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| claim::is_instruction_name(n))
            .ok_or_else(|| StoreError::NotAnInstruction(path.to_path_buf()))?
            .to_string();
        let claim_path = path.with_file_name(claim::claim_name(&name));

        match move_no_replace(path, &claim_path) {
            Ok(()) => Ok(ClaimedInstruction::new(claim_path, name)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::Vanished(path.to_path_buf()))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyClaimed(path.to_path_buf()))
            }
            Err(e) => Err(StoreError::io("claim", path, e)),
        }
    }

    /// Replace the content of a claimed file (status write-back).
    pub fn write_back(&self, claimed: &ClaimedInstruction, bytes: &[u8]) -> Result<(), StoreError> {
        let target = claimed.claim_path();
        let dir = target.parent().unwrap_or(self.watch_dir());
        let tmp = dir.join(temp_name(&claim::claim_name(claimed.instruction_name())));
        write_then_rename(&tmp, target, bytes)
    }

    /// Publish a new instruction file in the watch directory.
    ///
    /// Content goes to a temp name first so a concurrent scan never sees a
    /// half-written file.
    pub fn write_instruction(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        if !claim::is_instruction_name(name) {
            return Err(StoreError::NotAnInstruction(PathBuf::from(name)));
        }
        let target = self.watch_dir().join(name);
        if target.exists() || self.watch_dir().join(claim::claim_name(name)).exists() {
            return Err(StoreError::Exists(target));
        }
        let tmp = self.watch_dir().join(temp_name(name));
        write_then_rename(&tmp, &target, bytes)?;
        Ok(target)
    }

    /// Persist a downloaded artifact under the download directory.
    pub fn write_artifact(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let target = self.download_dir().join(name);
        if target.exists() {
            return Err(StoreError::Exists(target));
        }
        fs::write(&target, bytes).map_err(|e| StoreError::io("write artifact", &target, e))?;
        Ok(target)
    }

    /// Move a claimed file into the done store under its original name.
    ///
    /// The done directory is recreated if it has gone missing since startup.
    pub fn relocate(&self, claimed: ClaimedInstruction) -> Result<PathBuf, StoreError> {
        let done = self.done_dir();
        fs::create_dir_all(done).map_err(|e| StoreError::io("create dir", done, e))?;
        let dest = done.join(claimed.instruction_name());
        move_file(claimed.claim_path(), &dest)?;
        Ok(dest)
    }

    /// Give an unstarted claim back: `<name>.json.lock` → `<name>.json`.
    pub fn release(&self, claimed: ClaimedInstruction) -> Result<PathBuf, StoreError> {
        let dest = claimed.claim_path().with_file_name(claimed.instruction_name());
        if dest.exists() {
            return Err(StoreError::Exists(dest));
        }
        fs::rename(claimed.claim_path(), &dest)
            .map_err(|e| StoreError::io("release", claimed.claim_path(), e))?;
        Ok(dest)
    }
}

fn temp_name(name: &str) -> String {
    format!(".{name}.tmp")
}

fn write_then_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    fs::write(tmp, bytes).map_err(|e| StoreError::io("write", tmp, e))?;
    if let Err(e) = fs::rename(tmp, target) {
        let _ = fs::remove_file(tmp);
        return Err(StoreError::io("rename", target, e));
    }
    Ok(())
}

/// `hard_link` + `remove_file`: link creation fails with `AlreadyExists`
/// instead of overwriting `to`, which a plain rename would do.
///
/// Filesystems without hard links fall back to check-then-rename, which
/// leaves a small window where a concurrent claimer could be overwritten.
fn move_no_replace(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {}
        Err(e) if matches!(
            e.kind(),
            io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied
        ) =>
        {
            debug!(from = %from.display(), error = %e, "hard links unavailable, renaming");
            if to.exists() {
                return Err(io::Error::from(io::ErrorKind::AlreadyExists));
            }
            return fs::rename(from, to);
        }
        Err(e) => return Err(e),
    }

    // 元ファイルを消せなかったら claim を取り消す（残すと二重処理になる）
    if let Err(e) = fs::remove_file(from) {
        let _ = fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}

/// rename, falling back to copy + remove when the rename cannot be done in
/// place (e.g. the done directory is on another device).
fn move_file(from: &Path, to: &Path) -> Result<(), StoreError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::io("move", from, e)),
        Err(e) => {
            debug!(from = %from.display(), to = %to.display(), error = %e, "rename failed, copying");
            fs::copy(from, to).map_err(|e| StoreError::io("copy", from, e))?;
            fs::remove_file(from).map_err(|e| StoreError::io("remove", from, e))
        }
    }
}
