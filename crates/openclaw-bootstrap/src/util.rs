use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::{Error, Result};

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs::create_dir_all(p)
        .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", p.display())))
}

pub fn write_text(p: &Path, s: &str) -> Result<()> {
    if let Some(parent) = p.parent() {
        ensure_dir(parent)?;
    }
    fs::write(p, s).map_err(|e| Error::msg(format!("failed to write {}: {e}", p.display())))
}

pub fn write_json_pretty(p: &Path, v: &serde_json::Value) -> Result<()> {
    let mut s = serde_json::to_string_pretty(v)
        .map_err(|e| Error::msg(format!("json encode error: {e}")))?;
    s.push('\n');
    write_text(p, &s)
}

pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(src, dst).map_err(|e| {
        Error::msg(format!(
            "failed to copy {} -> {}: {e}",
            src.display(),
            dst.display()
        ))
    })?;
    Ok(())
}

/// Recursive copy of a directory tree. Individual entry failures are logged
/// and skipped; the return value is the number of entries that failed.
/// Restore and migration must never abort startup over a bad file.
pub fn copy_dir_best_effort(src: &Path, dst: &Path) -> usize {
    let mut failures = 0usize;

    if let Err(e) = ensure_dir(dst) {
        warn!("copy {} -> {}: {e}", src.display(), dst.display());
        return 1;
    }

    for entry in walkdir::WalkDir::new(src) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("walkdir error under {}: {e}", src.display());
                failures += 1;
                continue;
            }
        };
        let p = entry.path();
        let rel = match p.strip_prefix(src) {
            Ok(r) => r,
            Err(e) => {
                warn!("strip_prefix failed for {}: {e}", p.display());
                failures += 1;
                continue;
            }
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let out = dst.join(rel);
        let res = if entry.file_type().is_dir() {
            ensure_dir(&out)
        } else if entry.file_type().is_symlink() {
            copy_symlink(p, &out)
        } else {
            copy_file(p, &out)
        };
        if let Err(e) = res {
            warn!("{e}");
            failures += 1;
        }
    }

    failures
}

#[cfg(unix)]
pub fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    use std::os::unix::fs as unix_fs;

    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    if fs::symlink_metadata(dst).is_ok() {
        fs::remove_file(dst)
            .map_err(|e| Error::msg(format!("failed to remove {}: {e}", dst.display())))?;
    }
    let target = fs::read_link(src)
        .map_err(|e| Error::msg(format!("failed to read symlink {}: {e}", src.display())))?;
    unix_fs::symlink(&target, dst).map_err(|e| {
        Error::msg(format!(
            "failed to create symlink {} -> {}: {e}",
            dst.display(),
            target.display()
        ))
    })?;
    Ok(())
}

#[cfg(not(unix))]
pub fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    copy_file(src, dst)
}

/// Make `link_path` a symlink pointing at `target`, replacing whatever file
/// or stale link is there. No-op when the link already points at `target`.
#[cfg(unix)]
pub fn ensure_symlink(target: &Path, link_path: &Path) -> Result<()> {
    use std::os::unix::fs as unix_fs;

    if let Some(parent) = link_path.parent() {
        ensure_dir(parent)?;
    }

    if let Ok(existing) = fs::read_link(link_path) {
        if existing == target {
            return Ok(());
        }
        fs::remove_file(link_path)
            .map_err(|e| Error::msg(format!("failed to remove {}: {e}", link_path.display())))?;
    } else if link_path.exists() {
        fs::remove_file(link_path)
            .map_err(|e| Error::msg(format!("failed to remove {}: {e}", link_path.display())))?;
    }

    unix_fs::symlink(target, link_path).map_err(|e| {
        Error::msg(format!(
            "failed to create symlink {} -> {}: {e}",
            link_path.display(),
            target.display()
        ))
    })?;
    Ok(())
}

#[cfg(not(unix))]
pub fn ensure_symlink(_target: &Path, _link_path: &Path) -> Result<()> {
    Err(Error::msg("symlink creation is only supported on unix"))
}

/// True when the directory exists and has at least one entry.
pub fn dir_non_empty(p: &Path) -> bool {
    fs::read_dir(p)
        .map(|mut it| it.next().is_some())
        .unwrap_or(false)
}
