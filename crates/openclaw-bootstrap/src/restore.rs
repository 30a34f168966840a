use std::fs;
use std::path::Path;
use std::time::SystemTime;

use tracing::{info, warn};

use crate::Outcome;
use crate::error::Result;
use crate::settings::{CONFIG_FILE, LEGACY_CONFIG_FILE, Layout, SYNC_MARKER};
use crate::util;

/// Freshness gate for every restore decision. Comparison is by marker file
/// mtime only; the backup medium does not preserve reliable timestamps
/// inside file contents.
///
/// - no remote marker: nothing to restore
/// - remote marker, no local marker: first boot on this disk, restore
/// - both: restore only when the remote is strictly newer
pub fn should_restore(remote_marker: &Path, local_marker: &Path) -> bool {
    let Some(remote) = marker_mtime(remote_marker) else {
        return false;
    };
    let Some(local) = marker_mtime(local_marker) else {
        return true;
    };
    remote > local
}

fn marker_mtime(p: &Path) -> Option<SystemTime> {
    fs::metadata(p).ok().and_then(|m| m.modified().ok())
}

/// Reconcile local state with whatever the backup volume holds. Three backup
/// generations are recognized, newest layout first:
///
/// 1. structured: `config/` and `workspace/` subtrees
/// 2. legacy flat: the config document directly at the backup root
/// 3. legacy skills-only: just a `skills/` subtree
///
/// Every copy is best-effort; a half-restored state dir still beats refusing
/// to boot the gateway.
pub fn restore_from_backup(layout: &Layout) -> Result<Outcome> {
    if !layout.backup_root.is_dir() {
        info!(
            "backup volume {} not mounted; fresh start",
            layout.backup_root.display()
        );
        return Ok(Outcome::Skipped);
    }

    let permitted = should_restore(&layout.remote_marker(), &layout.local_marker());
    let config = restore_config(layout, permitted)?;
    let workspace = restore_workspace(layout, permitted);

    if config == Outcome::Skipped && workspace == Outcome::Skipped {
        info!(
            "backup volume {} mounted, no data yet",
            layout.backup_root.display()
        );
    }
    Ok(config.merge(workspace))
}

fn restore_config(layout: &Layout, permitted: bool) -> Result<Outcome> {
    let structured = layout.backup_root.join("config");
    let structured_has_doc =
        structured.join(CONFIG_FILE).is_file() || structured.join(LEGACY_CONFIG_FILE).is_file();
    let flat_has_doc = layout.backup_root.join(CONFIG_FILE).is_file()
        || layout.backup_root.join(LEGACY_CONFIG_FILE).is_file();

    if !structured_has_doc && !flat_has_doc {
        return Ok(Outcome::Skipped);
    }
    if !permitted {
        info!("local state is at least as fresh as the backup; keeping local config");
        return Ok(Outcome::Skipped);
    }

    util::ensure_dir(&layout.state_dir)?;

    let failures = if structured_has_doc {
        info!("restoring config from {}", structured.display());
        util::copy_dir_best_effort(&structured, &layout.state_dir)
    } else {
        info!(
            "restoring legacy flat config from {}",
            layout.backup_root.display()
        );
        copy_flat_backup(&layout.backup_root, &layout.state_dir)
    };

    promote_legacy_config_name(&layout.state_dir);
    propagate_marker(layout);

    Ok(if failures == 0 {
        Outcome::Completed
    } else {
        warn!("config restore skipped {failures} entr(ies)");
        Outcome::Degraded
    })
}

/// Legacy flat backups put the config document next to workspace data and the
/// sync marker. Only the configuration belongs in the state dir; workspace
/// subtrees are handled by `restore_workspace` and the marker is propagated
/// separately after the copy.
fn copy_flat_backup(backup_root: &Path, state_dir: &Path) -> usize {
    let mut failures = 0usize;
    let entries = match fs::read_dir(backup_root) {
        Ok(e) => e,
        Err(e) => {
            warn!("cannot read {}: {e}", backup_root.display());
            return 1;
        }
    };
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("read_dir error under {}: {e}", backup_root.display());
                failures += 1;
                continue;
            }
        };
        let name = entry.file_name();
        if name == "workspace" || name == "skills" || name == SYNC_MARKER {
            continue;
        }
        let src = entry.path();
        let dst = state_dir.join(&name);
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            failures += util::copy_dir_best_effort(&src, &dst);
        } else if let Err(e) = util::copy_file(&src, &dst) {
            warn!("{e}");
            failures += 1;
        }
    }
    failures
}

/// A restored backup may only carry the legacy-named document. Rename it to
/// the canonical name unless a canonical document already exists.
fn promote_legacy_config_name(state_dir: &Path) {
    let canonical = state_dir.join(CONFIG_FILE);
    let legacy = state_dir.join(LEGACY_CONFIG_FILE);
    if canonical.exists() || !legacy.is_file() {
        return;
    }
    if let Err(e) = fs::rename(&legacy, &canonical) {
        warn!(
            "failed to rename {} -> {}: {e}",
            legacy.display(),
            canonical.display()
        );
    }
}

/// Copy the remote sync marker next to the restored config so the next boot
/// sees this backup as already applied.
fn propagate_marker(layout: &Layout) {
    let remote = layout.remote_marker();
    if !remote.is_file() {
        return;
    }
    if let Err(e) = util::copy_file(&remote, &layout.local_marker()) {
        warn!("failed to propagate sync marker: {e}");
    }
}

fn restore_workspace(layout: &Layout, permitted: bool) -> Outcome {
    let structured = layout.backup_root.join("workspace");
    let legacy_skills = layout.backup_root.join("skills");

    let (src, dst, label) = if util::dir_non_empty(&structured) {
        (structured, layout.workspace_dir.clone(), "workspace")
    } else if util::dir_non_empty(&legacy_skills) {
        (
            legacy_skills,
            layout.workspace_dir.join("skills"),
            "legacy skills",
        )
    } else {
        return Outcome::Skipped;
    };

    if !permitted {
        info!("local state is at least as fresh as the backup; keeping local workspace");
        return Outcome::Skipped;
    }

    info!("restoring {label} from {}", src.display());
    let failures = util::copy_dir_best_effort(&src, &dst);
    if failures == 0 {
        Outcome::Completed
    } else {
        warn!("{label} restore skipped {failures} entr(ies)");
        Outcome::Degraded
    }
}
