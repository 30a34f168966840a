use std::fs;

use tracing::{info, warn};

use crate::Outcome;
use crate::error::Result;
use crate::settings::Layout;
use crate::util;

/// Ensure the canonical state directory exists and the legacy path is a
/// symlink alias to it. A legacy path that is still a real directory is the
/// pre-migration state: its contents are copied over (best-effort) and the
/// directory is replaced with the link. Safe to run every boot.
pub fn migrate_legacy_state_dir(layout: &Layout) -> Result<Outcome> {
    util::ensure_dir(&layout.state_dir)?;

    let legacy = &layout.legacy_state_dir;
    let meta = fs::symlink_metadata(legacy);

    let mut outcome = Outcome::Skipped;
    match meta {
        Ok(m) if m.file_type().is_symlink() => {
            // Already migrated; leave the link alone even if it is stale.
        }
        Ok(m) if m.is_dir() => {
            info!(
                "migrating legacy state dir {} -> {}",
                legacy.display(),
                layout.state_dir.display()
            );
            let failures = util::copy_dir_best_effort(legacy, &layout.state_dir);
            outcome = if failures == 0 {
                Outcome::Completed
            } else {
                warn!("legacy migration skipped {failures} entr(ies)");
                Outcome::Degraded
            };
            if let Err(e) = fs::remove_dir_all(legacy) {
                warn!("failed to remove legacy dir {}: {e}", legacy.display());
                // A leftover real directory blocks the symlink; give up on the
                // alias for this boot rather than failing startup.
                return Ok(Outcome::Degraded);
            }
        }
        Ok(_) => {
            // A stray file at the legacy path; replace it with the link below.
        }
        Err(_) => {}
    }

    if fs::symlink_metadata(legacy).is_err() || !is_symlink(legacy) {
        if let Err(e) = util::ensure_symlink(&layout.state_dir, legacy) {
            warn!("could not create legacy alias: {e}");
            return Ok(Outcome::Degraded);
        }
        if outcome == Outcome::Skipped {
            outcome = Outcome::Completed;
        }
    }

    Ok(outcome)
}

fn is_symlink(p: &std::path::Path) -> bool {
    fs::symlink_metadata(p)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn layout_in(root: &std::path::Path) -> Layout {
        Layout {
            state_dir: root.join("state/.openclaw"),
            legacy_state_dir: root.join("state/.clawdbot"),
            workspace_dir: root.join("clawd"),
            backup_root: root.join("backup"),
            template_path: PathBuf::from("/nonexistent/template.json"),
        }
    }

    #[test]
    fn fresh_host_gets_dir_and_alias() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = layout_in(tmp.path());

        migrate_legacy_state_dir(&layout).expect("migrate");

        assert!(layout.state_dir.is_dir());
        assert!(is_symlink(&layout.legacy_state_dir));
        assert_eq!(
            fs::read_link(&layout.legacy_state_dir).expect("read link"),
            layout.state_dir
        );
    }

    #[test]
    fn real_legacy_dir_is_absorbed_then_linked() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = layout_in(tmp.path());
        fs::create_dir_all(&layout.legacy_state_dir).expect("mkdir");
        fs::write(layout.legacy_state_dir.join("clawdbot.json"), "{}").expect("write");

        let outcome = migrate_legacy_state_dir(&layout).expect("migrate");

        assert_eq!(outcome, Outcome::Completed);
        assert!(layout.state_dir.join("clawdbot.json").is_file());
        assert!(is_symlink(&layout.legacy_state_dir));
        // The alias resolves into the canonical dir.
        assert!(layout.legacy_state_dir.join("clawdbot.json").is_file());
    }

    #[test]
    fn rerun_is_idempotent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = layout_in(tmp.path());

        migrate_legacy_state_dir(&layout).expect("first run");
        fs::write(layout.state_dir.join("openclaw.json"), "{}").expect("write");
        let outcome = migrate_legacy_state_dir(&layout).expect("second run");

        assert_eq!(outcome, Outcome::Skipped);
        assert!(layout.state_dir.join("openclaw.json").is_file());
        assert!(is_symlink(&layout.legacy_state_dir));
    }
}
