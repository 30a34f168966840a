use std::fs;
use std::path::Path;

use filetime::FileTime;

use openclaw_bootstrap::Outcome;
use openclaw_bootstrap::restore::restore_from_backup;
use openclaw_bootstrap::settings::Layout;

fn layout_in(root: &Path) -> Layout {
    Layout {
        state_dir: root.join("home/.openclaw"),
        legacy_state_dir: root.join("home/.clawdbot"),
        workspace_dir: root.join("home/clawd"),
        backup_root: root.join("backup"),
        template_path: root.join("openclaw.template.json"),
    }
}

fn write(p: &Path, content: &str) {
    fs::create_dir_all(p.parent().expect("parent")).expect("mkdir");
    fs::write(p, content).expect("write");
}

fn set_mtime(p: &Path, unix_secs: i64) {
    filetime::set_file_mtime(p, FileTime::from_unix_time(unix_secs, 0)).expect("set mtime");
}

#[test]
fn absent_backup_root_is_a_fresh_start() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = layout_in(tmp.path());

    let outcome = restore_from_backup(&layout).expect("restore");

    assert_eq!(outcome, Outcome::Skipped);
    assert!(!layout.config_file().exists());
}

#[test]
fn mounted_but_empty_backup_is_a_noop() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = layout_in(tmp.path());
    fs::create_dir_all(&layout.backup_root).expect("mkdir backup");

    let outcome = restore_from_backup(&layout).expect("restore");

    assert_eq!(outcome, Outcome::Skipped);
    assert!(!layout.config_file().exists());
}

#[test]
fn structured_layout_beats_legacy_flat() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = layout_in(tmp.path());
    write(
        &layout.backup_root.join("config/openclaw.json"),
        r#"{"source": "structured"}"#,
    );
    write(
        &layout.backup_root.join("openclaw.json"),
        r#"{"source": "flat"}"#,
    );
    write(&layout.remote_marker(), "sync");

    let outcome = restore_from_backup(&layout).expect("restore");

    assert_eq!(outcome, Outcome::Completed);
    let restored = fs::read_to_string(layout.config_file()).expect("read config");
    assert!(restored.contains("structured"), "got: {restored}");
}

#[test]
fn legacy_flat_restore_excludes_workspace_and_skills_subtrees() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = layout_in(tmp.path());
    write(
        &layout.backup_root.join("clawdbot.json"),
        r#"{"source": "flat-legacy"}"#,
    );
    write(&layout.backup_root.join("credentials/oauth.json"), "{}");
    write(&layout.backup_root.join("workspace/notes.md"), "notes");
    write(&layout.backup_root.join("skills/s1/skill.md"), "skill");
    write(&layout.remote_marker(), "sync");

    restore_from_backup(&layout).expect("restore");

    // Legacy-named document is promoted to the canonical name.
    let restored = fs::read_to_string(layout.config_file()).expect("read config");
    assert!(restored.contains("flat-legacy"));
    assert!(!layout.state_dir.join("clawdbot.json").exists());
    assert!(layout.state_dir.join("credentials/oauth.json").is_file());
    // Workspace data lands in the workspace dir, not the state dir.
    assert!(!layout.state_dir.join("workspace").exists());
    assert!(!layout.state_dir.join("skills").exists());
    assert!(layout.workspace_dir.join("notes.md").is_file());
}

#[test]
fn stale_backup_never_overwrites_fresher_local_state() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = layout_in(tmp.path());
    write(
        &layout.backup_root.join("config/openclaw.json"),
        r#"{"source": "stale-backup"}"#,
    );
    write(&layout.backup_root.join("workspace/notes.md"), "old notes");
    write(&layout.remote_marker(), "sync");
    set_mtime(&layout.remote_marker(), 1_000_000_000);

    write(&layout.config_file(), r#"{"source": "live-local"}"#);
    write(&layout.local_marker(), "sync");
    set_mtime(&layout.local_marker(), 1_500_000_000);

    let outcome = restore_from_backup(&layout).expect("restore");

    assert_eq!(outcome, Outcome::Skipped);
    let kept = fs::read_to_string(layout.config_file()).expect("read config");
    assert!(kept.contains("live-local"));
    assert!(!layout.workspace_dir.exists());
}

#[test]
fn fresher_backup_is_restored_and_marker_propagated() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = layout_in(tmp.path());
    write(
        &layout.backup_root.join("config/openclaw.json"),
        r#"{"source": "fresh-backup"}"#,
    );
    write(&layout.remote_marker(), "sync");
    set_mtime(&layout.remote_marker(), 1_600_000_000);

    write(&layout.config_file(), r#"{"source": "old-local"}"#);
    write(&layout.local_marker(), "sync");
    set_mtime(&layout.local_marker(), 1_200_000_000);

    let outcome = restore_from_backup(&layout).expect("restore");

    assert_eq!(outcome, Outcome::Completed);
    let restored = fs::read_to_string(layout.config_file()).expect("read config");
    assert!(restored.contains("fresh-backup"));
    // The propagated marker makes an immediate second boot a no-op.
    assert!(layout.local_marker().is_file());
    write(&layout.config_file(), r#"{"source": "local-edit"}"#);
    let second = restore_from_backup(&layout).expect("second restore");
    assert_eq!(second, Outcome::Skipped);
    let kept = fs::read_to_string(layout.config_file()).expect("read config");
    assert!(kept.contains("local-edit"));
}

#[test]
fn structured_workspace_beats_legacy_skills() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = layout_in(tmp.path());
    write(&layout.backup_root.join("workspace/AGENT.md"), "workspace");
    write(&layout.backup_root.join("skills/s1/skill.md"), "legacy");
    write(&layout.remote_marker(), "sync");

    restore_from_backup(&layout).expect("restore");

    assert!(layout.workspace_dir.join("AGENT.md").is_file());
    assert!(!layout.workspace_dir.join("skills/s1/skill.md").exists());
}

#[test]
fn skills_only_backup_restores_into_skills_subdir() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = layout_in(tmp.path());
    write(&layout.backup_root.join("skills/s1/skill.md"), "legacy skill");
    write(&layout.remote_marker(), "sync");

    let outcome = restore_from_backup(&layout).expect("restore");

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(
        fs::read_to_string(layout.workspace_dir.join("skills/s1/skill.md")).expect("read"),
        "legacy skill"
    );
}

#[test]
fn backup_without_marker_is_never_restored() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let layout = layout_in(tmp.path());
    write(
        &layout.backup_root.join("config/openclaw.json"),
        r#"{"source": "unmarked"}"#,
    );

    let outcome = restore_from_backup(&layout).expect("restore");

    assert_eq!(outcome, Outcome::Skipped);
    assert!(!layout.config_file().exists());
}
