//! Configuration synthesis: load (or default) the gateway document, then run
//! it through a fixed sequence of pure document-to-document stages and write
//! it back. Unrecognized sections and fields survive untouched; only the
//! recognized `agents` / `gateway` / `channels` / `models` sub-fields are
//! rewritten.

pub mod doc;
pub mod providers;

use std::fs;

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::Result;
use crate::settings::{GATEWAY_PORT, Layout, Settings};
use crate::util;

/// Run the full stage pipeline and persist the result.
pub fn synthesize(layout: &Layout, settings: &Settings) -> Result<Value> {
    let root = render(layout, settings);
    persist(layout, &root)?;
    Ok(root)
}

/// The pipeline without the final write; `render` is what the CLI's
/// inspection subcommand prints.
pub fn render(layout: &Layout, settings: &Settings) -> Value {
    let root = load_or_default(layout);
    let root = apply_cleanup(root);
    let root = apply_gateway(root, settings);
    let root = apply_channels(root, settings);
    let root = providers::apply_providers(root, settings);
    providers::select_primary_model(root, settings)
}

/// Restored document, else shipped template, else a minimal default. Parse
/// failures are downgraded to warnings: a gateway on defaults still beats no
/// gateway.
pub fn load_or_default(layout: &Layout) -> Value {
    for path in [&layout.config_file(), &layout.template_path] {
        match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(v) if v.is_object() => {
                    info!("loaded config from {}", path.display());
                    return v;
                }
                Ok(_) => warn!("{} is not a JSON object; ignoring", path.display()),
                Err(e) => warn!("unparseable config {}: {e}", path.display()),
            },
            Err(_) => {}
        }
    }

    info!("no config or template found; starting from minimal defaults");
    json!({
        "agents": {"defaults": {"workspace": layout.workspace_dir}},
        "gateway": {"port": GATEWAY_PORT, "mode": "local"},
    })
}

/// Drop provider entries left behind by a previous invalid write, recognized
/// by a model descriptor missing its display name. Must run before any other
/// stage so a later step can repopulate the slot cleanly.
pub fn apply_cleanup(mut root: Value) -> Value {
    let Some(providers) = doc::value_path(&root, "models.providers").and_then(Value::as_object)
    else {
        return root;
    };

    let broken: Vec<String> = providers
        .iter()
        .filter(|(_, entry)| {
            entry
                .get("models")
                .and_then(Value::as_array)
                .is_some_and(|models| {
                    models.iter().any(|m| {
                        m.get("name")
                            .and_then(Value::as_str)
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .is_none()
                    })
                })
        })
        .map(|(k, _)| k.clone())
        .collect();

    for key in broken {
        warn!("dropping provider '{key}': model entry without a display name");
        doc::remove_path(&mut root, &format!("models.providers.{key}"));
    }
    root
}

pub fn apply_gateway(mut root: Value, settings: &Settings) -> Value {
    doc::set_path(&mut root, "gateway.port", json!(GATEWAY_PORT));
    doc::set_path(&mut root, "gateway.mode", json!("local"));
    // The reverse proxy runs inside the same container.
    doc::set_path(
        &mut root,
        "gateway.trustedProxies",
        json!(["127.0.0.1", "::1"]),
    );
    if let Some(token) = settings.gateway_token.as_deref() {
        doc::set_path(&mut root, "gateway.auth.token", json!(token));
    }
    if settings.dev_mode {
        doc::set_path(&mut root, "gateway.controlUi.allowInsecureAuth", json!(true));
    }
    root
}

/// Enable each messaging channel whose credentials are present in the
/// environment. Deprecated field names from earlier schema versions are
/// removed unconditionally so a restored backup cannot resurrect them.
pub fn apply_channels(mut root: Value, settings: &Settings) -> Value {
    if let Some(token) = settings.telegram_bot_token.as_deref() {
        doc::set_path(&mut root, "channels.telegram.enabled", json!(true));
        doc::set_path(&mut root, "channels.telegram.botToken", json!(token));
    }
    doc::remove_path(&mut root, "channels.telegram.token");

    if let Some(token) = settings.discord_bot_token.as_deref() {
        doc::set_path(&mut root, "channels.discord.enabled", json!(true));
        doc::set_path(&mut root, "channels.discord.token", json!(token));
    }
    doc::remove_path(&mut root, "channels.discord.botToken");

    if let Some((bot, app)) = settings.slack_credentials() {
        doc::set_path(&mut root, "channels.slack.enabled", json!(true));
        doc::set_path(&mut root, "channels.slack.botToken", json!(bot));
        doc::set_path(&mut root, "channels.slack.appToken", json!(app));
    }
    doc::remove_path(&mut root, "channels.slack.token");

    root
}

/// Full overwrite in canonical pretty-printed form, then echo the written
/// document so operators can see exactly what the gateway will read.
pub fn persist(layout: &Layout, root: &Value) -> Result<()> {
    let path = layout.config_file();
    util::write_json_pretty(&path, root)?;
    info!(
        "wrote {}:\n{}",
        path.display(),
        serde_json::to_string_pretty(root)?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn layout_in(root: &Path) -> Layout {
        Layout {
            state_dir: root.join(".openclaw"),
            legacy_state_dir: root.join(".clawdbot"),
            workspace_dir: root.join("clawd"),
            backup_root: root.join("backup"),
            template_path: root.join("openclaw.template.json"),
        }
    }

    #[test]
    fn minimal_default_when_nothing_on_disk() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = layout_in(tmp.path());
        let root = load_or_default(&layout);
        assert_eq!(root["gateway"]["port"], json!(GATEWAY_PORT));
        assert_eq!(root["gateway"]["mode"], json!("local"));
        assert_eq!(
            root["agents"]["defaults"]["workspace"],
            json!(layout.workspace_dir)
        );
    }

    #[test]
    fn malformed_config_falls_back_to_template() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = layout_in(tmp.path());
        fs::create_dir_all(&layout.state_dir).expect("mkdir");
        fs::write(layout.config_file(), "{ not json").expect("write");
        fs::write(&layout.template_path, r#"{"fromTemplate": true}"#).expect("write template");

        let root = load_or_default(&layout);
        assert_eq!(root["fromTemplate"], json!(true));
    }

    #[test]
    fn cleanup_drops_provider_with_unnamed_model() {
        let root = json!({
            "models": {"providers": {
                "anthropic": {"models": [{"id": "claude-sonnet-4-5"}]},
                "openai": {"models": [{"id": "gpt-5", "name": "GPT-5"}]},
            }}
        });
        let root = apply_cleanup(root);
        assert!(doc::value_path(&root, "models.providers.anthropic").is_none());
        assert!(doc::value_path(&root, "models.providers.openai").is_some());
    }

    #[test]
    fn gateway_block_honors_token_and_dev_mode() {
        let settings = Settings {
            gateway_token: Some("tok".into()),
            dev_mode: true,
            ..Settings::default()
        };
        let root = apply_gateway(json!({}), &settings);
        assert_eq!(root["gateway"]["auth"]["token"], json!("tok"));
        assert_eq!(root["gateway"]["controlUi"]["allowInsecureAuth"], json!(true));
        assert_eq!(root["gateway"]["trustedProxies"], json!(["127.0.0.1", "::1"]));

        let bare = apply_gateway(json!({}), &Settings::default());
        assert!(doc::value_path(&bare, "gateway.auth").is_none());
        assert!(doc::value_path(&bare, "gateway.controlUi").is_none());
    }

    #[test]
    fn channels_strip_deprecated_fields_even_when_unconfigured() {
        let stale = json!({
            "channels": {
                "telegram": {"enabled": true, "token": "old-telegram"},
                "discord": {"enabled": true, "botToken": "old-discord", "token": "keep"},
            }
        });
        let root = apply_channels(stale, &Settings::default());
        assert!(doc::value_path(&root, "channels.telegram.token").is_none());
        assert!(doc::value_path(&root, "channels.discord.botToken").is_none());
        // Unrelated current-name field survives.
        assert_eq!(doc::str_path(&root, "channels.discord.token"), Some("keep"));
    }

    #[test]
    fn unrelated_sections_survive_the_whole_pipeline() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = layout_in(tmp.path());
        fs::create_dir_all(&layout.state_dir).expect("mkdir");
        fs::write(
            layout.config_file(),
            r#"{"plugins": {"weather": {"unit": "C"}}, "gateway": {"mode": "remote"}}"#,
        )
        .expect("write");

        let root = render(&layout, &Settings::default());
        assert_eq!(root["plugins"]["weather"]["unit"], json!("C"));
        // Recognized field is normalized back.
        assert_eq!(root["gateway"]["mode"], json!("local"));
    }
}
