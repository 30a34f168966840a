use serde::Serialize;
use serde_json::{Value, json};

use super::doc;
use crate::settings::Settings;

pub const OPENAI_SLOT: &str = "openai";
pub const ANTHROPIC_SLOT: &str = "anthropic";

pub const MOONSHOT_BASE_URL: &str = "https://api.moonshot.ai/v1";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Routing suffix an AI-Gateway URL carries when it speaks the OpenAI
/// dialect; anything else on a non-empty URL implies the Anthropic dialect.
pub const OPENAI_ROUTE_SUFFIX: &str = "/openai";

pub const FALLBACK_PRIMARY: &str = "anthropic/claude-sonnet-4-5";

/// One upstream model a provider slot serves, plus the short alias it gets
/// in the agent's default model map. The alias is bookkeeping for the agent
/// defaults, not part of the wire descriptor.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub context_window: u64,
    #[serde(skip)]
    pub alias: &'static str,
}

pub const KIMI_MODELS: [ModelSpec; 1] = [ModelSpec {
    id: "kimi-k2.5-preview",
    name: "Kimi K2.5",
    context_window: 262_144,
    alias: "kimi",
}];

pub const ANTHROPIC_MODELS: [ModelSpec; 2] = [
    ModelSpec {
        id: "claude-sonnet-4-5",
        name: "Claude Sonnet 4.5",
        context_window: 200_000,
        alias: "sonnet",
    },
    ModelSpec {
        id: "claude-opus-4-1",
        name: "Claude Opus 4.1",
        context_window: 200_000,
        alias: "opus",
    },
];

pub const GPT_MODELS: [ModelSpec; 2] = [
    ModelSpec {
        id: "gpt-5",
        name: "GPT-5",
        context_window: 400_000,
        alias: "gpt",
    },
    ModelSpec {
        id: "gpt-5-mini",
        name: "GPT-5 Mini",
        context_window: 400_000,
        alias: "gpt-mini",
    },
];

/// Populate provider slots from the environment snapshot, in priority order.
/// A slot written by an earlier step in this run is never overwritten by a
/// later one; pre-existing slots from the loaded document are fair game for
/// the step that owns them.
pub fn apply_providers(mut root: Value, settings: &Settings) -> Value {
    let mut openai_claimed = false;
    let mut anthropic_claimed = false;

    if let Some(key) = settings.moonshot_api_key.as_deref() {
        write_slot(
            &mut root,
            OPENAI_SLOT,
            MOONSHOT_BASE_URL,
            "openai-completions",
            Some(key),
            &KIMI_MODELS,
        );
        openai_claimed = true;
    }

    if let Some(key) = settings.anthropic_api_key.as_deref() {
        let base = settings
            .anthropic_base_url
            .as_deref()
            .unwrap_or(ANTHROPIC_BASE_URL);
        write_slot(
            &mut root,
            ANTHROPIC_SLOT,
            base,
            "anthropic-messages",
            Some(key),
            &ANTHROPIC_MODELS,
        );
        anthropic_claimed = true;
    }

    if let Some(url) = settings.gateway_base_url() {
        if url.ends_with(OPENAI_ROUTE_SUFFIX) {
            if !openai_claimed {
                write_slot(
                    &mut root,
                    OPENAI_SLOT,
                    &url,
                    "openai-completions",
                    None,
                    &GPT_MODELS,
                );
            }
        } else if !anthropic_claimed {
            write_slot(
                &mut root,
                ANTHROPIC_SLOT,
                &url,
                "anthropic-messages",
                settings.anthropic_api_key.as_deref(),
                &ANTHROPIC_MODELS,
            );
        }
    }

    root
}

/// Pick the single default `(provider, model)` pair. Priority mirrors
/// `apply_providers`, but deliberately does not check whether the chosen
/// slot was actually written: the final branch sets an Anthropic model id
/// even when no provider key was ever observed. That can leave the primary
/// pointing at a slot that does not exist; kept for compatibility with the
/// shipped behavior rather than silently corrected.
pub fn select_primary_model(mut root: Value, settings: &Settings) -> Value {
    let primary = if settings.moonshot_api_key.is_some() {
        format!("{OPENAI_SLOT}/{}", KIMI_MODELS[0].id)
    } else if settings.anthropic_api_key.is_some() {
        format!("{ANTHROPIC_SLOT}/{}", ANTHROPIC_MODELS[0].id)
    } else if let Some(url) = settings.gateway_base_url() {
        if url.ends_with(OPENAI_ROUTE_SUFFIX) {
            format!("{OPENAI_SLOT}/{}", GPT_MODELS[0].id)
        } else {
            format!("{ANTHROPIC_SLOT}/{}", ANTHROPIC_MODELS[0].id)
        }
    } else {
        FALLBACK_PRIMARY.to_string()
    };

    doc::set_path(&mut root, "agents.defaults.model.primary", json!(primary));
    root
}

fn write_slot(
    root: &mut Value,
    slot: &str,
    base_url: &str,
    api: &str,
    api_key: Option<&str>,
    models: &[ModelSpec],
) {
    let mut entry = json!({
        "baseUrl": base_url,
        "api": api,
        "models": models,
    });
    if let Some(key) = api_key {
        entry["apiKey"] = json!(key);
    }
    doc::set_path(root, &format!("models.providers.{slot}"), entry);

    // Register each model under the agent default map so it is addressable
    // by its short alias.
    for m in models {
        let defaults = doc::ensure_object_mut(root, "agents.defaults.models");
        defaults.insert(format!("{slot}/{}", m.id), json!({"alias": m.alias}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moonshot_branch_wins_the_openai_slot() {
        let settings = Settings {
            moonshot_api_key: Some("sk-moon".into()),
            ai_gateway_base_url: Some("https://gw.example.com/openai".into()),
            ..Settings::default()
        };
        let root = apply_providers(json!({}), &settings);
        assert_eq!(
            doc::str_path(&root, "models.providers.openai.baseUrl"),
            Some(MOONSHOT_BASE_URL)
        );
        assert_eq!(
            doc::str_path(&root, "models.providers.openai.apiKey"),
            Some("sk-moon")
        );
        let models = doc::value_path(&root, "models.providers.openai.models")
            .and_then(Value::as_array)
            .expect("models array");
        assert_eq!(models.len(), 1);
        assert_eq!(models[0]["id"], json!("kimi-k2.5-preview"));
    }

    #[test]
    fn gateway_url_without_openai_suffix_fills_anthropic_slot() {
        let settings = Settings {
            ai_gateway_base_url: Some("https://gw.example.com/v1/acct/slot/anthropic/".into()),
            ..Settings::default()
        };
        let root = apply_providers(json!({}), &settings);
        assert_eq!(
            doc::str_path(&root, "models.providers.anthropic.baseUrl"),
            Some("https://gw.example.com/v1/acct/slot/anthropic")
        );
        // No key anywhere in the environment: no credential attached.
        assert!(doc::value_path(&root, "models.providers.anthropic.apiKey").is_none());
    }

    #[test]
    fn fallback_primary_is_set_even_without_any_provider() {
        let root = select_primary_model(json!({}), &Settings::default());
        assert_eq!(
            doc::str_path(&root, "agents.defaults.model.primary"),
            Some(FALLBACK_PRIMARY)
        );
        assert!(doc::value_path(&root, "models.providers").is_none());
    }
}
