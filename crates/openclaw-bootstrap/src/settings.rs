use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

pub const CONFIG_FILE: &str = "openclaw.json";
pub const LEGACY_CONFIG_FILE: &str = "clawdbot.json";
pub const SYNC_MARKER: &str = ".last-sync";
pub const GATEWAY_LOG_FILE: &str = "gateway.log";
pub const GATEWAY_LOCK_FILE: &str = "gateway.lock";

pub const GATEWAY_PORT: u16 = 18789;

fn default_gateway_program() -> String {
    "openclaw".into()
}

/// On-disk locations the pipeline works with, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Canonical configuration directory (config document + sync marker).
    pub state_dir: PathBuf,
    /// Older state path, kept as a symlink alias for previously taken backups.
    pub legacy_state_dir: PathBuf,
    /// Agent workspace root.
    pub workspace_dir: PathBuf,
    /// Mounted backup volume; may be absent or empty.
    pub backup_root: PathBuf,
    /// Shipped config template used when no document was restored.
    pub template_path: PathBuf,
}

impl Layout {
    pub fn from_env() -> Result<Self> {
        let home = env_path("HOME")
            .ok_or_else(|| Error::msg("HOME is not set; cannot resolve state directories"))?;

        Ok(Self {
            state_dir: env_path("OPENCLAW_STATE_DIR").unwrap_or_else(|| home.join(".openclaw")),
            legacy_state_dir: home.join(".clawdbot"),
            workspace_dir: env_path("OPENCLAW_WORKSPACE_DIR").unwrap_or_else(|| home.join("clawd")),
            backup_root: env_path("OPENCLAW_BACKUP_DIR").unwrap_or_else(|| PathBuf::from("/backup")),
            template_path: env_path("OPENCLAW_CONFIG_TEMPLATE")
                .unwrap_or_else(|| PathBuf::from("/app/openclaw.template.json")),
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.state_dir.join(CONFIG_FILE)
    }

    pub fn local_marker(&self) -> PathBuf {
        self.state_dir.join(SYNC_MARKER)
    }

    pub fn remote_marker(&self) -> PathBuf {
        self.backup_root.join(SYNC_MARKER)
    }

    pub fn gateway_log(&self) -> PathBuf {
        self.state_dir.join(GATEWAY_LOG_FILE)
    }

    pub fn gateway_lock(&self) -> PathBuf {
        self.state_dir.join(GATEWAY_LOCK_FILE)
    }
}

/// Snapshot of every environment input the synthesizer and supervisor react
/// to. Read exactly once so nothing reads ambient variables mid-pipeline.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub gateway_token: Option<String>,
    pub dev_mode: bool,
    pub telegram_bot_token: Option<String>,
    pub discord_bot_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_app_token: Option<String>,
    pub moonshot_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub ai_gateway_base_url: Option<String>,
    pub gateway_program: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            gateway_token: env_value("OPENCLAW_GATEWAY_TOKEN"),
            dev_mode: env_flag("OPENCLAW_DEV_MODE"),
            telegram_bot_token: env_value("TELEGRAM_BOT_TOKEN"),
            discord_bot_token: env_value("DISCORD_BOT_TOKEN"),
            slack_bot_token: env_value("SLACK_BOT_TOKEN"),
            slack_app_token: env_value("SLACK_APP_TOKEN"),
            moonshot_api_key: env_value("MOONSHOT_API_KEY"),
            anthropic_api_key: env_value("ANTHROPIC_API_KEY"),
            anthropic_base_url: env_value("ANTHROPIC_BASE_URL"),
            ai_gateway_base_url: env_value("AI_GATEWAY_BASE_URL"),
            gateway_program: env_value("OPENCLAW_GATEWAY_BIN")
                .unwrap_or_else(default_gateway_program),
        }
    }

    /// Both slack tokens are required before the channel is considered configured.
    pub fn slack_credentials(&self) -> Option<(&str, &str)> {
        match (self.slack_bot_token.as_deref(), self.slack_app_token.as_deref()) {
            (Some(bot), Some(app)) => Some((bot, app)),
            _ => None,
        }
    }

    /// Base URL for the AI-Gateway provider branch: the gateway variable wins,
    /// the Anthropic override is the fallback. Trailing slashes are stripped.
    pub fn gateway_base_url(&self) -> Option<String> {
        self.ai_gateway_base_url
            .as_deref()
            .or(self.anthropic_base_url.as_deref())
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_flag(key: &str) -> bool {
    matches!(
        env_value(key).as_deref(),
        Some("1") | Some("true") | Some("TRUE") | Some("yes")
    )
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_value(key).map(PathBuf::from)
}
