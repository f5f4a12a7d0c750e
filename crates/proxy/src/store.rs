// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the preferences store and the outbound Discord proxy.
//!
//! Every call carries the `X-Admin-Key` credential and a 5 second deadline.
//! Failures are logged and surfaced as errors; callers degrade to in-memory
//! state rather than propagating.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::logbuf::LogEvent;
use crate::pattern::strip_ansi;

/// Discord hard-caps message bodies; ours are truncated a little short.
pub const DISCORD_MESSAGE_CAP: usize = 1997;

/// One saved session, written at shutdown and read back on boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistRecord {
    pub user_id: String,
    pub character_id: String,
    pub character_name: String,
    /// Allowlist label, `"3k"` or `"3s"`.
    pub server: String,
    pub token: String,
    #[serde(default)]
    pub is_wizard: bool,
    /// Epoch millis at save time; stale records are discarded on restore.
    pub persisted_at: u64,
}

#[derive(Debug, Deserialize)]
struct SessionListResponse {
    #[serde(default)]
    sessions: Vec<PersistRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordPrefsResponse {
    #[serde(default)]
    pub channel_prefs: std::collections::HashMap<String, crate::protocol::ChannelPrefs>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PasswordResponse {
    password: String,
}

#[derive(Debug, Deserialize)]
struct LogListResponse {
    #[serde(default)]
    logs: Vec<LogEvent>,
}

/// Client for the preferences store.
#[derive(Debug, Clone)]
pub struct StoreClient {
    base_url: String,
    admin_key: String,
    client: Client,
}

impl StoreClient {
    pub fn new(base_url: impl Into<String>, admin_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.into(), admin_key: admin_key.into(), client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).header("X-Admin-Key", &self.admin_key)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).header("X-Admin-Key", &self.admin_key)
    }

    /// `GET /api/persistent_sessions?action=list`
    pub async fn list_sessions(&self) -> anyhow::Result<Vec<PersistRecord>> {
        let resp = self.get("/api/persistent_sessions?action=list").send().await?;
        let body: SessionListResponse = resp.error_for_status()?.json().await?;
        Ok(body.sessions)
    }

    /// `POST /api/persistent_sessions?action=save` — full replace.
    pub async fn save_sessions(&self, sessions: &[PersistRecord]) -> anyhow::Result<()> {
        self.post("/api/persistent_sessions?action=save")
            .json(&serde_json::json!({ "sessions": sessions }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// `POST /api/persistent_sessions?action=remove` — by token.
    pub async fn remove_session(&self, token: &str) -> anyhow::Result<()> {
        self.post("/api/persistent_sessions?action=remove")
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// `POST /api/persistent_sessions?action=clear`
    pub async fn clear_sessions(&self) -> anyhow::Result<()> {
        self.post("/api/persistent_sessions?action=clear").send().await?.error_for_status()?;
        Ok(())
    }

    /// `GET /api/preferences?action=get_discord_prefs`
    pub async fn get_discord_prefs(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> anyhow::Result<DiscordPrefsResponse> {
        // Ids come from the client's auth frame; let reqwest encode them.
        let resp = self
            .get("/api/preferences")
            .query(&[
                ("action", "get_discord_prefs"),
                ("user_id", user_id),
                ("character_id", character_id),
            ])
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    /// `GET /api/characters?action=get_password_admin`
    pub async fn get_password(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> anyhow::Result<String> {
        let resp = self
            .get("/api/characters")
            .query(&[
                ("action", "get_password_admin"),
                ("user_id", user_id),
                ("character_id", character_id),
            ])
            .send()
            .await?;
        let body: PasswordResponse = resp.error_for_status()?.json().await?;
        Ok(body.password)
    }

    /// `POST /api/server_logs?action=save`
    pub async fn save_logs(&self, logs: &[LogEvent]) -> anyhow::Result<()> {
        self.post("/api/server_logs?action=save")
            .json(&serde_json::json!({ "logs": logs }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// `GET /api/server_logs?action=list` — persisted log set for `/logs`.
    pub async fn list_logs(&self) -> anyhow::Result<Vec<LogEvent>> {
        let resp = self.get("/api/server_logs?action=list").send().await?;
        let body: LogListResponse = resp.error_for_status()?.json().await?;
        Ok(body.logs)
    }

    /// `POST /api/discord_proxy` — fan a chat line out to Discord.
    pub async fn post_discord(
        &self,
        webhook_url: &str,
        message: &str,
        username: Option<&str>,
    ) -> anyhow::Result<()> {
        let message = sanitize_discord(message);
        self.post("/api/discord_proxy")
            .json(&serde_json::json!({
                "webhook_url": webhook_url,
                "message": message,
                "username": username.unwrap_or("mudlink"),
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Strip ANSI, defang mass mentions, and truncate for Discord.
pub fn sanitize_discord(message: &str) -> String {
    let clean = strip_ansi(message)
        .replace("@everyone", "@\u{200b}everyone")
        .replace("@here", "@\u{200b}here");
    clean.chars().take(DISCORD_MESSAGE_CAP).collect()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
