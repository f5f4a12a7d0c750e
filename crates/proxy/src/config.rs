// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the mudlink proxy.
#[derive(Debug, Clone, clap::Parser)]
pub struct ProxyConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "MUDLINK_HOST")]
    pub host: String,

    /// Port for the browser WebSocket and admin HTTP surface.
    #[arg(long, default_value_t = 3000, env = "PORT")]
    pub port: u16,

    /// Admin bearer credential; gates the admin API and authenticates
    /// every call to the preferences store.
    #[arg(long, default_value = "", env = "ADMIN_KEY")]
    pub admin_key: String,

    /// Bridge control WebSocket URL. When set, upstream sockets are held by
    /// the bridge sidecar and survive proxy restarts.
    #[arg(long, env = "BRIDGE_URL")]
    pub bridge_url: Option<String>,

    /// Base URL of the preferences store.
    #[arg(long, default_value = "http://localhost:8080", env = "STORE_URL")]
    pub store_url: String,

    /// Idle sweep: close sessions whose browser has been gone this long.
    #[arg(long, default_value_t = 900, env = "MUDLINK_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: u64,

    /// Direct-mode restore runs a second pass after this many seconds to mop
    /// up sessions whose upstream had not yet closed on the first attempt.
    #[arg(long, default_value_t = 25, env = "MUDLINK_RESTORE_RETRY_SECS")]
    pub restore_retry_secs: u64,

    /// Persistence records older than this are stale and discarded on boot.
    #[arg(long, default_value_t = 120, env = "MUDLINK_PERSIST_MAX_AGE_SECS")]
    pub persist_max_age_secs: u64,
}

impl ProxyConfig {
    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn persist_max_age(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.persist_max_age_secs)
    }

    pub fn bridge_mode(&self) -> bool {
        self.bridge_url.is_some()
    }
}

/// The only upstreams a session may target.
pub const SERVER_ALLOWLIST: &[ServerTarget] = &[
    ServerTarget { host: "3k.org", port: 3000, label: "3k" },
    ServerTarget { host: "3scapes.org", port: 3200, label: "3s" },
];

/// Webhook URLs must start with one of these prefixes.
pub const WEBHOOK_ALLOWLIST: &[&str] =
    &["https://discord.com/api/webhooks/", "https://discordapp.com/api/webhooks/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTarget {
    pub host: &'static str,
    pub port: u16,
    pub label: &'static str,
}

/// Look up an allowlisted upstream.
pub fn allowed_server(host: &str, port: u16) -> Option<&'static ServerTarget> {
    SERVER_ALLOWLIST.iter().find(|s| s.host == host && s.port == port)
}

/// Map a persisted server label back to its target.
pub fn server_by_label(label: &str) -> Option<&'static ServerTarget> {
    SERVER_ALLOWLIST.iter().find(|s| s.label == label)
}

pub fn allowed_webhook(url: &str) -> bool {
    WEBHOOK_ALLOWLIST.iter().any(|prefix| url.starts_with(prefix))
}
