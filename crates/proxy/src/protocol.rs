// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser ↔ proxy JSON protocol plus the scripting data model carried in it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pipeline::mip::MipStats;

// -- Scripting data model -----------------------------------------------------

/// A trigger action. At most one `command` fires per input line across all
/// matched triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TriggerAction {
    Gag,
    #[serde(rename_all = "camelCase")]
    Highlight {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fg_color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bg_color: Option<String>,
        #[serde(default)]
        blink: bool,
        #[serde(default)]
        underline: bool,
    },
    Command {
        #[serde(alias = "text")]
        command: String,
    },
    Sound {
        name: String,
    },
    Substitute {
        replacement: String,
    },
    #[serde(rename_all = "camelCase")]
    Discord {
        webhook_url: String,
        message: String,
    },
    Chatmon {
        message: String,
        channel: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerMatchType {
    Substring,
    Wildcard,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub pattern: String,
    /// When absent, the pattern style is auto-detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<TriggerMatchType>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub actions: Vec<TriggerAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AliasMatchType {
    Exact,
    StartsWith,
    Regex,
    Tintin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alias {
    pub id: String,
    pub pattern: String,
    #[serde(default = "default_match_type")]
    pub match_type: AliasMatchType,
    pub replacement: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub id: String,
    pub command: String,
    /// Seconds; clamped to a 0.1s floor when timers are armed.
    pub interval: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Per-channel notification preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPrefs {
    #[serde(default)]
    pub sound: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub discord: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    5
}

fn default_match_type() -> AliasMatchType {
    AliasMatchType::Exact
}

// -- Inbound (browser → proxy) ------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Auth {
        token: String,
        user_id: String,
        character_id: String,
        #[serde(default)]
        character_name: Option<String>,
        #[serde(default)]
        is_wizard: bool,
    },
    Command {
        command: String,
        #[serde(default)]
        raw: bool,
    },
    SetTriggers {
        triggers: Vec<Trigger>,
    },
    SetAliases {
        aliases: Vec<Alias>,
    },
    SetTickers {
        tickers: Vec<Ticker>,
    },
    SetVariables {
        variables: HashMap<String, String>,
    },
    SetFunctions {
        functions: HashMap<String, String>,
    },
    #[serde(rename_all = "camelCase")]
    SetMip {
        enabled: bool,
        mip_id: String,
        #[serde(default)]
        debug: bool,
    },
    #[serde(rename_all = "camelCase")]
    SetDiscordPrefs {
        #[serde(default)]
        channel_prefs: HashMap<String, ChannelPrefs>,
        #[serde(default)]
        username: Option<String>,
    },
    SetServer {
        host: String,
        port: u16,
    },
    Keepalive,
    HealthCheck,
    Reconnect,
    TestLine {
        line: String,
    },
    Disconnect,
}

// -- Outbound (proxy → browser) -----------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    SessionNew {
        #[serde(skip_serializing_if = "Option::is_none")]
        bridge_mode: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    SessionResumed {
        mud_connected: bool,
        variables: HashMap<String, String>,
    },
    SessionTaken,
    Mud {
        line: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        highlight: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sound: Option<String>,
    },
    System {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
    },
    Error {
        message: String,
    },
    Broadcast {
        message: String,
        timestamp: u64,
    },
    MipStats {
        stats: MipStats,
    },
    #[serde(rename_all = "camelCase")]
    MipChat {
        message: String,
        chat_type: String,
        channel: String,
        raw_text: String,
    },
    #[serde(rename_all = "camelCase")]
    MipDebug {
        msg_type: String,
        msg_data: String,
    },
    ClientCommand {
        command: String,
    },
    #[serde(rename_all = "camelCase")]
    DisableTrigger {
        trigger_id: String,
    },
    KeepaliveAck,
    HealthOk,
    TriggerChatmon {
        message: String,
        channel: String,
    },
}

impl ServerMessage {
    /// Chat-kind messages go to the chat ring and survive reattach.
    pub fn is_chat(&self) -> bool {
        matches!(self, Self::MipChat { .. } | Self::TriggerChatmon { .. })
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::System { message: message.into(), subtype: None }
    }

    pub fn system_status(message: impl Into<String>) -> Self {
        Self::System { message: message.into(), subtype: Some("status_only".to_owned()) }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
