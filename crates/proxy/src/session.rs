// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A session: one character's presence on the game, independent of any
//! particular browser tab or proxy process.
//!
//! The browser socket, the upstream socket, and the session itself have
//! independent lifetimes. While no browser is attached, outbound messages
//! buffer (bounded, head-drop) and chat lines additionally land in a replay
//! ring that survives reattach. All mutation happens under the session's
//! mutex; the session is the unit of serialization.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use mudlink_bridge::protocol::ProxyToBridge;

use crate::config::allowed_webhook;
use crate::logbuf::LogBuffer;
use crate::pipeline::framer::{LineFramer, PATCH_DELAY};
use crate::pipeline::mip::{MipEvent, MipState};
use crate::pipeline::telnet;
use crate::protocol::{Alias, ChannelPrefs, ServerMessage, Ticker, Trigger};
use crate::scripting::aliases::{Effect, Expander};
use crate::scripting::escape::unescape_output;
use crate::scripting::tickers::TickerTimers;
use crate::scripting::triggers::TriggerEngine;
use crate::scripting::vars::VarTable;
use crate::store::StoreClient;

/// Outbound buffer bound; oldest entries drop first.
pub const OUTBOUND_CAP: usize = 150;
/// Chat ring bound.
pub const CHAT_RING_CAP: usize = 100;
/// Commands queue this long waiting for the first `set_aliases`, then flush.
pub const ALIAS_SYNC_GRACE: Duration = Duration::from_secs(3);

/// Bounded head-drop buffer of outbound messages for a detached browser.
#[derive(Debug, Default)]
pub struct OutboundBuffer {
    items: VecDeque<ServerMessage>,
    overflowed: bool,
}

impl OutboundBuffer {
    pub fn push(&mut self, msg: ServerMessage) {
        if self.items.len() >= OUTBOUND_CAP {
            self.items.pop_front();
            self.overflowed = true;
        }
        self.items.push_back(msg);
    }

    /// Drain the buffer, reporting whether anything was dropped.
    pub fn take(&mut self) -> (Vec<ServerMessage>, bool) {
        let overflowed = std::mem::take(&mut self.overflowed);
        (self.items.drain(..).collect(), overflowed)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Chat replay ring; survives reattach regardless of outbound overflow.
#[derive(Debug, Default)]
pub struct ChatRing {
    items: VecDeque<ServerMessage>,
}

impl ChatRing {
    pub fn push(&mut self, msg: ServerMessage) {
        if self.items.len() >= CHAT_RING_CAP {
            self.items.pop_front();
        }
        self.items.push_back(msg);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerMessage> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// The session's connection to the game, direct or held by the bridge.
#[derive(Debug)]
pub enum UpstreamLink {
    Direct {
        tx: mpsc::UnboundedSender<Vec<u8>>,
        cancel: CancellationToken,
        peer: Option<std::net::SocketAddr>,
    },
    Bridge {
        tx: mpsc::UnboundedSender<ProxyToBridge>,
        token: String,
    },
}

#[derive(Debug, Default)]
pub struct SessionFlags {
    pub explicit_disconnect: bool,
    pub closed: bool,
    pub server_restarting: bool,
    pub aliases_synced: bool,
    pub pending_bridge_resume: bool,
    pub bridge_mode_init: bool,
}

pub struct Session {
    pub token: String,
    pub user_id: String,
    pub character_id: String,
    pub character_name: String,
    pub is_wizard: bool,

    pub host: String,
    pub port: u16,

    pub browser: Option<mpsc::UnboundedSender<ServerMessage>>,
    /// Bumped on every attach so a displaced socket task can tell it no
    /// longer owns the browser slot.
    pub browser_gen: u64,
    pub upstream: Option<UpstreamLink>,
    pub upstream_connected: bool,
    pub disconnect_at: Option<Instant>,

    pub outbound: OutboundBuffer,
    pub chat_ring: ChatRing,

    pub framer: LineFramer,
    pub patch_timer: Option<JoinHandle<()>>,
    pub mip: MipState,

    pub triggers: TriggerEngine,
    pub aliases: Vec<Alias>,
    pub tickers_cfg: Vec<Ticker>,
    pub ticker_timers: TickerTimers,
    pub vars: VarTable,
    pub functions: HashMap<String, String>,

    pub discord_prefs: HashMap<String, ChannelPrefs>,
    pub discord_username: Option<String>,

    pub flags: SessionFlags,
    /// Token the bridge knows this upstream by; survives re-keying.
    pub bridge_token: Option<String>,
    pub pending_commands: Vec<String>,
    pub queue_flush_timer: Option<JoinHandle<()>>,

    pub store: StoreClient,
    pub events: Arc<LogBuffer>,
}

/// Shared handle; everything async goes through here.
pub struct SessionHandle {
    pub cancel: CancellationToken,
    pub inner: Mutex<Session>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Arc<Self> {
        Arc::new(Self { cancel: CancellationToken::new(), inner: Mutex::new(session) })
    }
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        token: String,
        user_id: String,
        character_id: String,
        character_name: String,
        is_wizard: bool,
        store: StoreClient,
        events: Arc<LogBuffer>,
    ) -> Self {
        Self {
            token,
            user_id,
            character_id,
            character_name,
            is_wizard,
            host: String::new(),
            port: 0,
            browser: None,
            browser_gen: 0,
            upstream: None,
            upstream_connected: false,
            disconnect_at: Some(Instant::now()),
            outbound: OutboundBuffer::default(),
            chat_ring: ChatRing::default(),
            framer: LineFramer::new(),
            patch_timer: None,
            mip: MipState::default(),
            triggers: TriggerEngine::new(),
            aliases: Vec::new(),
            tickers_cfg: Vec::new(),
            ticker_timers: TickerTimers::new(),
            vars: VarTable::new(),
            functions: HashMap::new(),
            discord_prefs: HashMap::new(),
            discord_username: None,
            flags: SessionFlags::default(),
            bridge_token: None,
            pending_commands: Vec::new(),
            queue_flush_timer: None,
            store,
            events,
        }
    }

    // -- Outbound ------------------------------------------------------------

    /// Deliver to the browser if attached, otherwise buffer. Chat-kind
    /// messages always land in the chat ring as well.
    pub fn emit(&mut self, msg: ServerMessage) {
        if msg.is_chat() {
            self.chat_ring.push(msg.clone());
        }
        let delivered = match &self.browser {
            Some(tx) => tx.send(msg.clone()).is_ok(),
            None => false,
        };
        if !delivered {
            self.outbound.push(msg);
        }
    }

    /// Attach a browser and run the reattach replay: truncation notice if the
    /// outbound buffer overflowed, then the chat ring in insertion order,
    /// then the current stats snapshot. Buffered mud-text is deliberately
    /// discarded; catching up on a wall of backscroll is noise, a missed tell
    /// is not. Returns the attach generation for the new socket task.
    pub fn attach_browser(&mut self, tx: mpsc::UnboundedSender<ServerMessage>) -> u64 {
        self.disconnect_at = None;
        let (_, overflowed) = self.outbound.take();
        if overflowed {
            let _ = tx.send(ServerMessage::system(
                "Some game output was dropped while you were disconnected.",
            ));
        }
        for msg in self.chat_ring.iter() {
            let _ = tx.send(msg.clone());
        }
        if self.mip.enabled && self.mip.stats != Default::default() {
            let _ = tx.send(ServerMessage::MipStats { stats: self.mip.stats.clone() });
        }
        self.browser = Some(tx);
        self.browser_gen += 1;
        self.browser_gen
    }

    /// Detach, but only if the caller still owns the browser slot.
    pub fn detach_browser(&mut self, gen: u64) {
        if gen != self.browser_gen {
            return;
        }
        self.browser = None;
        self.disconnect_at = Some(Instant::now());
    }

    pub fn browser_attached(&self) -> bool {
        self.browser.is_some()
    }

    // -- Upstream writes -----------------------------------------------------

    /// Output-escape a command and write it upstream with CRLF.
    pub fn send_upstream_line(&mut self, cmd: &str) {
        let mut line = unescape_output(cmd);
        line.push_str("\r\n");
        self.send_upstream_bytes(line.into_bytes());
    }

    /// Write verbatim text (`raw` commands) with CRLF, no escapes, no split.
    pub fn send_upstream_raw(&mut self, text: &str) {
        let mut line = text.to_owned();
        line.push_str("\r\n");
        self.send_upstream_bytes(line.into_bytes());
    }

    pub fn send_upstream_bytes(&mut self, bytes: Vec<u8>) {
        match &self.upstream {
            Some(UpstreamLink::Direct { tx, .. }) => {
                let _ = tx.send(bytes);
            }
            Some(UpstreamLink::Bridge { tx, token }) => {
                let _ = tx.send(ProxyToBridge::Data {
                    token: token.clone(),
                    data: BASE64.encode(&bytes),
                });
            }
            None => {}
        }
    }

    pub fn upstream_live(&self) -> bool {
        self.upstream.is_some() && self.upstream_connected
    }

    // -- Command processing --------------------------------------------------

    /// Expand one inbound command string and apply its effects in order.
    /// Browser-originated commands get the output-escape pass; commands
    /// injected by triggers keep their capture escapes verbatim.
    pub fn run_effects(&mut self, input: &str) {
        self.run_effects_inner(input, true);
    }

    pub fn run_trigger_effects(&mut self, input: &str) {
        self.run_effects_inner(input, false);
    }

    fn run_effects_inner(&mut self, input: &str, unescape: bool) {
        let aliases = self.aliases.clone();
        let mut expander = Expander::new(&aliases, &mut self.vars);
        expander.process(input);
        let effects = expander.effects;
        for effect in effects {
            match effect {
                Effect::Send(cmd) => {
                    if unescape {
                        self.send_upstream_line(&cmd);
                    } else {
                        self.send_upstream_raw(&cmd);
                    }
                }
                Effect::Client(cmd) => self.emit(ServerMessage::ClientCommand { command: cmd }),
            }
        }
    }

    /// Queue or execute a browser command depending on alias-sync state.
    /// Returns true when the command was queued (caller arms the grace
    /// timer).
    pub fn handle_command(&mut self, command: &str, raw: bool) -> bool {
        if raw {
            self.send_upstream_raw(command);
            return false;
        }
        if !self.flags.aliases_synced {
            self.pending_commands.push(command.to_owned());
            return true;
        }
        self.run_effects(command);
        false
    }

    /// Drain commands that queued before alias sync.
    pub fn drain_pending(&mut self) {
        if let Some(timer) = self.queue_flush_timer.take() {
            timer.abort();
        }
        let pending = std::mem::take(&mut self.pending_commands);
        for command in pending {
            self.run_effects(&command);
        }
    }

    // -- Scripting table updates ---------------------------------------------

    pub fn set_triggers(&mut self, triggers: Vec<Trigger>) {
        self.triggers.set_triggers(triggers);
    }

    pub fn set_aliases(&mut self, aliases: Vec<Alias>) {
        self.aliases = aliases;
        self.flags.aliases_synced = true;
        self.drain_pending();
    }

    pub fn set_variables(&mut self, variables: HashMap<String, String>) {
        self.vars.merge_snapshot(variables);
    }

    pub fn set_discord_prefs(
        &mut self,
        channel_prefs: HashMap<String, ChannelPrefs>,
        username: Option<String>,
    ) -> Vec<String> {
        // Webhooks outside the allowlist are refused; the channel keeps its
        // other settings.
        let mut rejected = Vec::new();
        let mut accepted = HashMap::new();
        for (channel, mut prefs) in channel_prefs {
            if let Some(url) = prefs.webhook_url.as_deref() {
                if !allowed_webhook(url) {
                    rejected.push(channel.clone());
                    prefs.webhook_url = None;
                }
            }
            accepted.insert(channel, prefs);
        }
        self.discord_prefs = accepted;
        self.discord_username = username;
        rejected
    }

    // -- Upstream line pipeline ----------------------------------------------

    /// Run one framed, carryover-applied line through sideband demux and the
    /// trigger engine, emitting whatever falls out.
    pub fn process_upstream_line(&mut self, line: &str) {
        let (text, frames) = self.mip.extract(line);
        let had_frames = !frames.is_empty();

        for frame in &frames {
            if self.mip.debug {
                self.emit(ServerMessage::MipDebug {
                    msg_type: frame.frame_type.clone(),
                    msg_data: frame.payload.clone(),
                });
            }
            match self.mip.apply(frame) {
                MipEvent::StatsChanged => {
                    let stats = self.mip.stats.clone();
                    self.emit(ServerMessage::MipStats { stats });
                }
                MipEvent::Chat { message, chat_type, channel, raw_text } => {
                    self.emit(ServerMessage::MipChat {
                        message: message.clone(),
                        chat_type,
                        channel: channel.clone(),
                        raw_text,
                    });
                    self.fan_out_channel(&channel, &message);
                }
                MipEvent::Unknown { .. } => {}
            }
        }

        if text.is_empty() && had_frames {
            return;
        }

        let outcome = self.triggers.process_line(&text, &self.vars);

        for trigger_id in &outcome.disabled {
            self.events.push("trigger_loop", format!("disabled runaway trigger {trigger_id}"));
            self.emit(ServerMessage::system(format!(
                "Trigger {trigger_id} fired 50 times in 2 seconds and was disabled."
            )));
            self.emit(ServerMessage::DisableTrigger { trigger_id: trigger_id.clone() });
        }

        if !outcome.gagged {
            self.emit(ServerMessage::Mud {
                line: outcome.line,
                highlight: outcome.highlight.then_some(true),
                sound: outcome.sound,
            });
        }

        if let Some(command) = outcome.command {
            self.run_trigger_effects(&command);
        }

        for d in outcome.discord {
            if !allowed_webhook(&d.webhook_url) {
                self.emit(ServerMessage::system("Discord webhook URL not allowed."));
                continue;
            }
            let message = self.vars.substitute(&d.message);
            let store = self.store.clone();
            let username = self.discord_username.clone();
            tokio::spawn(async move {
                if let Err(e) = store.post_discord(&d.webhook_url, &message, username.as_deref()).await {
                    tracing::warn!(err = %e, "discord fan-out failed");
                }
            });
        }

        for c in outcome.chatmon {
            let message = self.vars.substitute(&c.message);
            self.emit(ServerMessage::TriggerChatmon {
                message: message.clone(),
                channel: c.channel.clone(),
            });
            self.fan_out_channel(&c.channel, &message);
        }
    }

    /// Forward a chat line to Discord when the browser is away and the
    /// channel asks for it.
    fn fan_out_channel(&mut self, channel: &str, message: &str) {
        if self.browser.is_some() {
            return;
        }
        let Some(prefs) = self.discord_prefs.get(channel) else {
            return;
        };
        if !prefs.discord {
            return;
        }
        let Some(url) = prefs.webhook_url.clone() else {
            return;
        };
        if !allowed_webhook(&url) {
            return;
        }
        let store = self.store.clone();
        let username = self.discord_username.clone();
        let message = message.to_owned();
        tokio::spawn(async move {
            if let Err(e) = store.post_discord(&url, &message, username.as_deref()).await {
                tracing::warn!(err = %e, "discord fan-out failed");
            }
        });
    }

    // -- Teardown ------------------------------------------------------------

    /// Idempotent teardown of everything the session owns. Map removal is the
    /// manager's job.
    pub fn teardown(&mut self) {
        if self.flags.closed {
            return;
        }
        self.flags.closed = true;
        self.ticker_timers.clear();
        if let Some(timer) = self.patch_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.queue_flush_timer.take() {
            timer.abort();
        }
        if let Some(link) = self.upstream.take() {
            match link {
                UpstreamLink::Direct { cancel, .. } => cancel.cancel(),
                UpstreamLink::Bridge { tx, token } => {
                    let _ = tx.send(ProxyToBridge::Destroy { token });
                }
            }
        }
        self.upstream_connected = false;
        self.browser = None;
    }
}

// -- Timer plumbing (needs the Arc handle) ------------------------------------

/// Feed one raw TCP chunk into the session's pipeline.
pub async fn handle_upstream_chunk(handle: &Arc<SessionHandle>, chunk: &[u8]) {
    let mut s = handle.inner.lock().await;
    if s.flags.closed {
        return;
    }
    // Fresh bytes cancel the pending packet-patch flush.
    if let Some(timer) = s.patch_timer.take() {
        timer.abort();
    }
    let scan = telnet::strip(chunk);
    let result = s.framer.push_chunk(&scan.clean, scan.had_ga);
    for line in &result.lines {
        s.process_upstream_line(line);
    }
    if result.partial_pending {
        arm_patch_timer(handle, &mut s);
    }
}

/// Arm the 500 ms packet-patch timer for the buffered partial.
pub fn arm_patch_timer(handle: &Arc<SessionHandle>, s: &mut Session) {
    let weak = Arc::downgrade(handle);
    s.patch_timer = Some(tokio::spawn(async move {
        tokio::time::sleep(PATCH_DELAY).await;
        let Some(handle) = weak.upgrade() else {
            return;
        };
        let mut s = handle.inner.lock().await;
        if s.flags.closed {
            return;
        }
        s.patch_timer = None;
        if let Some(line) = s.framer.flush_partial() {
            s.process_upstream_line(&line);
        }
    }));
}

/// Arm the alias-sync grace timer; when it fires the queue drains as if
/// synced so a browser that never ships aliases cannot wedge the session.
pub fn arm_queue_flush(handle: &Arc<SessionHandle>, s: &mut Session) {
    if s.queue_flush_timer.is_some() {
        return;
    }
    let weak = Arc::downgrade(handle);
    s.queue_flush_timer = Some(tokio::spawn(async move {
        tokio::time::sleep(ALIAS_SYNC_GRACE).await;
        let Some(handle) = weak.upgrade() else {
            return;
        };
        let mut s = handle.inner.lock().await;
        if s.flags.closed {
            return;
        }
        s.queue_flush_timer = None;
        s.flags.aliases_synced = true;
        s.drain_pending();
    }));
}

/// Recreate ticker timers from the session's table.
pub fn restart_tickers(handle: &Arc<SessionHandle>, s: &mut Session) {
    let weak = Arc::downgrade(handle);
    let tickers = s.tickers_cfg.clone();
    s.ticker_timers.restart(&tickers, move |ticker| {
        let Some(handle) = weak.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let mut s = handle.inner.lock().await;
            if s.flags.closed || !s.upstream_live() {
                return;
            }
            // Substitution happens now, not at creation.
            let command = s.vars.substitute(&ticker.command);
            s.run_effects(&command);
        });
    });
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
