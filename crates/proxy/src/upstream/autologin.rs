// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-login state machine for direct-mode restore.
//!
//! After a restart without a bridge, the upstream connection is gone; the
//! proxy reconnects and drives the game's login dialog itself, watching the
//! cleaned byte stream for name/password prompts and a success or failure
//! verdict. The whole attempt is bounded by a hard timeout.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// Hard cap on the entire login attempt.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Accumulated prompt text is bounded; prompts fit easily.
const BUFFER_CAP: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    WaitingName,
    WaitingPassword,
    WaitingResult,
    LoggedIn,
    Failed,
}

/// What the driver should do after feeding bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAction {
    Wait,
    /// Write this line (with CRLF) to the upstream socket.
    Send(String),
    /// Login finished; install the normal line pipeline.
    Success,
    /// Login failed; destroy the socket.
    Failure(String),
}

#[allow(clippy::unwrap_used)] // fixed patterns
static NAME_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Enter your character name|What is your name|Login:").unwrap()
});

#[allow(clippy::unwrap_used)] // fixed patterns
static PASSWORD_PROMPT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Password:").unwrap());

#[allow(clippy::unwrap_used)] // fixed patterns
static SUCCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"#K%|Last login:|Welcome back|You last quit from|welcomes you back from linkdeath|reconnects",
    )
    .unwrap()
});

#[allow(clippy::unwrap_used)] // fixed patterns
static FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Unknown user|Bad password|Invalid password|Incorrect password|No such player|already logged in|attempting to login",
    )
    .unwrap()
});

#[derive(Debug)]
pub struct AutoLogin {
    state: LoginState,
    name: String,
    password: String,
    buffer: String,
}

impl AutoLogin {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            state: LoginState::WaitingName,
            name: name.into(),
            password: password.into(),
            buffer: String::new(),
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Feed cleaned (telnet-stripped, ANSI-stripped) text.
    pub fn feed(&mut self, text: &str) -> LoginAction {
        self.buffer.push_str(text);
        if self.buffer.len() > BUFFER_CAP {
            let cut = self.buffer.len() - BUFFER_CAP;
            let cut = (cut..self.buffer.len()).find(|&i| self.buffer.is_char_boundary(i));
            if let Some(cut) = cut {
                self.buffer.drain(..cut);
            }
        }

        match self.state {
            LoginState::WaitingName => {
                if FAILURE.is_match(&self.buffer) {
                    self.state = LoginState::Failed;
                    return LoginAction::Failure(verdict(&self.buffer, &FAILURE));
                }
                // Some servers jump straight to the password prompt for a
                // remembered connection.
                if PASSWORD_PROMPT.is_match(&self.buffer) {
                    self.state = LoginState::WaitingResult;
                    self.buffer.clear();
                    return LoginAction::Send(self.password.clone());
                }
                if NAME_PROMPT.is_match(&self.buffer) {
                    self.state = LoginState::WaitingPassword;
                    self.buffer.clear();
                    return LoginAction::Send(self.name.clone());
                }
                LoginAction::Wait
            }
            LoginState::WaitingPassword => {
                if FAILURE.is_match(&self.buffer) {
                    self.state = LoginState::Failed;
                    return LoginAction::Failure(verdict(&self.buffer, &FAILURE));
                }
                if SUCCESS.is_match(&self.buffer) {
                    self.state = LoginState::LoggedIn;
                    return LoginAction::Success;
                }
                if PASSWORD_PROMPT.is_match(&self.buffer) {
                    self.state = LoginState::WaitingResult;
                    self.buffer.clear();
                    return LoginAction::Send(self.password.clone());
                }
                LoginAction::Wait
            }
            LoginState::WaitingResult => {
                if FAILURE.is_match(&self.buffer) {
                    self.state = LoginState::Failed;
                    return LoginAction::Failure(verdict(&self.buffer, &FAILURE));
                }
                if SUCCESS.is_match(&self.buffer) {
                    self.state = LoginState::LoggedIn;
                    return LoginAction::Success;
                }
                LoginAction::Wait
            }
            LoginState::LoggedIn => LoginAction::Success,
            LoginState::Failed => LoginAction::Failure("login already failed".to_owned()),
        }
    }
}

fn verdict(buffer: &str, re: &Regex) -> String {
    re.find(buffer).map(|m| m.as_str().to_owned()).unwrap_or_else(|| "login failed".to_owned())
}

#[cfg(test)]
#[path = "autologin_tests.rs"]
mod tests;
