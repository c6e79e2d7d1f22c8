/*
 * error.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::fmt;

use crate::sasl::SaslError;

/// Errors from the IMAP wire protocol layer: framing, parsing, and session-state violations.
#[derive(Debug)]
pub enum ImapClientError {
    Io(std::io::Error),
    Tls(String),
    /// The connection was closed, by either side, outside of a LOGOUT.
    Closed,
    Timeout,
    Cancelled,
    /// Malformed bytes on the wire (bad literal marker, unterminated quoted string, etc).
    Protocol(String),
    NotConnected,
    /// A command was issued that the current session state does not allow
    /// (e.g. FETCH with no mailbox selected).
    InvalidState(String),
    /// A mail-store verb that requires SELECT/EXAMINE was invoked with nothing selected.
    NoSelectedMailbox,
    /// The server tagged a command NO or BAD.
    CommandFailed { tag: String, status: String, text: String },
    Authentication { reason: String, server_message: Option<String> },
    Sasl(SaslError),
    /// A capability the caller asked to use was not advertised by the server.
    CapabilityMissing(String),
}

impl ImapClientError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

impl fmt::Display for ImapClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImapClientError::Io(e) => write!(f, "io error: {}", e),
            ImapClientError::Tls(m) => write!(f, "tls error: {}", m),
            ImapClientError::Closed => write!(f, "connection closed"),
            ImapClientError::Timeout => write!(f, "operation timed out"),
            ImapClientError::Cancelled => write!(f, "operation cancelled"),
            ImapClientError::Protocol(m) => write!(f, "protocol error: {}", m),
            ImapClientError::NotConnected => write!(f, "not connected"),
            ImapClientError::InvalidState(m) => write!(f, "invalid state: {}", m),
            ImapClientError::NoSelectedMailbox => write!(f, "no mailbox selected"),
            ImapClientError::CommandFailed { tag, status, text } => {
                write!(f, "{} {} {}", tag, status, text)
            }
            ImapClientError::Authentication { reason, server_message } => match server_message {
                Some(m) => write!(f, "authentication failed: {} ({})", reason, m),
                None => write!(f, "authentication failed: {}", reason),
            },
            ImapClientError::Sasl(e) => write!(f, "SASL error: {}", e),
            ImapClientError::CapabilityMissing(cap) => write!(f, "server did not advertise {}", cap),
        }
    }
}

impl std::error::Error for ImapClientError {}

impl From<std::io::Error> for ImapClientError {
    fn from(e: std::io::Error) -> Self {
        ImapClientError::Io(e)
    }
}

impl From<SaslError> for ImapClientError {
    fn from(e: SaslError) -> Self {
        ImapClientError::Sasl(e)
    }
}

impl From<ImapClientError> for crate::store::StoreError {
    fn from(e: ImapClientError) -> Self {
        crate::store::StoreError::new(e.to_string())
    }
}
