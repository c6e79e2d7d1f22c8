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

/// Errors from the POP3 wire protocol layer.
#[derive(Debug)]
pub enum Pop3ClientError {
    Io(std::io::Error),
    Tls(String),
    Closed,
    Timeout,
    Cancelled,
    Protocol(String),
    NotConnected,
    /// Caller invoked a command invalid for the session's current state (e.g. STLS outside
    /// Authorization).
    InvalidState(String),
    /// `-ERR` returned to USER/PASS, APOP, or AUTH.
    Authentication { reason: String, server_message: Option<String> },
    Sasl(SaslError),
    CapabilityMissing(String),
}

impl Pop3ClientError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

impl fmt::Display for Pop3ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pop3ClientError::Io(e) => write!(f, "io error: {}", e),
            Pop3ClientError::Tls(m) => write!(f, "tls error: {}", m),
            Pop3ClientError::Closed => write!(f, "connection closed"),
            Pop3ClientError::Timeout => write!(f, "operation timed out"),
            Pop3ClientError::Cancelled => write!(f, "operation cancelled"),
            Pop3ClientError::Protocol(m) => write!(f, "protocol error: {}", m),
            Pop3ClientError::NotConnected => write!(f, "not connected"),
            Pop3ClientError::InvalidState(m) => write!(f, "invalid state: {}", m),
            Pop3ClientError::Authentication { reason, server_message } => match server_message {
                Some(m) => write!(f, "authentication failed: {} ({})", reason, m),
                None => write!(f, "authentication failed: {}", reason),
            },
            Pop3ClientError::Sasl(e) => write!(f, "SASL error: {}", e),
            Pop3ClientError::CapabilityMissing(cap) => write!(f, "server did not advertise {}", cap),
        }
    }
}

impl std::error::Error for Pop3ClientError {}

impl From<std::io::Error> for Pop3ClientError {
    fn from(e: std::io::Error) -> Self {
        Pop3ClientError::Io(e)
    }
}

impl From<SaslError> for Pop3ClientError {
    fn from(e: SaslError) -> Self {
        Pop3ClientError::Sasl(e)
    }
}

impl From<Pop3ClientError> for crate::store::StoreError {
    fn from(e: Pop3ClientError) -> Self {
        crate::store::StoreError::new(e.to_string())
    }
}
