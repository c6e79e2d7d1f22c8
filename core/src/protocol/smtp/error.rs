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

use super::response::EnhancedStatus;

/// Errors from the SMTP wire protocol layer.
#[derive(Debug)]
pub enum SmtpClientError {
    Io(std::io::Error),
    Tls(String),
    Closed,
    Timeout,
    Cancelled,
    Protocol(String),
    NotConnected,
    /// The server rejected MAIL FROM for `address`.
    SenderNotAccepted { address: String, status: u16, enhanced: Option<EnhancedStatus> },
    /// The server rejected RCPT TO for `address`.
    RecipientNotAccepted { address: String, status: u16, enhanced: Option<EnhancedStatus> },
    /// The server rejected the message body after DATA/BDAT.
    MessageNotAccepted { status: u16, enhanced: Option<EnhancedStatus> },
    Authentication { reason: String, server_message: Option<String> },
    Sasl(SaslError),
    CapabilityMissing(String),
}

impl fmt::Display for SmtpClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtpClientError::Io(e) => write!(f, "io error: {}", e),
            SmtpClientError::Tls(m) => write!(f, "tls error: {}", m),
            SmtpClientError::Closed => write!(f, "connection closed"),
            SmtpClientError::Timeout => write!(f, "operation timed out"),
            SmtpClientError::Cancelled => write!(f, "operation cancelled"),
            SmtpClientError::Protocol(m) => write!(f, "protocol error: {}", m),
            SmtpClientError::NotConnected => write!(f, "not connected"),
            SmtpClientError::SenderNotAccepted { address, status, enhanced } => {
                write!(f, "sender {} rejected: {}{}", address, status, fmt_enhanced(enhanced))
            }
            SmtpClientError::RecipientNotAccepted { address, status, enhanced } => {
                write!(f, "recipient {} rejected: {}{}", address, status, fmt_enhanced(enhanced))
            }
            SmtpClientError::MessageNotAccepted { status, enhanced } => {
                write!(f, "message rejected: {}{}", status, fmt_enhanced(enhanced))
            }
            SmtpClientError::Authentication { reason, server_message } => match server_message {
                Some(m) => write!(f, "authentication failed: {} ({})", reason, m),
                None => write!(f, "authentication failed: {}", reason),
            },
            SmtpClientError::Sasl(e) => write!(f, "SASL error: {}", e),
            SmtpClientError::CapabilityMissing(cap) => write!(f, "server did not advertise {}", cap),
        }
    }
}

fn fmt_enhanced(e: &Option<EnhancedStatus>) -> String {
    match e {
        Some(s) => format!(" ({})", s),
        None => String::new(),
    }
}

impl std::error::Error for SmtpClientError {}

impl From<std::io::Error> for SmtpClientError {
    fn from(e: std::io::Error) -> Self {
        SmtpClientError::Io(e)
    }
}

impl From<SaslError> for SmtpClientError {
    fn from(e: SaslError) -> Self {
        SmtpClientError::Sasl(e)
    }
}

impl From<SmtpClientError> for crate::store::StoreError {
    fn from(e: SmtpClientError) -> Self {
        crate::store::StoreError::new(e.to_string())
    }
}
