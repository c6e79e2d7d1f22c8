/*
 * mod.rs
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

//! SASL client negotiator shared by IMAP AUTHENTICATE, SMTP AUTH, and POP3 AUTH.
//!
//! Supports PLAIN, LOGIN, XOAUTH2, OAUTHBEARER, CRAM-MD5, DIGEST-MD5,
//! SCRAM-SHA-{1,256,512}(-PLUS), NTLMv2, GSSAPI (context delegated to the caller), and EXTERNAL.
//! See [`negotiator::SaslNegotiator`] for the driver and [`mechanism::SaslMechanism`] for
//! capability/strength metadata and server-advertised-list selection.

mod cram_md5;
mod digest_md5;
mod external;
pub mod gssapi;
mod login;
mod mechanism;
pub mod negotiator;
mod ntlm;
mod oauthbearer;
mod plain;
pub mod scram;
mod xoauth2;

pub use mechanism::SaslMechanism;
pub use negotiator::{SaslCredentials, SaslNegotiator, SaslStep};
pub use scram::ChannelBinding;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslError {
    pub message: String,
}

impl SaslError {
    pub fn invalid(msg: &str) -> Self {
        Self { message: msg.to_string() }
    }
}

impl std::fmt::Display for SaslError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SaslError {}
