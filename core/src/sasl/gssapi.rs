/*
 * gssapi.rs
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

//! GSSAPI (RFC 4752). Kerberos context establishment and the final security-layer negotiation
//! are delegated to an external provider — this crate does not link a Kerberos library. The
//! session engine drives a `GssapiContext` the caller supplies (typically backed by the
//! platform's GSSAPI/SSPI library) through the standard three phases: context tokens, then one
//! "security layer" exchange once the context is established.

use super::SaslError;

/// Caller-supplied GSSAPI context. The negotiator calls `step` for each context-establishment
/// token the server sends, then `unwrap_security_layer`/`wrap_security_layer` once for the final
/// no-security-layer negotiation (RFC 4752 §3.1).
pub trait GssapiContext: Send {
    /// Feed the server's token (empty for the first call) and produce the next client token, or
    /// `None` once context establishment is complete.
    fn step(&mut self, server_token: &[u8]) -> Result<Option<Vec<u8>>, SaslError>;

    /// True once `step` has returned `None` and the security context is fully established.
    fn is_established(&self) -> bool;

    /// Unwrap the server's final message (protection byte + supported security layers + max
    /// message size) and build the client's reply selecting "no security layer" with the
    /// negotiated authorization identity, per RFC 4752 §3.1.
    fn negotiate_security_layer(&mut self, server_message: &[u8], authzid: &str) -> Result<Vec<u8>, SaslError>;
}

/// Drive context establishment: returns the next client token to send, or the final security
/// layer response once `context.is_established()` and a final server message is supplied.
pub fn step_context(context: &mut dyn GssapiContext, server_token: &[u8]) -> Result<Option<Vec<u8>>, SaslError> {
    context.step(server_token)
}

pub fn negotiate_security_layer(context: &mut dyn GssapiContext, server_message: &[u8], authzid: &str) -> Result<Vec<u8>, SaslError> {
    context.negotiate_security_layer(server_message, authzid)
}
