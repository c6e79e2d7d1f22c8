/*
 * oauthbearer.rs
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

//! OAUTHBEARER (RFC 7628): standards-track successor to XOAUTH2, built on the GS2 header.
//!
//! Initial response: `n,a=<authzid>,\x01host=<host>\x01port=<port>\x01auth=Bearer <token>\x01\x01`
//! On failure the server returns a JSON error blob as a 334 challenge; the client must respond
//! with a single empty/`\x01` message to abort the exchange (RFC 7628 §3.2.3).

/// Build the raw OAUTHBEARER initial response (before base64 encoding).
pub fn initial_response(authcid: &str, host: &str, port: u16, access_token: &str) -> Vec<u8> {
    format!(
        "n,a={},\x01host={}\x01port={}\x01auth=Bearer {}\x01\x01",
        authcid, host, port, access_token
    )
    .into_bytes()
}

/// The client's mandatory response to a server error challenge: an empty message that aborts
/// the exchange (the server will then fail the AUTH command).
pub fn abort_response() -> Vec<u8> {
    vec![0x01]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_gs2_framed_initial_response() {
        let raw = initial_response("user@example.com", "imap.example.com", 993, "ya29.token");
        let s = String::from_utf8(raw).unwrap();
        assert_eq!(s, "n,a=user@example.com,\x01host=imap.example.com\x01port=993\x01auth=Bearer ya29.token\x01\x01");
    }
}
