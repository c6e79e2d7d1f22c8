/*
 * plain.rs
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

//! PLAIN SASL (RFC 4616). Requires a confidential channel.

use super::SaslError;

/// Build PLAIN initial response: NUL authzid NUL authcid NUL password (UTF-8).
pub fn encode_plain(authzid: &str, authcid: &str, password: &str) -> Vec<u8> {
    format!("\0{}\0{}\0{}", authzid, authcid, password).into_bytes()
}

pub fn initial_response_plain(authzid: &str, authcid: &str, password: &str) -> Result<Vec<u8>, SaslError> {
    Ok(encode_plain(authzid, authcid, password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_nul_separated_triple() {
        let out = encode_plain("", "alice", "hunter2");
        assert_eq!(out, b"\0alice\0hunter2".to_vec());
    }
}
