/*
 * login.rs
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

//! Legacy LOGIN SASL mechanism: two challenges ("Username:", "Password:"), each answered
//! with the corresponding base64-encoded credential. Not an IETF mechanism, but widely deployed.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use super::SaslError;

/// Respond to a LOGIN challenge. The server sends "Username:" then "Password:" (base64-encoded,
/// case and trailing colon not guaranteed); matching is case-insensitive and substring-based.
pub fn respond_to_challenge(challenge_b64: &str, authcid: &str, password: &str) -> Result<Vec<u8>, SaslError> {
    let decoded = B64.decode(challenge_b64.trim()).map_err(|_| SaslError::invalid("invalid base64 LOGIN challenge"))?;
    let s = String::from_utf8_lossy(&decoded).to_lowercase();
    if s.contains("username") {
        Ok(B64.encode(authcid.as_bytes()).into_bytes())
    } else if s.contains("password") {
        Ok(B64.encode(password.as_bytes()).into_bytes())
    } else {
        Err(SaslError::invalid("unexpected LOGIN challenge"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_username_then_password() {
        let c1 = B64.encode("Username:");
        let c2 = B64.encode("Password:");
        let r1 = respond_to_challenge(&c1, "alice", "hunter2").unwrap();
        assert_eq!(r1, B64.encode("alice").into_bytes());
        let r2 = respond_to_challenge(&c2, "alice", "hunter2").unwrap();
        assert_eq!(r2, B64.encode("hunter2").into_bytes());
    }

    #[test]
    fn rejects_unrecognized_challenge() {
        let c = B64.encode("Favorite color:");
        assert!(respond_to_challenge(&c, "alice", "hunter2").is_err());
    }
}
