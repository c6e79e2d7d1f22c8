/*
 * digest_md5.rs
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

//! DIGEST-MD5 (RFC 2831). The server challenge is a comma-separated directive list
//! (`realm`, `nonce`, `qop`, `charset`, `algorithm`); the client answers with a digest-response
//! directive list built from the RFC 2831 A1/A2 construction.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use md5::{Digest, Md5};
use rand::RngCore;

use super::SaslError;

/// Parsed server challenge directives.
#[derive(Debug, Default)]
struct Challenge {
    realm: Option<String>,
    nonce: String,
    qop: String,
}

fn parse_challenge(raw: &str) -> Result<Challenge, SaslError> {
    let mut c = Challenge { qop: "auth".to_string(), ..Default::default() };
    let mut nonce = None;
    for directive in split_directives(raw) {
        let (key, value) = directive.split_once('=').ok_or_else(|| SaslError::invalid("malformed DIGEST-MD5 directive"))?;
        let value = value.trim().trim_matches('"');
        match key.trim() {
            "realm" => c.realm = Some(value.to_string()),
            "nonce" => nonce = Some(value.to_string()),
            "qop" => c.qop = value.split(',').next().unwrap_or("auth").to_string(),
            _ => {}
        }
    }
    c.nonce = nonce.ok_or_else(|| SaslError::invalid("missing nonce in DIGEST-MD5 challenge"))?;
    Ok(c)
}

/// Split a directive list on commas that are not inside double quotes.
fn split_directives(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

/// Build the digest-response for a DIGEST-MD5 challenge.
///
/// `digest_uri` is e.g. `imap/mail.example.com` or `smtp/mail.example.com`.
pub fn respond_to_challenge(challenge_b64: &str, authcid: &str, password: &str, digest_uri: &str) -> Result<Vec<u8>, SaslError> {
    let decoded = B64.decode(challenge_b64.trim()).map_err(|_| SaslError::invalid("invalid base64 DIGEST-MD5 challenge"))?;
    let raw = String::from_utf8(decoded).map_err(|_| SaslError::invalid("DIGEST-MD5 challenge not UTF-8"))?;
    let challenge = parse_challenge(&raw)?;

    let mut cnonce_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut cnonce_bytes);
    let cnonce = hex(&cnonce_bytes);
    let nc = "00000001";
    let realm = challenge.realm.clone().unwrap_or_default();

    let a1 = {
        let mut h = Md5::new();
        h.update(authcid.as_bytes());
        h.update(b":");
        h.update(realm.as_bytes());
        h.update(b":");
        h.update(password.as_bytes());
        let inner = h.finalize();
        let mut h2 = Md5::new();
        h2.update(inner);
        h2.update(b":");
        h2.update(challenge.nonce.as_bytes());
        h2.update(b":");
        h2.update(cnonce.as_bytes());
        hex(&h2.finalize())
    };
    let a2 = {
        let mut h = Md5::new();
        h.update(b"AUTHENTICATE:");
        h.update(digest_uri.as_bytes());
        hex(&h.finalize())
    };
    let response = {
        let mut h = Md5::new();
        h.update(a1.as_bytes());
        h.update(b":");
        h.update(challenge.nonce.as_bytes());
        h.update(b":");
        h.update(nc.as_bytes());
        h.update(b":");
        h.update(cnonce.as_bytes());
        h.update(b":");
        h.update(challenge.qop.as_bytes());
        h.update(b":");
        h.update(a2.as_bytes());
        hex(&h.finalize())
    };

    let mut out = format!(
        "username=\"{}\",nonce=\"{}\",cnonce=\"{}\",nc={},qop={},digest-uri=\"{}\",response={},charset=utf-8",
        authcid, challenge.nonce, cnonce, nc, challenge.qop, digest_uri, response
    );
    if !realm.is_empty() {
        out = format!("realm=\"{}\",{}", realm, out);
    }
    Ok(out.into_bytes())
}

/// DIGEST-MD5 sends one final, empty response to the server's `rspauth=` confirmation.
pub fn final_response() -> Vec<u8> {
    Vec::new()
}

fn hex(b: &[u8]) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut s = String::with_capacity(b.len() * 2);
    for &x in b {
        s.push(HEX[(x >> 4) as usize] as char);
        s.push(HEX[(x & 15) as usize] as char);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_directives_with_embedded_commas() {
        let c = parse_challenge(r#"realm="example.com",nonce="abc123",qop="auth,auth-int",charset=utf-8,algorithm=md5-sess"#).unwrap();
        assert_eq!(c.realm.as_deref(), Some("example.com"));
        assert_eq!(c.nonce, "abc123");
        assert_eq!(c.qop, "auth");
    }

    #[test]
    fn builds_response_directive_list() {
        let challenge = r#"realm="example.com",nonce="OA6MG9tEQGm2hh",qop="auth",charset=utf-8,algorithm=md5-sess"#;
        let challenge_b64 = B64.encode(challenge);
        let response = respond_to_challenge(&challenge_b64, "chris", "secret", "imap/elwood.innosoft.com").unwrap();
        let response = String::from_utf8(response).unwrap();
        assert!(response.contains("username=\"chris\""));
        assert!(response.contains("digest-uri=\"imap/elwood.innosoft.com\""));
        assert!(response.contains("response="));
    }
}
