/*
 * cram_md5.rs
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

//! CRAM-MD5 (RFC 2195). One-shot challenge-response: the server's challenge is an
//! implementation-defined string (conventionally `<timestamp.pid@hostname>`); the client
//! responds with `authcid SP hex(HMAC-MD5(password, challenge))`.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::Md5;

use super::SaslError;

type HmacMd5 = Hmac<Md5>;

pub fn respond_to_challenge(authcid: &str, password: &str, challenge_b64: &str) -> Result<Vec<u8>, SaslError> {
    let challenge_bytes = B64.decode(challenge_b64.trim()).map_err(|_| SaslError::invalid("invalid base64 CRAM-MD5 challenge"))?;
    let mut mac = HmacMd5::new_from_slice(password.as_bytes()).expect("HMAC accepts any key length");
    mac.update(&challenge_bytes);
    let digest = mac.finalize().into_bytes();
    let response = format!("{} {}", authcid, hex(&digest));
    Ok(response.into_bytes())
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
    fn rfc2195_worked_example() {
        // RFC 2195 §3: shared secret "tanstaaftanstaaf", challenge as given, expected digest.
        let challenge = "<1896.697170952@postoffice.reston.mci.net>";
        let challenge_b64 = B64.encode(challenge);
        let response = respond_to_challenge("tim", "tanstaaftanstaaf", &challenge_b64).unwrap();
        let response = String::from_utf8(response).unwrap();
        assert_eq!(response, "tim b913a602c7eda7a495b4e6e7334d3890");
    }
}
