/*
 * ntlm.rs
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

//! NTLMv2, three-message exchange: client Negotiate, server Challenge, client Authenticate.
//! Used by some on-premises Exchange/IMAP deployments that lack Kerberos.

use hmac::{Hmac, Mac};
use md5::Md5;
use rand::RngCore;

use super::SaslError;

const NTLMSSP_SIGNATURE: &[u8] = b"NTLMSSP\0";
const NEGOTIATE_MESSAGE: u32 = 1;
const CHALLENGE_MESSAGE: u32 = 2;
const AUTHENTICATE_MESSAGE: u32 = 3;
const FLAG_NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const FLAG_NEGOTIATE_NTLM: u32 = 0x0000_0200;
const FLAG_NEGOTIATE_EXTENDED_SECURITY: u32 = 0x0008_0000;

/// Build the Type 1 (Negotiate) message.
pub fn negotiate_message() -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    out.extend_from_slice(NTLMSSP_SIGNATURE);
    out.extend_from_slice(&NEGOTIATE_MESSAGE.to_le_bytes());
    let flags = FLAG_NEGOTIATE_UNICODE | FLAG_NEGOTIATE_NTLM | FLAG_NEGOTIATE_EXTENDED_SECURITY;
    out.extend_from_slice(&flags.to_le_bytes());
    out
}

/// Fields parsed out of the server's Type 2 (Challenge) message.
struct ServerChallenge {
    nonce: [u8; 8],
    target_info: Vec<u8>,
}

fn parse_challenge(msg: &[u8]) -> Result<ServerChallenge, SaslError> {
    if msg.len() < 32 || &msg[0..8] != NTLMSSP_SIGNATURE {
        return Err(SaslError::invalid("malformed NTLM challenge: bad signature"));
    }
    let msg_type = u32::from_le_bytes(msg[8..12].try_into().unwrap());
    if msg_type != CHALLENGE_MESSAGE {
        return Err(SaslError::invalid("malformed NTLM challenge: wrong message type"));
    }
    let mut nonce = [0u8; 8];
    nonce.copy_from_slice(&msg[24..32]);

    // Target Info is an optional security buffer at offset 40 when extended security is in use.
    let target_info = if msg.len() >= 48 {
        let len = u16::from_le_bytes(msg[40..42].try_into().unwrap()) as usize;
        let offset = u32::from_le_bytes(msg[44..48].try_into().unwrap()) as usize;
        if offset + len <= msg.len() {
            msg[offset..offset + len].to_vec()
        } else {
            Vec::new()
        }
    } else {
        Vec::new()
    };
    Ok(ServerChallenge { nonce, target_info })
}

/// Build the Type 3 (Authenticate) message from the server's challenge.
///
/// `domain` may be empty for accounts without a Windows domain.
pub fn authenticate_message(challenge_msg: &[u8], domain: &str, username: &str, password: &str) -> Result<Vec<u8>, SaslError> {
    let challenge = parse_challenge(challenge_msg)?;

    let ntlm_hash = ntowfv2(domain, username, password);
    let mut client_challenge = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut client_challenge);

    // NTLMv2 blob: 1 byte resp type, 1 byte max resp type, 6 reserved, 8 timestamp,
    // 8 client challenge, 4 reserved, target_info, 4 reserved.
    let timestamp: u64 = 0; // caller-independent; servers accept a zero/omitted timestamp for SASL auth.
    let mut blob = Vec::new();
    blob.extend_from_slice(&[0x01, 0x01, 0, 0, 0, 0]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(&client_challenge);
    blob.extend_from_slice(&[0, 0, 0, 0]);
    blob.extend_from_slice(&challenge.target_info);
    blob.extend_from_slice(&[0, 0, 0, 0]);

    let mut nt_proof_input = Vec::with_capacity(8 + blob.len());
    nt_proof_input.extend_from_slice(&challenge.nonce);
    nt_proof_input.extend_from_slice(&blob);
    let nt_proof = hmac_md5(&ntlm_hash, &nt_proof_input);

    let mut nt_challenge_response = Vec::with_capacity(16 + blob.len());
    nt_challenge_response.extend_from_slice(&nt_proof);
    nt_challenge_response.extend_from_slice(&blob);

    let username_utf16 = utf16le(username);
    let domain_utf16 = utf16le(domain);

    // Layout: header(32) + domain + username + lm_resp(24, zeroed) + nt_resp.
    let header_len = 64u32;
    let domain_off = header_len;
    let username_off = domain_off + domain_utf16.len() as u32;
    let lm_off = username_off + username_utf16.len() as u32;
    let nt_off = lm_off + 24;

    let mut out = Vec::new();
    out.extend_from_slice(NTLMSSP_SIGNATURE);
    out.extend_from_slice(&AUTHENTICATE_MESSAGE.to_le_bytes());
    security_buffer(&mut out, 24, lm_off); // LM response (empty, NTLMv2 only uses NT response)
    security_buffer(&mut out, nt_challenge_response.len() as u16, nt_off);
    security_buffer(&mut out, domain_utf16.len() as u16, domain_off);
    security_buffer(&mut out, username_utf16.len() as u16, username_off);
    security_buffer(&mut out, 0, header_len); // workstation (unused)
    security_buffer(&mut out, 0, header_len); // session key (unused)
    out.extend_from_slice(&(FLAG_NEGOTIATE_UNICODE | FLAG_NEGOTIATE_NTLM | FLAG_NEGOTIATE_EXTENDED_SECURITY).to_le_bytes());
    debug_assert_eq!(out.len() as u32, header_len);

    out.extend_from_slice(&domain_utf16);
    out.extend_from_slice(&username_utf16);
    out.extend_from_slice(&[0u8; 24]);
    out.extend_from_slice(&nt_challenge_response);
    Ok(out)
}

fn security_buffer(out: &mut Vec<u8>, len: u16, offset: u32) {
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&offset.to_le_bytes());
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// NTOWFv2(password, user, domain) = HMAC-MD5(MD4(UNICODE(password)), UNICODE(UPPER(user)+domain))
fn ntowfv2(domain: &str, username: &str, password: &str) -> [u8; 16] {
    let password_hash = md4(&utf16le(password));
    let input = utf16le(&format!("{}{}", username.to_uppercase(), domain));
    let mut mac = Hmac::<Md5>::new_from_slice(&password_hash).expect("16-byte key");
    mac.update(&input);
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

fn hmac_md5(key: &[u8; 16], data: &[u8]) -> [u8; 16] {
    let mut mac = Hmac::<Md5>::new_from_slice(key).expect("16-byte key");
    mac.update(data);
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Minimal MD4 implementation (RFC 1320), needed for NTOWFv2; not exposed outside this module.
fn md4(input: &[u8]) -> [u8; 16] {
    let mut msg = input.to_vec();
    let bit_len = (input.len() as u64).wrapping_mul(8);
    msg.push(0x80);
    while msg.len() % 64 != 56 {
        msg.push(0);
    }
    msg.extend_from_slice(&bit_len.to_le_bytes());

    let (mut a, mut b, mut c, mut d): (u32, u32, u32, u32) = (0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476);

    for block in msg.chunks(64) {
        let mut x = [0u32; 16];
        for i in 0..16 {
            x[i] = u32::from_le_bytes(block[i * 4..i * 4 + 4].try_into().unwrap());
        }
        let (aa, bb, cc, dd) = (a, b, c, d);

        macro_rules! ff {
            ($a:expr, $b:expr, $c:expr, $d:expr, $k:expr, $s:expr) => {
                $a = ($a.wrapping_add(($b & $c) | (!$b & $d)).wrapping_add(x[$k])).rotate_left($s);
            };
        }
        macro_rules! gg {
            ($a:expr, $b:expr, $c:expr, $d:expr, $k:expr, $s:expr) => {
                $a = ($a.wrapping_add(($b & $c) | ($b & $d) | ($c & $d)).wrapping_add(x[$k]).wrapping_add(0x5a827999)).rotate_left($s);
            };
        }
        macro_rules! hh {
            ($a:expr, $b:expr, $c:expr, $d:expr, $k:expr, $s:expr) => {
                $a = ($a.wrapping_add($b ^ $c ^ $d).wrapping_add(x[$k]).wrapping_add(0x6ed9eba1)).rotate_left($s);
            };
        }

        let shifts1 = [3, 7, 11, 19];
        for i in 0..16 {
            let k = i;
            let s = shifts1[i % 4];
            match i % 4 {
                0 => ff!(a, b, c, d, k, s),
                1 => ff!(d, a, b, c, k, s),
                2 => ff!(c, d, a, b, k, s),
                _ => ff!(b, c, d, a, k, s),
            }
        }
        let order2 = [0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15];
        let shifts2 = [3, 5, 9, 13];
        for (i, &k) in order2.iter().enumerate() {
            let s = shifts2[i % 4];
            match i % 4 {
                0 => gg!(a, b, c, d, k, s),
                1 => gg!(d, a, b, c, k, s),
                2 => gg!(c, d, a, b, k, s),
                _ => gg!(b, c, d, a, k, s),
            }
        }
        let order3 = [0, 8, 4, 12, 2, 10, 6, 14, 1, 9, 5, 13, 3, 11, 7, 15];
        let shifts3 = [3, 9, 11, 15];
        for (i, &k) in order3.iter().enumerate() {
            let s = shifts3[i % 4];
            match i % 4 {
                0 => hh!(a, b, c, d, k, s),
                1 => hh!(d, a, b, c, k, s),
                2 => hh!(c, d, a, b, k, s),
                _ => hh!(b, c, d, a, k, s),
            }
        }

        a = a.wrapping_add(aa);
        b = b.wrapping_add(bb);
        c = c.wrapping_add(cc);
        d = d.wrapping_add(dd);
    }

    let mut out = [0u8; 16];
    out[0..4].copy_from_slice(&a.to_le_bytes());
    out[4..8].copy_from_slice(&b.to_le_bytes());
    out[8..12].copy_from_slice(&c.to_le_bytes());
    out[12..16].copy_from_slice(&d.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md4_empty_string() {
        // RFC 1320 test vector.
        let digest = md4(b"");
        assert_eq!(hex(&digest), "31d6cfe0d16ae931b73c59d7e0c089c0");
    }

    #[test]
    fn md4_abc() {
        let digest = md4(b"abc");
        assert_eq!(hex(&digest), "a448017aaf21d8525fc10ae87aa6729d");
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

    #[test]
    fn negotiate_message_has_ntlmssp_signature() {
        let msg = negotiate_message();
        assert_eq!(&msg[0..8], NTLMSSP_SIGNATURE);
        assert_eq!(u32::from_le_bytes(msg[8..12].try_into().unwrap()), NEGOTIATE_MESSAGE);
    }

    #[test]
    fn rejects_challenge_with_bad_signature() {
        let bad = vec![0u8; 48];
        assert!(parse_challenge(&bad).is_err());
    }
}
