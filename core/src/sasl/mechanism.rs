/*
 * mechanism.rs
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

//! SASL mechanism names, metadata, and strength-ordered selection.

/// Supported SASL mechanisms (client-side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaslMechanism {
    /// PLAIN (RFC 4616) — plaintext, requires a confidential channel.
    Plain,
    /// Legacy LOGIN — plaintext, requires a confidential channel.
    Login,
    /// CRAM-MD5 (RFC 2195) — challenge-response, weak (MD5).
    CramMd5,
    /// DIGEST-MD5 (RFC 2831) — challenge-response.
    DigestMd5,
    /// SCRAM-SHA-1 (RFC 5802).
    ScramSha1,
    /// SCRAM-SHA-1-PLUS with channel binding.
    ScramSha1Plus,
    /// SCRAM-SHA-256 (RFC 7677).
    ScramSha256,
    /// SCRAM-SHA-256-PLUS with channel binding.
    ScramSha256Plus,
    /// SCRAM-SHA-512.
    ScramSha512,
    /// SCRAM-SHA-512-PLUS with channel binding.
    ScramSha512Plus,
    /// NTLM / NTLMv2 — three-message Windows challenge-response.
    NtlmV2,
    /// GSSAPI (RFC 4752) — delegated to an external Kerberos context.
    Gssapi,
    /// EXTERNAL (RFC 4422 §3.1) — identity established by the transport (e.g. TLS client cert).
    External,
    /// XOAUTH2 — OAuth2 bearer token (Gmail legacy). Single-shot, no challenge.
    XOAuth2,
    /// OAUTHBEARER (RFC 7628) — OAuth2 bearer token, standards-track successor to XOAUTH2.
    OAuthBearer,
}

impl SaslMechanism {
    pub fn name(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::Login => "LOGIN",
            SaslMechanism::CramMd5 => "CRAM-MD5",
            SaslMechanism::DigestMd5 => "DIGEST-MD5",
            SaslMechanism::ScramSha1 => "SCRAM-SHA-1",
            SaslMechanism::ScramSha1Plus => "SCRAM-SHA-1-PLUS",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha256Plus => "SCRAM-SHA-256-PLUS",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
            SaslMechanism::ScramSha512Plus => "SCRAM-SHA-512-PLUS",
            SaslMechanism::NtlmV2 => "NTLM",
            SaslMechanism::Gssapi => "GSSAPI",
            SaslMechanism::External => "EXTERNAL",
            SaslMechanism::XOAuth2 => "XOAUTH2",
            SaslMechanism::OAuthBearer => "OAUTHBEARER",
        }
    }

    /// True if this mechanism transmits the password (or an equivalent bearer secret) in the
    /// clear and must not be offered over a non-confidential channel.
    pub fn requires_tls(&self) -> bool {
        matches!(
            self,
            SaslMechanism::Plain | SaslMechanism::Login | SaslMechanism::XOAuth2 | SaslMechanism::OAuthBearer
        )
    }

    /// True if the mechanism needs one or more server challenges beyond the initial response.
    pub fn is_challenge_response(&self) -> bool {
        !matches!(
            self,
            SaslMechanism::Plain | SaslMechanism::Login | SaslMechanism::XOAuth2 | SaslMechanism::OAuthBearer | SaslMechanism::External
        )
    }

    /// True if the mechanism binds to the TLS channel it runs over (the `-PLUS` SCRAM variants).
    pub fn uses_channel_binding(&self) -> bool {
        matches!(
            self,
            SaslMechanism::ScramSha1Plus | SaslMechanism::ScramSha256Plus | SaslMechanism::ScramSha512Plus
        )
    }

    /// Relative cryptographic strength, higher is stronger. Used to pick the best mechanism a
    /// server advertises when the caller has not pinned one explicitly.
    pub fn strength(&self) -> u32 {
        match self {
            SaslMechanism::ScramSha512Plus => 110,
            SaslMechanism::ScramSha256Plus => 105,
            SaslMechanism::ScramSha1Plus => 100,
            SaslMechanism::ScramSha512 => 95,
            SaslMechanism::ScramSha256 => 90,
            SaslMechanism::ScramSha1 => 85,
            SaslMechanism::Gssapi => 80,
            SaslMechanism::NtlmV2 => 75,
            SaslMechanism::DigestMd5 => 70,
            SaslMechanism::OAuthBearer => 65,
            SaslMechanism::XOAuth2 => 60,
            SaslMechanism::CramMd5 => 40,
            SaslMechanism::External => 30,
            SaslMechanism::Plain | SaslMechanism::Login => 10,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Some(SaslMechanism::Plain),
            "LOGIN" => Some(SaslMechanism::Login),
            "CRAM-MD5" => Some(SaslMechanism::CramMd5),
            "DIGEST-MD5" => Some(SaslMechanism::DigestMd5),
            "SCRAM-SHA-1" => Some(SaslMechanism::ScramSha1),
            "SCRAM-SHA-1-PLUS" => Some(SaslMechanism::ScramSha1Plus),
            "SCRAM-SHA-256" => Some(SaslMechanism::ScramSha256),
            "SCRAM-SHA-256-PLUS" => Some(SaslMechanism::ScramSha256Plus),
            "SCRAM-SHA-512" => Some(SaslMechanism::ScramSha512),
            "SCRAM-SHA-512-PLUS" => Some(SaslMechanism::ScramSha512Plus),
            "NTLM" | "NTLMV2" => Some(SaslMechanism::NtlmV2),
            "GSSAPI" => Some(SaslMechanism::Gssapi),
            "EXTERNAL" => Some(SaslMechanism::External),
            "XOAUTH2" => Some(SaslMechanism::XOAuth2),
            "OAUTHBEARER" => Some(SaslMechanism::OAuthBearer),
            _ => None,
        }
    }

    /// Pick the strongest mechanism this client supports from a server-advertised list,
    /// excluding plaintext mechanisms unless `allow_plaintext` (i.e. the channel is already
    /// confidential, such as an IMAP TLS or STARTTLS-upgraded connection) and excluding `-PLUS`
    /// channel-binding variants unless `has_channel_binding` (the caller has TLS exporter/
    /// end-point material to bind the SCRAM exchange to).
    pub fn select_best<'a>(
        advertised: impl IntoIterator<Item = &'a str>,
        allow_plaintext: bool,
        has_channel_binding: bool,
    ) -> Option<Self> {
        advertised
            .into_iter()
            .filter_map(Self::from_name)
            .filter(|m| allow_plaintext || !m.requires_tls())
            .filter(|m| has_channel_binding || !m.uses_channel_binding())
            .max_by_key(|m| m.strength())
    }
}

impl std::fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_names() {
        let all = [
            SaslMechanism::Plain,
            SaslMechanism::Login,
            SaslMechanism::CramMd5,
            SaslMechanism::DigestMd5,
            SaslMechanism::ScramSha1,
            SaslMechanism::ScramSha1Plus,
            SaslMechanism::ScramSha256,
            SaslMechanism::ScramSha256Plus,
            SaslMechanism::ScramSha512,
            SaslMechanism::ScramSha512Plus,
            SaslMechanism::NtlmV2,
            SaslMechanism::Gssapi,
            SaslMechanism::External,
            SaslMechanism::XOAuth2,
            SaslMechanism::OAuthBearer,
        ];
        for m in all {
            assert_eq!(SaslMechanism::from_name(m.name()), Some(m));
        }
    }

    #[test]
    fn select_best_prefers_scram_plus_over_plain() {
        let advertised = ["PLAIN", "LOGIN", "SCRAM-SHA-256", "SCRAM-SHA-256-PLUS"];
        let picked = SaslMechanism::select_best(advertised, true, true).unwrap();
        assert_eq!(picked, SaslMechanism::ScramSha256Plus);
    }

    #[test]
    fn select_best_excludes_plus_without_channel_binding() {
        let advertised = ["SCRAM-SHA-256", "SCRAM-SHA-256-PLUS"];
        let picked = SaslMechanism::select_best(advertised, true, false).unwrap();
        assert_eq!(picked, SaslMechanism::ScramSha256);
    }

    #[test]
    fn select_best_excludes_plaintext_without_tls() {
        let advertised = ["PLAIN", "LOGIN"];
        assert_eq!(SaslMechanism::select_best(advertised, false, true), None);
    }
}
