/*
 * negotiator.rs
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

//! Mechanism-agnostic challenge/response driver. A protocol session (IMAP AUTHENTICATE, SMTP
//! AUTH, POP3 AUTH) owns one `Negotiator` for the lifetime of an authentication attempt and
//! feeds it base64-decoded server challenges; the negotiator returns the next client response
//! or signals completion.

use super::gssapi::GssapiContext;
use super::scram::{self, ChannelBinding, ScramDigest, ScramState};
use super::{cram_md5, digest_md5, login, oauthbearer, plain, xoauth2, SaslError, SaslMechanism};

/// Credentials and connection parameters a negotiator may need depending on mechanism.
pub struct SaslCredentials<'a> {
    pub authzid: &'a str,
    pub authcid: &'a str,
    /// Password, OAuth2 bearer token, or NTLM password depending on mechanism.
    pub secret: &'a str,
    /// Required for DIGEST-MD5 (`imap/host` or `smtp/host`).
    pub digest_uri: Option<&'a str>,
    /// Required for OAUTHBEARER.
    pub host: Option<&'a str>,
    pub port: Option<u16>,
    /// Required for NTLM; empty string if the account has no Windows domain.
    pub ntlm_domain: Option<&'a str>,
    /// Required for a `-PLUS` SCRAM mechanism: the TLS channel-binding data (e.g.
    /// `tls-server-end-point` hash of the peer certificate) from the active connection.
    pub channel_binding: ChannelBinding<'a>,
}

/// One step of the exchange: either a response to send, or completion.
pub enum SaslStep {
    /// Send this response; more challenges may follow.
    Respond(Vec<u8>),
    /// The exchange's client side is complete; no further response is sent. The caller should
    /// still wait for the server's final tagged response (success/failure).
    Done,
}

enum Inner {
    SinglePass,
    Scram { digest: ScramDigest, state: Option<ScramState> },
    Gssapi { context: Box<dyn GssapiContext> },
}

/// Drives one authentication attempt for a given mechanism.
pub struct SaslNegotiator<'a> {
    mechanism: SaslMechanism,
    creds: SaslCredentials<'a>,
    inner: Inner,
    /// DIGEST-MD5 only: whether the realm/nonce challenge has already been answered, so the
    /// next challenge is the server's rspauth= confirmation.
    digest_md5_first_done: bool,
}

impl<'a> SaslNegotiator<'a> {
    pub fn new(mechanism: SaslMechanism, creds: SaslCredentials<'a>) -> Self {
        let inner = match mechanism {
            SaslMechanism::ScramSha1 | SaslMechanism::ScramSha1Plus => Inner::Scram { digest: ScramDigest::Sha1, state: None },
            SaslMechanism::ScramSha256 | SaslMechanism::ScramSha256Plus => Inner::Scram { digest: ScramDigest::Sha256, state: None },
            SaslMechanism::ScramSha512 | SaslMechanism::ScramSha512Plus => Inner::Scram { digest: ScramDigest::Sha512, state: None },
            _ => Inner::SinglePass,
        };
        Self { mechanism, creds, inner, digest_md5_first_done: false }
    }

    /// Build a GSSAPI negotiator around a caller-supplied Kerberos context.
    pub fn new_gssapi(creds: SaslCredentials<'a>, context: Box<dyn GssapiContext>) -> Self {
        Self { mechanism: SaslMechanism::Gssapi, creds, inner: Inner::Gssapi { context }, digest_md5_first_done: false }
    }

    pub fn mechanism(&self) -> SaslMechanism {
        self.mechanism
    }

    /// The initial client response to send with AUTHENTICATE/AUTH, if the mechanism sends one
    /// before seeing any server challenge. `None` means the client must wait for the server's
    /// first challenge (LOGIN, GSSAPI, NTLM).
    pub fn initial_response(&mut self) -> Result<Option<Vec<u8>>, SaslError> {
        match self.mechanism {
            SaslMechanism::Plain => Ok(Some(plain::initial_response_plain(self.creds.authzid, self.creds.authcid, self.creds.secret)?)),
            SaslMechanism::XOAuth2 => Ok(Some(xoauth2::xoauth2_initial_response(self.creds.authcid, self.creds.secret))),
            SaslMechanism::OAuthBearer => {
                let host = self.creds.host.ok_or_else(|| SaslError::invalid("OAUTHBEARER requires host"))?;
                let port = self.creds.port.ok_or_else(|| SaslError::invalid("OAUTHBEARER requires port"))?;
                Ok(Some(oauthbearer::initial_response(self.creds.authcid, host, port, self.creds.secret)))
            }
            SaslMechanism::External => Ok(Some(super::external::initial_response(self.creds.authzid))),
            SaslMechanism::ScramSha1 | SaslMechanism::ScramSha1Plus
            | SaslMechanism::ScramSha256 | SaslMechanism::ScramSha256Plus
            | SaslMechanism::ScramSha512 | SaslMechanism::ScramSha512Plus => {
                let Inner::Scram { digest, state } = &mut self.inner else { unreachable!() };
                let (bytes, new_state) = scram::client_first(*digest, self.creds.authcid, self.creds.channel_binding);
                *state = Some(new_state);
                Ok(Some(bytes))
            }
            SaslMechanism::Login | SaslMechanism::CramMd5 | SaslMechanism::DigestMd5 | SaslMechanism::NtlmV2 | SaslMechanism::Gssapi => Ok(None),
        }
    }

    /// Respond to a base64-decoded server challenge (the payload of a 334/continuation line).
    pub fn challenge(&mut self, server_challenge_b64: &str) -> Result<SaslStep, SaslError> {
        match self.mechanism {
            SaslMechanism::Login => Ok(SaslStep::Respond(login::respond_to_challenge(server_challenge_b64, self.creds.authcid, self.creds.secret)?)),
            SaslMechanism::CramMd5 => {
                let resp = cram_md5::respond_to_challenge(self.creds.authcid, self.creds.secret, server_challenge_b64)?;
                Ok(SaslStep::Respond(resp))
            }
            SaslMechanism::DigestMd5 => {
                let digest_uri = self.creds.digest_uri.ok_or_else(|| SaslError::invalid("DIGEST-MD5 requires digest_uri"))?;
                // First challenge carries the realm/nonce directives; the second is the
                // server's rspauth= confirmation, answered with an empty response.
                if self.digest_md5_first_done {
                    self.digest_md5_first_done_reset();
                    return Ok(SaslStep::Respond(digest_md5::final_response()));
                }
                let resp = digest_md5::respond_to_challenge(server_challenge_b64, self.creds.authcid, self.creds.secret, digest_uri)?;
                self.digest_md5_first_done = true;
                Ok(SaslStep::Respond(resp))
            }
            SaslMechanism::ScramSha1 | SaslMechanism::ScramSha1Plus
            | SaslMechanism::ScramSha256 | SaslMechanism::ScramSha256Plus
            | SaslMechanism::ScramSha512 | SaslMechanism::ScramSha512Plus => {
                let Inner::Scram { state, .. } = &mut self.inner else { unreachable!() };
                let state = state.as_mut().ok_or_else(|| SaslError::invalid("SCRAM challenge received before client-first"))?;
                if state.expected_server_signature().is_some() {
                    // Second challenge: the server's final message carrying v= (or e=).
                    state.verify_server_final(server_challenge_b64)?;
                    return Ok(SaslStep::Done);
                }
                let resp = scram::client_final(state, server_challenge_b64, self.creds.secret, self.creds.channel_binding)?;
                Ok(SaslStep::Respond(resp))
            }
            SaslMechanism::NtlmV2 => {
                let domain = self.creds.ntlm_domain.unwrap_or("");
                let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, server_challenge_b64.trim())
                    .map_err(|_| SaslError::invalid("invalid base64 NTLM challenge"))?;
                let resp = super::ntlm::authenticate_message(&decoded, domain, self.creds.authcid, self.creds.secret)?;
                Ok(SaslStep::Respond(resp))
            }
            SaslMechanism::Gssapi => {
                let Inner::Gssapi { context } = &mut self.inner else { unreachable!() };
                let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, server_challenge_b64.trim())
                    .map_err(|_| SaslError::invalid("invalid base64 GSSAPI challenge"))?;
                if !context.is_established() {
                    match context.step(&decoded)? {
                        Some(token) => Ok(SaslStep::Respond(token)),
                        None => Ok(SaslStep::Respond(Vec::new())),
                    }
                } else {
                    let resp = context.negotiate_security_layer(&decoded, self.creds.authzid)?;
                    Ok(SaslStep::Respond(resp))
                }
            }
            SaslMechanism::Plain | SaslMechanism::XOAuth2 | SaslMechanism::OAuthBearer | SaslMechanism::External => {
                Err(SaslError::invalid("this mechanism does not expect a server challenge after its initial response"))
            }
        }
    }
}

// DIGEST-MD5 needs one bit of extra state (first-vs-second challenge) that doesn't fit the
// `Inner` enum cleanly since it has no auxiliary data of its own.
impl<'a> SaslNegotiator<'a> {
    fn digest_md5_first_done_reset(&mut self) {
        self.digest_md5_first_done = false;
    }
}
