/*
 * session.rs
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

//! ESMTP session driver (RFC 5321 + EHLO extensions), generic over any `AsyncRead + AsyncWrite`
//! transport so a STARTTLS upgrade is handled by the caller rebuilding the session around the
//! upgraded stream, the same pattern used for IMAP.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::sasl::{SaslCredentials, SaslMechanism, SaslNegotiator, SaslStep};

use super::dot_stuffer::DotStuffer;
use super::error::SmtpClientError;
use super::response::{read_response, SmtpResponse};

/// Default BDAT chunk size when the caller doesn't pick one (RFC 3030 CHUNKING).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Default)]
pub struct SmtpCapabilities {
    pub starttls: bool,
    pub auth_mechanisms: Vec<String>,
    pub size: Option<u64>,
    pub eightbitmime: bool,
    pub smtputf8: bool,
    pub pipelining: bool,
    pub chunking: bool,
    pub dsn: bool,
    pub enhanced_status_codes: bool,
}

impl SmtpCapabilities {
    fn parse(lines: &[String]) -> Self {
        let mut caps = Self::default();
        for line in lines {
            let upper = line.to_ascii_uppercase();
            if upper == "STARTTLS" {
                caps.starttls = true;
            } else if let Some(rest) = upper.strip_prefix("AUTH ") {
                caps.auth_mechanisms = rest.split_whitespace().map(|s| s.to_string()).collect();
            } else if let Some(rest) = upper.strip_prefix("SIZE") {
                caps.size = rest.trim().parse().ok();
            } else if upper == "8BITMIME" {
                caps.eightbitmime = true;
            } else if upper == "SMTPUTF8" {
                caps.smtputf8 = true;
            } else if upper == "PIPELINING" {
                caps.pipelining = true;
            } else if upper == "CHUNKING" {
                caps.chunking = true;
            } else if upper == "DSN" {
                caps.dsn = true;
            } else if upper == "ENHANCEDSTATUSCODES" {
                caps.enhanced_status_codes = true;
            }
        }
        caps
    }

    pub fn supports_auth(&self, mechanism: SaslMechanism) -> bool {
        self.auth_mechanisms.iter().any(|m| m.eq_ignore_ascii_case(mechanism.name()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsnRet {
    Full,
    Hdrs,
}

impl DsnRet {
    fn as_str(&self) -> &'static str {
        match self {
            DsnRet::Full => "FULL",
            DsnRet::Hdrs => "HDRS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsnNotify {
    Never,
    Success,
    Failure,
    Delay,
}

impl DsnNotify {
    fn as_str(&self) -> &'static str {
        match self {
            DsnNotify::Never => "NEVER",
            DsnNotify::Success => "SUCCESS",
            DsnNotify::Failure => "FAILURE",
            DsnNotify::Delay => "DELAY",
        }
    }
}

/// Per-transaction MAIL FROM parameters. `size`/`body_8bitmime`/`ret`/`envid` are silently
/// dropped if the server didn't advertise the matching extension (harmless to ask for); a
/// `smtputf8` request the server can't honor is instead a hard error (there is no way to send an
/// internationalized envelope without it), see [`SmtpSession::mail_from`].
#[derive(Debug, Clone, Default)]
pub struct MailParams {
    pub size: Option<u64>,
    pub body_8bitmime: bool,
    pub smtputf8: bool,
    pub ret: Option<DsnRet>,
    pub envid: Option<String>,
}

impl MailParams {
    /// Derive `size` and `body_8bitmime` from the message that is about to be sent, and
    /// `smtputf8` from whether the envelope was flagged as requiring UTF-8 addresses. This is
    /// the parameter-synthesis path a caller uses instead of hand-setting the flags.
    pub fn for_message(message: &[u8], international: bool) -> Self {
        Self {
            size: Some(message.len() as u64),
            body_8bitmime: message.iter().any(|&b| b > 0x7f),
            smtputf8: international,
            ret: None,
            envid: None,
        }
    }
}

/// Per-recipient RCPT TO parameters (RFC 3461 DSN).
#[derive(Debug, Clone, Default)]
pub struct RcptParams {
    pub notify: Vec<DsnNotify>,
    pub orcpt: Option<String>,
}

fn mail_command_line(address: &str, params: &MailParams, caps: &SmtpCapabilities) -> String {
    let mut cmd = format!("MAIL FROM:<{}>", address);
    if let Some(size) = params.size {
        if caps.size.is_some() {
            cmd.push_str(&format!(" SIZE={}", size));
        }
    }
    if params.body_8bitmime && caps.eightbitmime {
        cmd.push_str(" BODY=8BITMIME");
    }
    if params.smtputf8 && caps.smtputf8 {
        cmd.push_str(" SMTPUTF8");
    }
    if caps.dsn {
        if let Some(ret) = params.ret {
            cmd.push_str(&format!(" RET={}", ret.as_str()));
        }
        if let Some(envid) = &params.envid {
            cmd.push_str(&format!(" ENVID={}", envid));
        }
    }
    cmd
}

fn rcpt_command_line(address: &str, params: &RcptParams, caps: &SmtpCapabilities) -> String {
    let mut cmd = format!("RCPT TO:<{}>", address);
    if caps.dsn {
        if !params.notify.is_empty() {
            let joined = params.notify.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(",");
            cmd.push_str(&format!(" NOTIFY={}", joined));
        }
        if let Some(orcpt) = &params.orcpt {
            cmd.push_str(&format!(" ORCPT={}", orcpt));
        }
    }
    cmd
}

pub struct SmtpSession<S> {
    stream: S,
    read_buf: Vec<u8>,
    pub capabilities: SmtpCapabilities,
    chunk_size: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SmtpSession<S> {
    pub fn new(stream: S) -> Self {
        Self { stream, read_buf: Vec::with_capacity(4096), capabilities: SmtpCapabilities::default(), chunk_size: DEFAULT_CHUNK_SIZE }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.max(1);
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SmtpClientError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<SmtpResponse, SmtpClientError> {
        read_response(&mut self.stream, &mut self.read_buf).await
    }

    pub async fn read_greeting(&mut self) -> Result<SmtpResponse, SmtpClientError> {
        let r = self.read().await?;
        if r.code != 220 {
            return Err(SmtpClientError::Protocol(format!("expected 220 greeting, got {} {}", r.code, r.message())));
        }
        Ok(r)
    }

    pub async fn ehlo(&mut self, hostname: &str) -> Result<&SmtpCapabilities, SmtpClientError> {
        self.write_line(&format!("EHLO {}", hostname)).await?;
        let r = self.read().await?;
        if r.code == 500 || r.code == 501 || r.code == 502 {
            self.helo(hostname).await?;
            return Ok(&self.capabilities);
        }
        if !r.is_success() {
            return Err(SmtpClientError::Protocol(format!("EHLO failed: {} {}", r.code, r.message())));
        }
        self.capabilities = SmtpCapabilities::parse(&r.lines);
        Ok(&self.capabilities)
    }

    pub async fn helo(&mut self, hostname: &str) -> Result<(), SmtpClientError> {
        self.write_line(&format!("HELO {}", hostname)).await?;
        let r = self.read().await?;
        if !r.is_success() {
            return Err(SmtpClientError::Protocol(format!("HELO failed: {} {}", r.code, r.message())));
        }
        self.capabilities = SmtpCapabilities::default();
        Ok(())
    }

    /// Send STARTTLS and wait for the 220 that precedes the TLS handshake. Capabilities must be
    /// re-queried with a fresh EHLO after the upgrade (a pre-TLS EHLO is not trustworthy).
    pub async fn starttls(&mut self) -> Result<(), SmtpClientError> {
        if !self.capabilities.starttls {
            return Err(SmtpClientError::CapabilityMissing("STARTTLS".to_string()));
        }
        self.write_line("STARTTLS").await?;
        let r = self.read().await?;
        if r.code != 220 {
            return Err(SmtpClientError::Protocol(format!("STARTTLS failed: {} {}", r.code, r.message())));
        }
        self.capabilities = SmtpCapabilities::default();
        Ok(())
    }

    pub async fn authenticate(&mut self, mechanism: SaslMechanism, creds: SaslCredentials<'_>) -> Result<(), SmtpClientError> {
        if !self.capabilities.supports_auth(mechanism) {
            return Err(SmtpClientError::CapabilityMissing(format!("AUTH {}", mechanism.name())));
        }
        let mut negotiator = SaslNegotiator::new(mechanism, creds);
        let initial = negotiator.initial_response()?;
        let mut line = format!("AUTH {}", mechanism.name());
        if let Some(resp) = &initial {
            line.push(' ');
            line.push_str(&B64.encode(resp));
        }
        self.write_line(&line).await?;
        loop {
            let r = self.read().await?;
            if r.code == 235 {
                return Ok(());
            }
            if r.code == 334 {
                let challenge = r.message();
                match negotiator.challenge(challenge.trim())? {
                    SaslStep::Respond(bytes) => self.write_line(&B64.encode(&bytes)).await?,
                    SaslStep::Done => self.write_line("").await?,
                }
                continue;
            }
            return Err(SmtpClientError::Authentication {
                reason: format!("{} {}", r.code, r.message()),
                server_message: r.enhanced.map(|e| e.to_string()),
            });
        }
    }

    pub async fn noop(&mut self) -> Result<(), SmtpClientError> {
        self.write_line("NOOP").await?;
        let r = self.read().await?;
        if !r.is_success() {
            return Err(SmtpClientError::Protocol(format!("NOOP failed: {} {}", r.code, r.message())));
        }
        Ok(())
    }

    pub async fn rset(&mut self) -> Result<(), SmtpClientError> {
        self.write_line("RSET").await?;
        let r = self.read().await?;
        if !r.is_success() {
            return Err(SmtpClientError::Protocol(format!("RSET failed: {} {}", r.code, r.message())));
        }
        Ok(())
    }

    pub async fn vrfy(&mut self, address: &str) -> Result<SmtpResponse, SmtpClientError> {
        self.write_line(&format!("VRFY {}", address)).await?;
        self.read().await
    }

    pub async fn expn(&mut self, list: &str) -> Result<SmtpResponse, SmtpClientError> {
        self.write_line(&format!("EXPN {}", list)).await?;
        self.read().await
    }

    pub async fn help(&mut self, topic: Option<&str>) -> Result<SmtpResponse, SmtpClientError> {
        match topic {
            Some(t) => self.write_line(&format!("HELP {}", t)).await?,
            None => self.write_line("HELP").await?,
        }
        self.read().await
    }

    pub async fn mail_from(&mut self, address: &str, params: &MailParams) -> Result<(), SmtpClientError> {
        if params.smtputf8 && !self.capabilities.smtputf8 {
            return Err(SmtpClientError::CapabilityMissing("SMTPUTF8".to_string()));
        }
        let cmd = mail_command_line(address, params, &self.capabilities);
        self.write_line(&cmd).await?;
        let r = self.read().await?;
        if !r.is_success() {
            return Err(SmtpClientError::SenderNotAccepted { address: address.to_string(), status: r.code, enhanced: r.enhanced });
        }
        Ok(())
    }

    pub async fn rcpt_to(&mut self, address: &str, params: &RcptParams) -> Result<(), SmtpClientError> {
        let cmd = rcpt_command_line(address, params, &self.capabilities);
        self.write_line(&cmd).await?;
        let r = self.read().await?;
        if !r.is_success() && r.code != 251 && r.code != 252 {
            return Err(SmtpClientError::RecipientNotAccepted { address: address.to_string(), status: r.code, enhanced: r.enhanced });
        }
        Ok(())
    }

    /// DATA with dot-stuffing (RFC 5321 §4.5.2).
    pub async fn data(&mut self, message: &[u8]) -> Result<(), SmtpClientError> {
        self.write_line("DATA").await?;
        let r = self.read().await?;
        if r.code != 354 {
            return Err(SmtpClientError::Protocol(format!("DATA not accepted: {} {}", r.code, r.message())));
        }
        let mut out = Vec::with_capacity(message.len() + 128);
        let mut stuffer = DotStuffer::new();
        stuffer.process_chunk(message, |s| out.extend_from_slice(s));
        stuffer.end_message(|s| out.extend_from_slice(s));
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        let r = self.read().await?;
        if !r.is_success() {
            return Err(SmtpClientError::MessageNotAccepted { status: r.code, enhanced: r.enhanced });
        }
        Ok(())
    }

    /// BDAT chunking (RFC 3030 CHUNKING), splitting `message` into `self.chunk_size`-byte
    /// pieces. Every non-final chunk gets its own reply; only the final `BDAT ... LAST` reply
    /// determines acceptance of the whole message.
    pub async fn bdat(&mut self, message: &[u8]) -> Result<(), SmtpClientError> {
        if !self.capabilities.chunking {
            return Err(SmtpClientError::CapabilityMissing("CHUNKING".to_string()));
        }
        if message.is_empty() {
            self.write_line("BDAT 0 LAST").await?;
            let r = self.read().await?;
            if !r.is_success() {
                return Err(SmtpClientError::MessageNotAccepted { status: r.code, enhanced: r.enhanced });
            }
            return Ok(());
        }
        let chunk_size = self.chunk_size;
        let mut offset = 0;
        while offset < message.len() {
            let end = (offset + chunk_size).min(message.len());
            let chunk = &message[offset..end];
            let last = end == message.len();
            let header = if last { format!("BDAT {} LAST", chunk.len()) } else { format!("BDAT {}", chunk.len()) };
            self.write_line(&header).await?;
            self.stream.write_all(chunk).await?;
            self.stream.flush().await?;
            let r = self.read().await?;
            if last && !r.is_success() {
                return Err(SmtpClientError::MessageNotAccepted { status: r.code, enhanced: r.enhanced });
            } else if !last && !r.is_success() {
                return Err(SmtpClientError::Protocol(format!("BDAT chunk rejected: {} {}", r.code, r.message())));
            }
            offset = end;
        }
        Ok(())
    }

    /// One message transaction: MAIL FROM, then RCPT TO for every recipient (collecting
    /// rejections rather than aborting on the first one), then the message body. If every
    /// recipient is rejected the transaction is reset and the last rejection is returned.
    /// Returns the recipients the server actually accepted.
    pub async fn send(
        &mut self,
        from: &str,
        recipients: &[String],
        mail_params: &MailParams,
        rcpt_params: &RcptParams,
        message: &[u8],
    ) -> Result<Vec<String>, SmtpClientError> {
        self.mail_from(from, mail_params).await?;
        let mut accepted = Vec::new();
        let mut last_err = None;
        for rcpt in recipients {
            match self.rcpt_to(rcpt, rcpt_params).await {
                Ok(()) => accepted.push(rcpt.clone()),
                Err(e) => last_err = Some(e),
            }
        }
        if accepted.is_empty() {
            let _ = self.rset().await;
            return Err(last_err.unwrap_or_else(|| SmtpClientError::Protocol("no recipients accepted".to_string())));
        }
        if self.capabilities.chunking {
            self.bdat(message).await?;
        } else {
            self.data(message).await?;
        }
        Ok(accepted)
    }

    /// Like [`Self::send`], but batches MAIL FROM and every RCPT TO into one write (RFC 2920
    /// PIPELINING) before reading any reply, cutting the transaction's round trips from
    /// `2 + recipients.len()` to effectively one. Falls back to [`Self::send`] when the server
    /// didn't advertise PIPELINING.
    pub async fn send_pipelined(
        &mut self,
        from: &str,
        recipients: &[String],
        mail_params: &MailParams,
        rcpt_params: &RcptParams,
        message: &[u8],
    ) -> Result<Vec<String>, SmtpClientError> {
        if !self.capabilities.pipelining {
            return self.send(from, recipients, mail_params, rcpt_params, message).await;
        }
        if mail_params.smtputf8 && !self.capabilities.smtputf8 {
            return Err(SmtpClientError::CapabilityMissing("SMTPUTF8".to_string()));
        }

        let mail_cmd = mail_command_line(from, mail_params, &self.capabilities);
        let rcpt_cmds: Vec<String> = recipients.iter().map(|r| rcpt_command_line(r, rcpt_params, &self.capabilities)).collect();
        self.stream.write_all(mail_cmd.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        for cmd in &rcpt_cmds {
            self.stream.write_all(cmd.as_bytes()).await?;
            self.stream.write_all(b"\r\n").await?;
        }
        self.stream.flush().await?;

        let mail_reply = self.read().await?;
        if !mail_reply.is_success() {
            // The server still processes (and replies to) every piped command regardless of
            // an earlier failure; the pipe must be drained before RSET or the next command.
            for _ in recipients {
                let _ = self.read().await?;
            }
            let _ = self.rset().await;
            return Err(SmtpClientError::SenderNotAccepted { address: from.to_string(), status: mail_reply.code, enhanced: mail_reply.enhanced });
        }

        let mut accepted = Vec::new();
        let mut last_err = None;
        for rcpt in recipients {
            let r = self.read().await?;
            if r.is_success() || r.code == 251 || r.code == 252 {
                accepted.push(rcpt.clone());
            } else {
                last_err = Some(SmtpClientError::RecipientNotAccepted { address: rcpt.clone(), status: r.code, enhanced: r.enhanced });
            }
        }
        if accepted.is_empty() {
            let _ = self.rset().await;
            return Err(last_err.unwrap_or_else(|| SmtpClientError::Protocol("no recipients accepted".to_string())));
        }
        if self.capabilities.chunking {
            self.bdat(message).await?;
        } else {
            self.data(message).await?;
        }
        Ok(accepted)
    }

    pub async fn quit(&mut self) -> Result<(), SmtpClientError> {
        self.write_line("QUIT").await?;
        let _ = self.read().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt as _};

    fn spawn_server<F, Fut>(server: F) -> tokio::io::DuplexStream
    where
        F: FnOnce(tokio::io::DuplexStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (client, server_side) = tokio::io::duplex(8192);
        tokio::spawn(server(server_side));
        client
    }

    #[tokio::test]
    async fn reads_greeting_and_parses_ehlo_capabilities() {
        let client = spawn_server(|mut server| async move {
            let mut buf = vec![0u8; 1024];
            server.write_all(b"220 mail.example.com ESMTP\r\n").await.unwrap();
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"EHLO client.example.com\r\n");
            server
                .write_all(b"250-mail.example.com\r\n250-PIPELINING\r\n250-SIZE 1000000\r\n250-8BITMIME\r\n250-AUTH PLAIN LOGIN\r\n250 CHUNKING\r\n")
                .await
                .unwrap();
        });
        let mut session = SmtpSession::new(client);
        session.read_greeting().await.unwrap();
        let caps = session.ehlo("client.example.com").await.unwrap().clone();
        assert!(caps.pipelining);
        assert!(caps.eightbitmime);
        assert!(caps.chunking);
        assert_eq!(caps.size, Some(1000000));
        assert!(caps.supports_auth(SaslMechanism::Plain));
        assert!(caps.supports_auth(SaslMechanism::Login));
    }

    #[tokio::test]
    async fn send_with_dot_stuffed_data() {
        let client = spawn_server(|mut server| async move {
            let mut buf = vec![0u8; 4096];
            let n = server.read(&mut buf).await.unwrap();
            assert!(buf[..n].starts_with(b"MAIL FROM:<a@example.com>"));
            server.write_all(b"250 OK\r\n").await.unwrap();
            let n = server.read(&mut buf).await.unwrap();
            assert!(buf[..n].starts_with(b"RCPT TO:<b@example.com>"));
            server.write_all(b"250 OK\r\n").await.unwrap();
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"DATA\r\n");
            server.write_all(b"354 Go ahead\r\n").await.unwrap();
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"Subject: hi\r\n\r\n..dot\r\n.\r\n");
            server.write_all(b"250 2.0.0 OK queued\r\n").await.unwrap();
        });
        let mut session = SmtpSession::new(client);
        let accepted = session
            .send(
                "a@example.com",
                &["b@example.com".to_string()],
                &MailParams::default(),
                &RcptParams::default(),
                b"Subject: hi\r\n\r\n.dot",
            )
            .await
            .unwrap();
        assert_eq!(accepted, vec!["b@example.com".to_string()]);
    }

    #[tokio::test]
    async fn pipelined_send_drains_all_replies_after_mail_failure() {
        let client = spawn_server(|mut server| async move {
            let mut buf = vec![0u8; 4096];
            let n = server.read(&mut buf).await.unwrap();
            let sent = String::from_utf8_lossy(&buf[..n]).to_string();
            assert!(sent.contains("MAIL FROM:<bad@example.com>"));
            assert!(sent.contains("RCPT TO:<x@example.com>"));
            assert!(sent.contains("RCPT TO:<y@example.com>"));
            server.write_all(b"550 5.1.8 sender rejected\r\n").await.unwrap();
            server.write_all(b"250 OK\r\n").await.unwrap();
            server.write_all(b"250 OK\r\n").await.unwrap();
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"RSET\r\n");
            server.write_all(b"250 OK\r\n").await.unwrap();
        });
        let mut session = SmtpSession::new(client);
        session.capabilities.pipelining = true;
        let err = session
            .send_pipelined(
                "bad@example.com",
                &["x@example.com".to_string(), "y@example.com".to_string()],
                &MailParams::default(),
                &RcptParams::default(),
                b"body",
            )
            .await
            .unwrap_err();
        match err {
            SmtpClientError::SenderNotAccepted { status, .. } => assert_eq!(status, 550),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn bdat_splits_message_into_configured_chunk_size() {
        let client = spawn_server(|mut server| async move {
            let mut buf = vec![0u8; 4096];
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"BDAT 4\r\nabcd");
            server.write_all(b"250 OK\r\n").await.unwrap();
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"BDAT 2 LAST\r\nef");
            server.write_all(b"250 2.0.0 OK queued\r\n").await.unwrap();
        });
        let mut session = SmtpSession::new(client);
        session.capabilities.chunking = true;
        session.set_chunk_size(4);
        session.bdat(b"abcdef").await.unwrap();
    }

    #[test]
    fn for_message_derives_size_and_8bitmime_from_payload() {
        let ascii = MailParams::for_message(b"hello", false);
        assert_eq!(ascii.size, Some(5));
        assert!(!ascii.body_8bitmime);

        let eightbit = MailParams::for_message(&[b'h', b'i', 0xC3, 0xA9], true);
        assert_eq!(eightbit.size, Some(4));
        assert!(eightbit.body_8bitmime);
        assert!(eightbit.smtputf8);
    }

    #[tokio::test]
    async fn mail_from_rejects_smtputf8_without_capability() {
        let client = spawn_server(|mut _server| async move {});
        let mut session = SmtpSession::new(client);
        let params = MailParams { smtputf8: true, ..Default::default() };
        let err = session.mail_from("ñ@example.com", &params).await.unwrap_err();
        match err {
            SmtpClientError::CapabilityMissing(name) => assert_eq!(name, "SMTPUTF8"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn mail_command_line_includes_smtputf8_when_capability_present() {
        let client = spawn_server(|mut server| async move {
            let mut buf = vec![0u8; 1024];
            let n = server.read(&mut buf).await.unwrap();
            assert!(buf[..n].starts_with(b"MAIL FROM:<a@example.com> SMTPUTF8"));
            server.write_all(b"250 OK\r\n").await.unwrap();
        });
        let mut session = SmtpSession::new(client);
        session.capabilities.smtputf8 = true;
        let params = MailParams { smtputf8: true, ..Default::default() };
        session.mail_from("a@example.com", &params).await.unwrap();
    }
}
