/*
 * connect.rs
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

//! Connection setup: implicit TLS (465) vs STARTTLS (587/25), plus authentication. Mirrors the
//! IMAP connect helper in shape: one boxed `Conn` so `SmtpSession` doesn't need two generic
//! instantiations depending on which path was taken, and STARTTLS upgrades the transport by
//! rebuilding the session around the upgraded stream.

use std::pin::Pin;

use crate::net::{PlainStream, TlsStreamWrapper};
use crate::sasl::{SaslCredentials, SaslMechanism};
use crate::store::{Envelope, StoreError};

use super::error::SmtpClientError;
use super::session::{MailParams, RcptParams, SmtpSession};

pub enum Conn {
    Plain(PlainStream),
    Tls(TlsStreamWrapper),
}

impl tokio::io::AsyncRead for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Conn::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Conn::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl tokio::io::AsyncWrite for Conn {
    fn poll_write(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>, buf: &[u8]) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Conn::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Conn::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }
    fn poll_flush(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Conn::Plain(s) => Pin::new(s).poll_flush(cx),
            Conn::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Conn::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Conn::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

pub async fn connect_and_authenticate(
    host: &str,
    port: u16,
    use_implicit_tls: bool,
    use_starttls: bool,
    auth: Option<(&str, &str, SaslMechanism)>,
    ehlo_hostname: &str,
) -> Result<SmtpSession<Conn>, SmtpClientError> {
    let conn = if use_implicit_tls {
        Conn::Tls(TlsStreamWrapper::connect_implicit_tls(host, port).await?)
    } else {
        Conn::Plain(PlainStream::connect(host, port).await?)
    };
    let mut session = SmtpSession::new(conn);
    session.read_greeting().await?;
    session.ehlo(ehlo_hostname).await?;

    let mut session = if use_starttls && !use_implicit_tls && session.capabilities.starttls {
        session.starttls().await?;
        let Conn::Plain(plain) = session.into_inner() else {
            return Err(SmtpClientError::Protocol("STARTTLS attempted on an already-TLS connection".to_string()));
        };
        let tls = plain.upgrade_to_tls(host).await?;
        let mut upgraded = SmtpSession::new(Conn::Tls(tls));
        upgraded.ehlo(ehlo_hostname).await?;
        upgraded
    } else {
        session
    };

    if let Some((username, secret, mechanism)) = auth {
        let creds = SaslCredentials {
            authzid: "",
            authcid: username,
            secret,
            digest_uri: Some(&format!("smtp/{}", host)),
            host: Some(host),
            port: Some(port),
            ntlm_domain: None,
            channel_binding: None,
        };
        session.authenticate(mechanism, creds).await?;
    }
    Ok(session)
}

/// One already-established session, ready to send further messages without reconnecting.
pub struct SmtpConnection {
    session: SmtpSession<Conn>,
}

impl SmtpConnection {
    pub async fn connect(
        host: &str,
        port: u16,
        use_implicit_tls: bool,
        use_starttls: bool,
        auth: Option<(&str, &str, SaslMechanism)>,
        ehlo_hostname: &str,
    ) -> Result<Self, SmtpClientError> {
        let session = connect_and_authenticate(host, port, use_implicit_tls, use_starttls, auth, ehlo_hostname).await?;
        Ok(Self { session })
    }

    pub async fn send_one(&mut self, envelope: &Envelope, message: &[u8]) -> Result<(), SmtpClientError> {
        let from = envelope_address(envelope)?;
        let recipients: Vec<String> =
            envelope.to.iter().chain(envelope.cc.iter()).chain(envelope.bcc.iter()).map(format_address).collect();
        if recipients.is_empty() {
            return Err(SmtpClientError::Protocol("message has no recipients".to_string()));
        }
        let international = !from.is_ascii() || recipients.iter().any(|r| !r.is_ascii());
        let mail_params = MailParams::for_message(message, international);
        self.session
            .send_pipelined(&from, &recipients, &mail_params, &RcptParams::default(), message)
            .await?;
        Ok(())
    }

    pub async fn quit(&mut self) -> Result<(), SmtpClientError> {
        self.session.quit().await
    }
}

fn envelope_address(envelope: &Envelope) -> Result<String, SmtpClientError> {
    let from = envelope.from.first().ok_or_else(|| SmtpClientError::Protocol("message has no From address".to_string()))?;
    Ok(format_address(from))
}

fn format_address(address: &crate::store::Address) -> String {
    match &address.domain {
        Some(domain) => format!("{}@{}", address.local_part, domain),
        None => address.local_part.clone(),
    }
}

impl From<StoreError> for SmtpClientError {
    fn from(e: StoreError) -> Self {
        SmtpClientError::Protocol(e.to_string())
    }
}
