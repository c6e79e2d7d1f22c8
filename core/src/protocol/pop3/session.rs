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

//! POP3 session driver (RFC 1939), state machine `{Disconnected, Authorization, Transaction,
//! Update}`. USER/PASS, APOP, and AUTH (RFC 5034) all transition Authorization -> Transaction;
//! QUIT transitions Transaction -> Update -> Disconnected.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::sasl::{SaslCredentials, SaslMechanism, SaslNegotiator, SaslStep};

use super::error::Pop3ClientError;
use super::response::{read_multiline, read_multiline_lines, read_status, StatusKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pop3State {
    Authorization,
    Transaction,
    Update,
}

/// STAT response: message count and total size in octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatResponse {
    pub count: u32,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidlEntry {
    pub msg_no: u32,
    pub uidl: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntry {
    pub msg_no: u32,
    pub size: u64,
}

pub struct Pop3Session<S> {
    stream: S,
    read_buf: Vec<u8>,
    state: Pop3State,
    /// The `<...>` timestamp banner from the greeting, required for APOP.
    apop_banner: Option<String>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Pop3Session<S> {
    pub fn new(stream: S) -> Self {
        Self { stream, read_buf: Vec::with_capacity(4096), state: Pop3State::Authorization, apop_banner: None }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn state(&self) -> Pop3State {
        self.state
    }

    async fn write_line(&mut self, line: &str) -> Result<(), Pop3ClientError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read the greeting banner; extracts the `<...>` APOP timestamp token when present.
    pub async fn read_greeting(&mut self) -> Result<(), Pop3ClientError> {
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Protocol(format!("unexpected greeting: {}", status.message)));
        }
        self.apop_banner = parse_apop_banner(&status.message);
        Ok(())
    }

    /// CAPA (RFC 2449/5034): returns the advertised capability lines verbatim.
    pub async fn capa(&mut self) -> Result<Vec<String>, Pop3ClientError> {
        self.write_line("CAPA").await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Protocol(format!("CAPA failed: {}", status.message)));
        }
        read_multiline_lines(&mut self.stream, &mut self.read_buf).await
    }

    /// STLS (RFC 2595): upgrade a plaintext connection to TLS before authenticating. Only valid
    /// in the Authorization state; like IMAP STARTTLS, capabilities advertised before the
    /// upgrade are not trustworthy and must be re-queried with CAPA afterward.
    pub async fn stls(&mut self) -> Result<(), Pop3ClientError> {
        if self.state != Pop3State::Authorization {
            return Err(Pop3ClientError::invalid_state(format!("STLS requires Authorization state, was {:?}", self.state)));
        }
        self.write_line("STLS").await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Protocol(format!("STLS failed: {}", status.message)));
        }
        Ok(())
    }

    /// USER then PASS (plaintext login).
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), Pop3ClientError> {
        self.write_line(&format!("USER {}", username)).await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Authentication { reason: status.message, server_message: None });
        }

        self.write_line(&format!("PASS {}", password)).await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Authentication { reason: status.message, server_message: None });
        }
        self.state = Pop3State::Transaction;
        Ok(())
    }

    /// APOP: challenge-response login avoiding a plaintext password, using the timestamp banner
    /// from the greeting. Fails if the server's greeting carried no `<...>` banner.
    pub async fn apop(&mut self, username: &str, password: &str) -> Result<(), Pop3ClientError> {
        let banner = self.apop_banner.clone().ok_or_else(|| Pop3ClientError::CapabilityMissing("APOP".to_string()))?;
        let mut hasher = Md5::new();
        hasher.update(banner.as_bytes());
        hasher.update(password.as_bytes());
        let digest = hasher.finalize();
        let digest_hex = hex(&digest);

        self.write_line(&format!("APOP {} {}", username, digest_hex)).await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Authentication { reason: status.message, server_message: None });
        }
        self.state = Pop3State::Transaction;
        Ok(())
    }

    /// AUTH (RFC 5034), driven by the shared SASL negotiator; loops on `+ ` continuations.
    pub async fn authenticate(&mut self, mechanism: SaslMechanism, creds: SaslCredentials<'_>) -> Result<(), Pop3ClientError> {
        let mut negotiator = SaslNegotiator::new(mechanism, creds);
        let initial = negotiator.initial_response()?;
        let mut line = format!("AUTH {}", mechanism.name());
        if let Some(resp) = &initial {
            line.push(' ');
            line.push_str(&B64.encode(resp));
        }
        self.write_line(&line).await?;
        loop {
            let status = read_status(&mut self.stream, &mut self.read_buf).await?;
            match status.kind {
                StatusKind::Ok => {
                    self.state = Pop3State::Transaction;
                    return Ok(());
                }
                StatusKind::Continuation => match negotiator.challenge(status.message.trim())? {
                    SaslStep::Respond(bytes) => self.write_line(&B64.encode(&bytes)).await?,
                    SaslStep::Done => self.write_line("").await?,
                },
                StatusKind::Err => {
                    return Err(Pop3ClientError::Authentication { reason: status.message, server_message: None });
                }
            }
        }
    }

    /// STAT -> message count and total size.
    pub async fn stat(&mut self) -> Result<StatResponse, Pop3ClientError> {
        self.write_line("STAT").await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Protocol(format!("STAT failed: {}", status.message)));
        }
        let parts: Vec<&str> = status.message.split_whitespace().collect();
        let count = parts.first().and_then(|s| s.parse().ok()).unwrap_or(0u32);
        let total_size = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0u64);
        Ok(StatResponse { count, total_size })
    }

    /// LIST [msg]. With no argument this is a multi-line response; with an argument it's a
    /// single-line `+OK msg size` reply.
    pub async fn list(&mut self, msg: Option<u32>) -> Result<Vec<ListEntry>, Pop3ClientError> {
        match msg {
            Some(n) => {
                self.write_line(&format!("LIST {}", n)).await?;
                let status = read_status(&mut self.stream, &mut self.read_buf).await?;
                if status.kind != StatusKind::Ok {
                    return Err(Pop3ClientError::Protocol(format!("LIST {} failed: {}", n, status.message)));
                }
                Ok(vec![parse_list_line(&status.message).unwrap_or(ListEntry { msg_no: n, size: 0 })])
            }
            None => {
                self.write_line("LIST").await?;
                let status = read_status(&mut self.stream, &mut self.read_buf).await?;
                if status.kind != StatusKind::Ok {
                    return Err(Pop3ClientError::Protocol(format!("LIST failed: {}", status.message)));
                }
                let lines = read_multiline_lines(&mut self.stream, &mut self.read_buf).await?;
                Ok(lines.iter().filter_map(|l| parse_list_line(l)).collect())
            }
        }
    }

    /// UIDL [msg].
    pub async fn uidl(&mut self, msg: Option<u32>) -> Result<Vec<UidlEntry>, Pop3ClientError> {
        match msg {
            Some(n) => {
                self.write_line(&format!("UIDL {}", n)).await?;
                let status = read_status(&mut self.stream, &mut self.read_buf).await?;
                if status.kind != StatusKind::Ok {
                    return Err(Pop3ClientError::Protocol(format!("UIDL {} failed: {}", n, status.message)));
                }
                Ok(vec![parse_uidl_line(&status.message).unwrap_or(UidlEntry { msg_no: n, uidl: String::new() })])
            }
            None => {
                self.write_line("UIDL").await?;
                let status = read_status(&mut self.stream, &mut self.read_buf).await?;
                if status.kind != StatusKind::Ok {
                    return Err(Pop3ClientError::Protocol(format!("UIDL failed: {}", status.message)));
                }
                let lines = read_multiline_lines(&mut self.stream, &mut self.read_buf).await?;
                Ok(lines.iter().filter_map(|l| parse_uidl_line(l)).collect())
            }
        }
    }

    /// RETR msg -> full message bytes, dot-unstuffed.
    pub async fn retr(&mut self, msg_no: u32) -> Result<Vec<u8>, Pop3ClientError> {
        self.write_line(&format!("RETR {}", msg_no)).await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Protocol(format!("RETR {} failed: {}", msg_no, status.message)));
        }
        read_multiline(&mut self.stream, &mut self.read_buf).await
    }

    /// RETR with streaming: `on_chunk` is called for each decoded line plus its CRLF terminator,
    /// so a caller never has to hold the whole message in memory.
    pub async fn retr_streaming<F>(&mut self, msg_no: u32, mut on_chunk: F) -> Result<(), Pop3ClientError>
    where
        F: FnMut(&[u8]),
    {
        self.write_line(&format!("RETR {}", msg_no)).await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Protocol(format!("RETR {} failed: {}", msg_no, status.message)));
        }
        super::response::read_multiline_streaming(&mut self.stream, &mut self.read_buf, |c| on_chunk(c)).await
    }

    /// TOP msg n -> headers plus the first n lines of the body (n=0 for headers only).
    pub async fn top(&mut self, msg_no: u32, n: u32) -> Result<Vec<u8>, Pop3ClientError> {
        self.write_line(&format!("TOP {} {}", msg_no, n)).await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Protocol(format!("TOP {} {} failed: {}", msg_no, n, status.message)));
        }
        read_multiline(&mut self.stream, &mut self.read_buf).await
    }

    /// DELE msg: marks a message for deletion; deletion is only committed on a clean QUIT.
    pub async fn dele(&mut self, msg_no: u32) -> Result<(), Pop3ClientError> {
        self.write_line(&format!("DELE {}", msg_no)).await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Protocol(format!("DELE {} failed: {}", msg_no, status.message)));
        }
        Ok(())
    }

    /// RSET: unmarks any messages marked for deletion this session.
    pub async fn rset(&mut self) -> Result<(), Pop3ClientError> {
        self.write_line("RSET").await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Protocol(format!("RSET failed: {}", status.message)));
        }
        Ok(())
    }

    pub async fn noop(&mut self) -> Result<(), Pop3ClientError> {
        self.write_line("NOOP").await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Protocol(format!("NOOP failed: {}", status.message)));
        }
        Ok(())
    }

    /// QUIT: commits any DELE marks (Update state), then the connection is expected to close.
    pub async fn quit(&mut self) -> Result<(), Pop3ClientError> {
        self.write_line("QUIT").await?;
        let status = read_status(&mut self.stream, &mut self.read_buf).await?;
        self.state = Pop3State::Update;
        if status.kind != StatusKind::Ok {
            return Err(Pop3ClientError::Protocol(format!("QUIT failed: {}", status.message)));
        }
        Ok(())
    }
}

fn parse_apop_banner(greeting: &str) -> Option<String> {
    let start = greeting.find('<')?;
    let end = greeting[start..].find('>')? + start;
    Some(greeting[start..=end].to_string())
}

fn parse_list_line(line: &str) -> Option<ListEntry> {
    let mut sp = line.splitn(2, ' ');
    let msg_no: u32 = sp.next()?.parse().ok()?;
    let size: u64 = sp.next()?.trim().split_whitespace().next()?.parse().ok()?;
    Some(ListEntry { msg_no, size })
}

fn parse_uidl_line(line: &str) -> Option<UidlEntry> {
    let mut sp = line.splitn(2, ' ');
    let msg_no: u32 = sp.next()?.parse().ok()?;
    let uidl = sp.next()?.trim().to_string();
    Some(UidlEntry { msg_no, uidl })
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
    async fn greeting_extracts_apop_banner_and_apop_login_succeeds() {
        let client = spawn_server(|mut server| async move {
            let mut buf = vec![0u8; 1024];
            server.write_all(b"+OK POP3 server ready <1896.697170952@dbc.mtview.ca.us>\r\n").await.unwrap();
            let n = server.read(&mut buf).await.unwrap();
            let line = String::from_utf8_lossy(&buf[..n]).to_string();
            assert_eq!(line, "APOP mrose c4c9334bac560ecc979e58001b3e22fb\r\n");
            server.write_all(b"+OK mrose's maildrop has 2 messages\r\n").await.unwrap();
        });
        let mut session = Pop3Session::new(client);
        session.read_greeting().await.unwrap();
        session.apop("mrose", "tanstaaftanstaaf").await.unwrap();
        assert_eq!(session.state(), Pop3State::Transaction);
    }

    #[tokio::test]
    async fn stat_parses_count_and_size() {
        let client = spawn_server(|mut server| async move {
            let mut buf = vec![0u8; 1024];
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"STAT\r\n");
            server.write_all(b"+OK 2 320\r\n").await.unwrap();
        });
        let mut session = Pop3Session::new(client);
        let stat = session.stat().await.unwrap();
        assert_eq!(stat, StatResponse { count: 2, total_size: 320 });
    }

    #[tokio::test]
    async fn retr_undoes_dot_stuffing() {
        let client = spawn_server(|mut server| async move {
            let mut buf = vec![0u8; 1024];
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"RETR 1\r\n");
            server.write_all(b"+OK 120 octets\r\n").await.unwrap();
            server.write_all(b"Subject: hi\r\n..leading dot\r\n.\r\n").await.unwrap();
        });
        let mut session = Pop3Session::new(client);
        let body = session.retr(1).await.unwrap();
        assert_eq!(body, b"Subject: hi\r\n.leading dot\r\n".to_vec());
    }

    #[tokio::test]
    async fn uidl_list_parses_all_entries() {
        let client = spawn_server(|mut server| async move {
            let mut buf = vec![0u8; 1024];
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"UIDL\r\n");
            server.write_all(b"+OK\r\n1 whqtswO00WBw418f9t5JxYwZ\r\n2 QhdPYR:00WBw1Ph7x7\r\n.\r\n").await.unwrap();
        });
        let mut session = Pop3Session::new(client);
        let entries = session.uidl(None).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], UidlEntry { msg_no: 1, uidl: "whqtswO00WBw418f9t5JxYwZ".to_string() });
    }

    #[tokio::test]
    async fn dele_failure_surfaces_err_message() {
        let client = spawn_server(|mut server| async move {
            let mut buf = vec![0u8; 1024];
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"DELE 5\r\n");
            server.write_all(b"-ERR no such message\r\n").await.unwrap();
        });
        let mut session = Pop3Session::new(client);
        let err = session.dele(5).await.unwrap_err();
        match err {
            Pop3ClientError::Protocol(m) => assert!(m.contains("no such message")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn stls_succeeds_in_authorization_state() {
        let client = spawn_server(|mut server| async move {
            let mut buf = vec![0u8; 1024];
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"STLS\r\n");
            server.write_all(b"+OK Begin TLS negotiation\r\n").await.unwrap();
        });
        let mut session = Pop3Session::new(client);
        session.stls().await.unwrap();
    }

    #[tokio::test]
    async fn stls_rejected_outside_authorization_state() {
        let client = spawn_server(|mut _server| async move {});
        let mut session = Pop3Session::new(client);
        session.state = Pop3State::Transaction;
        let err = session.stls().await.unwrap_err();
        match err {
            Pop3ClientError::InvalidState(_) => {}
            other => panic!("unexpected error {:?}", other),
        }
    }
}
