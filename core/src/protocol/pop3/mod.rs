/*
 * mod.rs
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

//! POP3 client (Store with a single INBOX folder). Persistent connection with idle timeout and
//! reconnect, in the same shape as `protocol::imap`'s Store/Folder facade, narrowed to POP3's
//! one mailbox and flat message list.

mod error;
pub mod response;
pub mod session;

pub use error::Pop3ClientError;
pub use session::{ListEntry, Pop3Session, Pop3State, StatResponse, UidlEntry};

use std::collections::HashMap;
use std::ops::Range;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::message_id::{pop3_message_id, MessageId};
use crate::mime::{parse_envelope, EmailAddress, EnvelopeHeaders};
use crate::net::{PlainStream, TlsStreamWrapper};
use crate::sasl::{SaslCredentials, SaslMechanism};
use crate::store::{Address, ConversationSummary, DateTime, Envelope};
use crate::store::{Folder, FolderInfo, Store, StoreError, StoreKind};

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Either half of a connection, boxed behind one dynamic type for the same reason
/// `protocol::imap::Conn` is: `Pop3Session` doesn't need two generic instantiations depending on
/// whether implicit TLS is in use.
enum Conn {
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

async fn connect_and_authenticate(
    host: &str,
    port: u16,
    use_implicit_tls: bool,
    use_starttls: bool,
    auth: Option<(&str, &str, SaslMechanism)>,
    use_apop: bool,
) -> Result<Pop3Session<Conn>, Pop3ClientError> {
    let conn = if use_implicit_tls {
        Conn::Tls(TlsStreamWrapper::connect_implicit_tls(host, port).await?)
    } else {
        Conn::Plain(PlainStream::connect(host, port).await?)
    };
    let mut session = Pop3Session::new(conn);
    session.read_greeting().await?;

    let mut session = if use_starttls && !use_implicit_tls {
        session.stls().await?;
        let Conn::Plain(plain) = session.into_inner() else {
            return Err(Pop3ClientError::new("STLS attempted on an already-TLS connection"));
        };
        let tls = plain.upgrade_to_tls(host).await?;
        Pop3Session::new(Conn::Tls(tls))
    } else {
        session
    };

    if let Some((username, secret, mechanism)) = auth {
        if mechanism == SaslMechanism::Plain && use_apop {
            session.apop(username, secret).await?;
        } else if mechanism == SaslMechanism::Plain {
            session.login(username, secret).await?;
        } else {
            let creds = SaslCredentials {
                authzid: "",
                authcid: username,
                secret,
                digest_uri: Some(&format!("pop3/{}", host)),
                host: Some(host),
                port: Some(port),
                ntlm_domain: None,
                channel_binding: None,
            };
            session.authenticate(mechanism, creds).await?;
        }
    }
    Ok(session)
}

struct Pop3StoreState {
    host: String,
    port: u16,
    use_tls: RwLock<bool>,
    use_starttls: RwLock<bool>,
    use_apop: RwLock<bool>,
    auth: RwLock<Option<(String, String, SaslMechanism)>>,
    username: RwLock<String>,
    idle_timeout_secs: RwLock<u64>,
    runtime: once_cell::sync::OnceCell<tokio::runtime::Runtime>,
    connection_state: Arc<Mutex<(Option<Pop3Session<Conn>>, Instant)>>,
}

impl Pop3StoreState {
    fn runtime(&self) -> Result<&tokio::runtime::Runtime, StoreError> {
        self.runtime
            .get_or_try_init(|| tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|e| StoreError::new(e.to_string())))
    }

    /// Borrow (or establish) the persistent session for the duration of one operation, then
    /// return it to the pool. Reconnects when the idle timeout has elapsed or the pool is empty.
    fn with_session<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: for<'s> FnOnce(&'s mut Pop3Session<Conn>) -> Pin<Box<dyn std::future::Future<Output = Result<R, Pop3ClientError>> + Send + 's>>,
        R: Send,
    {
        let rt = self.runtime()?;
        let state = Arc::clone(&self.connection_state);
        let host = self.host.clone();
        let port = self.port;
        let use_tls = *self.use_tls.read().map_err(|e| StoreError::new(e.to_string()))?;
        let use_starttls = *self.use_starttls.read().map_err(|e| StoreError::new(e.to_string()))?;
        let use_apop = *self.use_apop.read().map_err(|e| StoreError::new(e.to_string()))?;
        let auth = self.auth.read().map_err(|e| StoreError::new(e.to_string()))?.as_ref().map(|(u, p, m)| (u.clone(), p.clone(), *m));
        let idle_timeout = Duration::from_secs(*self.idle_timeout_secs.read().map_err(|e| StoreError::new(e.to_string()))?);

        rt.block_on(async move {
            let mut session = {
                let mut guard = state.lock().map_err(|e| StoreError::new(e.to_string()))?;
                let expired = guard.0.as_ref().map_or(true, |_| guard.1.elapsed() > idle_timeout);
                if expired {
                    guard.0 = None;
                }
                guard.0.take()
            };
            if session.is_none() {
                let auth_ref = auth.as_ref().map(|(u, p, m)| (u.as_str(), p.as_str(), *m));
                session = Some(
                    connect_and_authenticate(&host, port, use_tls, use_starttls, auth_ref, use_apop)
                        .await
                        .map_err(|e| StoreError::new(e.to_string()))?,
                );
            }
            let mut session = session.unwrap();
            let result = f(&mut session).await.map_err(|e| StoreError::new(e.to_string()));
            let mut guard = state.lock().map_err(|e| StoreError::new(e.to_string()))?;
            match &result {
                Ok(_) => {
                    guard.0 = Some(session);
                    guard.1 = Instant::now();
                }
                Err(_) => {
                    guard.0 = None;
                }
            }
            result
        })
    }
}

/// POP3 store (single folder INBOX). Holds a persistent client: connection reuse, idle timeout,
/// reconnect on error or timeout.
pub struct Pop3Store {
    state: Arc<Pop3StoreState>,
}

impl Pop3Store {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let use_tls = port == 995;
        let state = Pop3StoreState {
            host,
            port,
            use_tls: RwLock::new(use_tls),
            use_starttls: RwLock::new(!use_tls),
            use_apop: RwLock::new(false),
            auth: RwLock::new(None),
            username: RwLock::new(String::new()),
            idle_timeout_secs: RwLock::new(DEFAULT_IDLE_TIMEOUT_SECS),
            runtime: once_cell::sync::OnceCell::new(),
            connection_state: Arc::new(Mutex::new((None, Instant::now()))),
        };
        Self { state: Arc::new(state) }
    }

    pub fn set_implicit_tls(&mut self, use_tls: bool) -> &mut Self {
        *self.state.use_tls.write().unwrap() = use_tls;
        self
    }

    /// Use STLS (RFC 2595) to upgrade a plaintext connection before authenticating. Ignored
    /// when implicit TLS is already in use.
    pub fn set_use_starttls(&mut self, use_starttls: bool) -> &mut Self {
        *self.state.use_starttls.write().unwrap() = use_starttls;
        self
    }

    /// Prefer APOP over plaintext USER/PASS when `mechanism` is `SaslMechanism::Plain`. Falls
    /// back to USER/PASS if the server's greeting carried no APOP timestamp banner.
    pub fn set_use_apop(&mut self, use_apop: bool) -> &mut Self {
        *self.state.use_apop.write().unwrap() = use_apop;
        self
    }

    pub fn set_auth(&mut self, username: impl Into<String>, password: impl Into<String>, mechanism: SaslMechanism) -> &mut Self {
        let u = username.into();
        *self.state.username.write().unwrap() = u.clone();
        *self.state.auth.write().unwrap() = Some((u, password.into(), mechanism));
        self
    }

    pub fn set_idle_timeout_secs(&mut self, secs: u64) -> &mut Self {
        *self.state.idle_timeout_secs.write().unwrap() = secs;
        self
    }

    fn user_at_host(&self) -> String {
        let username = self.state.username.read().unwrap().clone();
        if username.contains('@') {
            username
        } else {
            format!("{}@{}", username, self.state.host)
        }
    }
}

impl Store for Pop3Store {
    fn store_kind(&self) -> StoreKind {
        StoreKind::Email
    }

    fn list_folders(&self) -> Result<Vec<FolderInfo>, StoreError> {
        Ok(vec![FolderInfo { name: "INBOX".to_string(), delimiter: None, attributes: vec![] }])
    }

    fn open_folder(&self, name: &str) -> Result<Box<dyn Folder>, StoreError> {
        if !name.eq_ignore_ascii_case("INBOX") {
            return Err(StoreError::new("POP3 has only one folder, INBOX"));
        }
        Ok(Box::new(Pop3Folder { state: Arc::clone(&self.state), user_at_host: self.user_at_host() }))
    }

    fn hierarchy_delimiter(&self) -> Option<char> {
        None
    }

    fn default_folder(&self) -> Option<&str> {
        Some("INBOX")
    }
}

/// POP3's one mailbox. Message identity is the UIDL (stable across sessions per RFC 1939 §7);
/// the per-session message number is only used to address RETR/TOP/DELE on the wire.
struct Pop3Folder {
    state: Arc<Pop3StoreState>,
    user_at_host: String,
}

impl Pop3Folder {
    fn uidl_to_msg_no(&self, uidl: &str) -> Result<u32, StoreError> {
        let entries = self.state.with_session(|session| Box::pin(async move { session.uidl(None).await }))?;
        entries.into_iter().find(|e| e.uidl == uidl).map(|e| e.msg_no).ok_or_else(|| StoreError::new(format!("no message with UIDL {}", uidl)))
    }
}

impl Folder for Pop3Folder {
    fn list_conversations(
        &self,
        range: Range<u64>,
        on_summary: Box<dyn Fn(ConversationSummary) + Send + Sync>,
        on_complete: Box<dyn FnOnce(Result<(), StoreError>) + Send>,
    ) {
        let result = (|| -> Result<(), StoreError> {
            let uidls = self.state.with_session(|session| Box::pin(async move { session.uidl(None).await }))?;
            let sizes = self.state.with_session(|session| Box::pin(async move { session.list(None).await }))?;
            let mut size_by_msg: HashMap<u32, u64> = HashMap::new();
            for e in sizes {
                size_by_msg.insert(e.msg_no, e.size);
            }
            let lo = range.start as u32;
            let hi = range.end as u32;
            for entry in uidls.into_iter().filter(|e| e.msg_no >= lo && e.msg_no < hi) {
                let msg_no = entry.msg_no;
                let headers = self.state.with_session(move |session| Box::pin(async move { session.top(msg_no, 0).await }))?;
                let envelope = envelope_from_raw(&headers);
                let size = size_by_msg.get(&entry.msg_no).copied().unwrap_or(0);
                let id = pop3_message_id(&self.user_at_host, &entry.uidl);
                on_summary(ConversationSummary { id, envelope, flags: Default::default(), size });
            }
            Ok(())
        })();
        on_complete(result);
    }

    fn message_count(&self, on_complete: Box<dyn FnOnce(Result<u64, StoreError>) + Send>) {
        let result = self.state.with_session(|session| Box::pin(async move { session.stat().await })).map(|s| s.count as u64);
        on_complete(result);
    }

    fn get_message(
        &self,
        id: &MessageId,
        on_metadata: Box<dyn Fn(Envelope) + Send + Sync>,
        on_content_chunk: Box<dyn Fn(&[u8]) + Send + Sync>,
        on_complete: Box<dyn FnOnce(Result<(), StoreError>) + Send>,
    ) {
        let result = (|| -> Result<(), StoreError> {
            let uidl = uidl_from_message_id(id)?;
            let msg_no = self.uidl_to_msg_no(&uidl)?;
            let body = self.state.with_session(move |session| Box::pin(async move { session.retr(msg_no).await }))?;
            on_metadata(envelope_from_raw(&body));
            on_content_chunk(&body);
            Ok(())
        })();
        on_complete(result);
    }

    fn delete_message(&self, id: &MessageId, on_complete: Box<dyn FnOnce(Result<(), StoreError>) + Send>) {
        let result = (|| -> Result<(), StoreError> {
            let uidl = uidl_from_message_id(id)?;
            let msg_no = self.uidl_to_msg_no(&uidl)?;
            self.state.with_session(move |session| Box::pin(async move { session.dele(msg_no).await }))
        })();
        on_complete(result);
    }
}

fn uidl_from_message_id(id: &MessageId) -> Result<String, StoreError> {
    id.as_str().rsplit('/').next().map(|s| s.to_string()).ok_or_else(|| StoreError::new("malformed POP3 message id"))
}

/// Best-effort envelope extraction from RETR/TOP headers; a message with no parseable headers
/// still surfaces (empty envelope) rather than failing the whole fetch.
fn envelope_from_raw(raw: &[u8]) -> Envelope {
    parse_envelope(raw).map(|rfc| rfc5322_envelope_to_store(&rfc)).unwrap_or_default()
}

fn rfc5322_envelope_to_store(rfc: &EnvelopeHeaders) -> Envelope {
    Envelope {
        from: rfc.from.iter().map(email_to_address).collect(),
        to: rfc.to.iter().map(email_to_address).collect(),
        cc: rfc.cc.iter().map(email_to_address).collect(),
        bcc: Vec::new(),
        date: rfc.date.map(|dt| DateTime { timestamp: dt.timestamp(), tz_offset_secs: Some(dt.offset().local_minus_utc()) }),
        subject: rfc.subject.clone(),
        message_id: rfc.message_id.as_ref().map(|c| c.to_string()),
    }
}

fn email_to_address(e: &EmailAddress) -> Address {
    Address { display_name: e.display_name.clone(), local_part: e.local_part.clone(), domain: Some(e.domain.clone()) }
}
