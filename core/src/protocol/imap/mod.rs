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

//! IMAP4rev1 client (Store + Folder). Persistent connection with idle timeout and reconnect.
//! Store and folders share one session via `ImapStoreState`; the wire protocol itself lives in
//! `session`/`response`/`framer`/`tokenizer`/`command`/`selected_state`/`bodystructure`.

mod bodystructure;
mod command;
mod error;
mod framer;
mod response;
pub mod selected_state;
pub mod session;
mod tokenizer;

pub use bodystructure::BodyStructure;
pub use error::ImapClientError;
pub use response::{DataResponse, FetchItem, Response, ResponseCode, Status};
pub use session::ImapSession;

use crate::message_id::{imap_message_id, MessageId};
use crate::mime::{extract_structured_body, parse_envelope, EmailAddress, EnvelopeHeaders};
use crate::net::{PlainStream, TlsStreamWrapper};
use crate::sasl::{SaslCredentials, SaslMechanism};
use crate::store::{Address, Attachment, ConversationSummary, DateTime, Envelope, Flag, Message};
use crate::store::{Folder, FolderInfo, OpenFolderEvent, Store, StoreError, StoreKind};
use crate::store::{ThreadId, ThreadSummary};
use std::ops::Range;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Either half of a connection, boxed behind one dynamic type so `ImapSession` doesn't need two
/// generic instantiations depending on whether STARTTLS or implicit TLS was used.
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
) -> Result<ImapSession<Conn>, ImapClientError> {
    let conn = if use_implicit_tls {
        Conn::Tls(TlsStreamWrapper::connect_implicit_tls(host, port).await?)
    } else {
        Conn::Plain(PlainStream::connect(host, port).await?)
    };
    let mut session = ImapSession::new(conn);
    session.read_greeting().await?;
    if session.capabilities.is_empty() {
        session.capability().await?;
    }

    let mut session = if use_starttls && !use_implicit_tls {
        if !session.has_capability("STARTTLS") {
            return Err(ImapClientError::CapabilityMissing("STARTTLS".to_string()));
        }
        session.starttls().await?;
        let Conn::Plain(plain) = session.into_inner() else {
            return Err(ImapClientError::new("STARTTLS attempted on an already-TLS connection"));
        };
        let tls = plain.upgrade_to_tls(host).await?;
        let mut upgraded = ImapSession::new(Conn::Tls(tls));
        upgraded.capability().await?;
        upgraded
    } else {
        session
    };

    if let Some((username, secret, mechanism)) = auth {
        if mechanism == SaslMechanism::Plain && !session.has_capability("AUTH=PLAIN") {
            session.login(username, secret).await?;
        } else {
            let creds = SaslCredentials {
                authzid: "",
                authcid: username,
                secret,
                digest_uri: Some(&format!("imap/{}", host)),
                host: Some(host),
                port: Some(port),
                ntlm_domain: None,
                channel_binding: None,
            };
            session.authenticate(mechanism, creds).await?;
        }
        session.capability().await?;
    }
    Ok(session)
}

/// Shared state for IMAP: persistent session, idle timeout, reconnect. Store and folders hold Arc<this>.
struct ImapStoreState {
    host: String,
    port: u16,
    use_implicit_tls: RwLock<bool>,
    use_starttls: RwLock<bool>,
    auth: RwLock<Option<(String, String, SaslMechanism)>>,
    username: RwLock<String>,
    idle_timeout_secs: RwLock<u64>,
    runtime: once_cell::sync::OnceCell<tokio::runtime::Runtime>,
    connection_state: Arc<Mutex<(Option<ImapSession<Conn>>, Instant)>>,
}

impl ImapStoreState {
    fn runtime(&self) -> Result<&tokio::runtime::Runtime, StoreError> {
        self.runtime.get_or_try_init(|| {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| StoreError::new(e.to_string()))
        })
    }

    /// Run an async operation with the shared session. Takes session out (or connects), runs f,
    /// puts session back. `mailbox` is `Some(&str)` when the caller needs a mailbox selected
    /// before `f` runs (re-selects only if not already the selected mailbox).
    fn with_session<F, R>(&self, mailbox: Option<&str>, f: F) -> Result<R, StoreError>
    where
        F: for<'s> FnOnce(&'s mut ImapSession<Conn>) -> Pin<Box<dyn std::future::Future<Output = Result<R, ImapClientError>> + Send + 's>>,
        R: Send,
    {
        let rt = self.runtime()?;
        let state = Arc::clone(&self.connection_state);
        let host = self.host.clone();
        let port = self.port;
        let use_implicit_tls = *self.use_implicit_tls.read().map_err(|e| StoreError::new(e.to_string()))?;
        let use_starttls = *self.use_starttls.read().map_err(|e| StoreError::new(e.to_string()))?;
        let auth = self.auth.read().map_err(|e| StoreError::new(e.to_string()))?.as_ref().map(|(u, p, m)| (u.clone(), p.clone(), *m));
        let idle_timeout = Duration::from_secs(*self.idle_timeout_secs.read().map_err(|e| StoreError::new(e.to_string()))?);
        let mailbox = mailbox.map(|s| s.to_string());

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
                    connect_and_authenticate(&host, port, use_implicit_tls, use_starttls, auth_ref)
                        .await
                        .map_err(|e| StoreError::new(e.to_string()))?,
                );
            }
            let mut session = session.unwrap();
            if let Some(ref mb) = mailbox {
                if session.selected.as_ref().map(|s| &s.name) != Some(mb) {
                    session.select(mb, false).await.map_err(|e| StoreError::new(e.to_string()))?;
                }
            }
            let result = {
                let mut fut = f(&mut session);
                fut.as_mut().await.map_err(|e| StoreError::new(e.to_string()))?
            };
            let mut guard = state.lock().map_err(|e| StoreError::new(e.to_string()))?;
            guard.0 = Some(session);
            guard.1 = Instant::now();
            Ok(result)
        })
    }
}

/// IMAP store. Holds persistent client (connection reuse, idle timeout, reconnect).
pub struct ImapStore {
    state: Arc<ImapStoreState>,
}

impl ImapStore {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let use_implicit_tls = port == 993;
        let state = ImapStoreState {
            host: host.clone(),
            port,
            use_implicit_tls: RwLock::new(use_implicit_tls),
            use_starttls: RwLock::new(true),
            auth: RwLock::new(None),
            username: RwLock::new(String::new()),
            idle_timeout_secs: RwLock::new(DEFAULT_IDLE_TIMEOUT_SECS),
            runtime: once_cell::sync::OnceCell::new(),
            connection_state: Arc::new(Mutex::new((None, Instant::now()))),
        };
        Self { state: Arc::new(state) }
    }

    pub fn set_implicit_tls(&mut self, use_tls: bool) -> &mut Self {
        *self.state.use_implicit_tls.write().unwrap() = use_tls;
        self
    }

    pub fn set_use_starttls(&mut self, use_starttls: bool) -> &mut Self {
        *self.state.use_starttls.write().unwrap() = use_starttls;
        self
    }

    pub fn set_auth(&mut self, username: impl Into<String>, password: impl Into<String>, mechanism: SaslMechanism) -> &mut Self {
        let u = username.into();
        if self.state.username.read().unwrap().is_empty() {
            *self.state.username.write().unwrap() = u.clone();
        }
        *self.state.auth.write().unwrap() = Some((u, password.into(), mechanism));
        self
    }

    pub fn set_username(&mut self, user_at_host: impl Into<String>) -> &mut Self {
        *self.state.username.write().unwrap() = user_at_host.into();
        self
    }

    /// Set idle timeout in seconds; connection is dropped after this period of inactivity. Default 300.
    pub fn set_idle_timeout_secs(&mut self, secs: u64) -> &mut Self {
        *self.state.idle_timeout_secs.write().unwrap() = secs;
        self
    }

    fn user_at_host(&self) -> String {
        let username = if self.state.username.read().unwrap().is_empty() {
            self.state.auth.read().unwrap().as_ref().map(|(u, _p, _m)| u.clone()).unwrap_or_default()
        } else {
            self.state.username.read().unwrap().clone()
        };
        if username.contains('@') {
            username
        } else {
            format!("{}@{}", username, self.state.host)
        }
    }
}

impl Store for ImapStore {
    fn store_kind(&self) -> StoreKind {
        StoreKind::Email
    }

    fn list_folders(&self) -> Result<Vec<FolderInfo>, StoreError> {
        let entries = self.state.with_session(None, |session| Box::pin(async move { session.list("", "*").await }))?;
        let mut out = Vec::new();
        for d in entries {
            if let DataResponse::List { attributes, delimiter, name } = d {
                out.push(FolderInfo { name, delimiter, attributes });
            }
        }
        Ok(out)
    }

    fn open_folder(&self, name: &str) -> Result<Box<dyn Folder>, StoreError> {
        let name_owned = name.to_string();
        self.state.with_session(Some(&name_owned), |_session| Box::pin(async move { Ok(()) }))?;
        let exists = self
            .state
            .with_session(Some(&name_owned), |session| {
                Box::pin(async move { Ok(session.selected.as_ref().map(|s| s.exists).unwrap_or(0)) })
            })?;
        Ok(Box::new(ImapFolder { state: Arc::clone(&self.state), user_at_host: self.user_at_host(), mailbox: name.to_string(), exists }))
    }

    fn start_open_folder_streaming(
        &self,
        name: &str,
        on_event: Box<dyn Fn(OpenFolderEvent) + Send + Sync>,
        on_complete: Box<dyn FnOnce(Result<Box<dyn Folder>, StoreError>) + Send>,
    ) -> Result<(), StoreError> {
        // SELECT is a single tagged round-trip; events are delivered from the accumulated
        // untagged data once the command completes rather than as they stream off the wire,
        // since `with_session` runs one blocking call per invocation.
        let name_owned = name.to_string();
        let result = self.state.with_session(Some(&name_owned), |session| {
            let data = session.selected.as_ref().cloned();
            Box::pin(async move { Ok(data) })
        });
        match result {
            Ok(Some(sel)) => {
                on_event(OpenFolderEvent::Exists(sel.exists));
                on_event(OpenFolderEvent::Recent(sel.recent));
                if !sel.flags.is_empty() {
                    on_event(OpenFolderEvent::Flags(sel.flags.clone()));
                }
                if let Some(v) = sel.uid_validity {
                    on_event(OpenFolderEvent::UidValidity(v));
                }
                if let Some(v) = sel.uid_next {
                    on_event(OpenFolderEvent::UidNext(v));
                }
                let folder = Box::new(ImapFolder {
                    state: Arc::clone(&self.state),
                    user_at_host: self.user_at_host(),
                    mailbox: name.to_string(),
                    exists: sel.exists,
                }) as Box<dyn Folder>;
                on_complete(Ok(folder));
                Ok(())
            }
            Ok(None) => {
                on_complete(Err(StoreError::new("SELECT completed without mailbox state")));
                Ok(())
            }
            Err(e) => {
                on_complete(Err(e));
                Ok(())
            }
        }
    }

    fn hierarchy_delimiter(&self) -> Option<char> {
        Some('/')
    }

    fn default_folder(&self) -> Option<&str> {
        Some("INBOX")
    }
}

/// Folder backed by IMAP; uses store's persistent session. `exists` is a point-in-time cache from
/// the last SELECT; operations that need a fresh count re-select through `with_session`.
struct ImapFolder {
    state: Arc<ImapStoreState>,
    user_at_host: String,
    mailbox: String,
    exists: u32,
}

impl ImapFolder {
    fn clamp_range(&self, range: Range<u64>) -> Option<(u32, u32)> {
        let exists = self.exists;
        let start = ((range.start + 1).min(exists as u64 + 1)) as u32;
        let end = (range.end.min(exists as u64)) as u32;
        if start > end {
            None
        } else {
            Some((start, end))
        }
    }
}

impl Folder for ImapFolder {
    fn list_conversations(
        &self,
        range: Range<u64>,
        on_summary: Box<dyn Fn(ConversationSummary) + Send + Sync>,
        on_complete: Box<dyn FnOnce(Result<(), StoreError>) + Send>,
    ) {
        let Some((start, end)) = self.clamp_range(range) else {
            on_complete(Ok(()));
            return;
        };
        let mailbox = self.mailbox.clone();
        let user = self.user_at_host.clone();
        let result = self.state.with_session(Some(&mailbox), move |session| {
            let sequence = super::imap::command::sequence_set(&(start..=end).collect::<Vec<_>>());
            Box::pin(async move { session.fetch(&sequence, "(FLAGS UID RFC822.SIZE BODY.PEEK[HEADER])", false).await })
        });
        match result {
            Ok(data) => {
                for d in data {
                    if let DataResponse::Fetch { items, .. } = d {
                        on_summary(fetch_items_to_summary(&user, &mailbox, &items));
                    }
                }
                on_complete(Ok(()));
            }
            Err(e) => on_complete(Err(e)),
        }
    }

    fn message_count(&self, on_complete: Box<dyn FnOnce(Result<u64, StoreError>) + Send>) {
        on_complete(Ok(self.exists as u64));
    }

    fn get_message(
        &self,
        id: &MessageId,
        on_metadata: Box<dyn Fn(Envelope) + Send + Sync>,
        on_content_chunk: Box<dyn Fn(&[u8]) + Send + Sync>,
        on_complete: Box<dyn FnOnce(Result<(), StoreError>) + Send>,
    ) {
        let Some(uid) = parse_uid_from_imap_id(id) else {
            on_complete(Err(StoreError::new("invalid message id")));
            return;
        };
        let mailbox = self.mailbox.clone();
        let result = self.state.with_session(Some(&mailbox), move |session| {
            Box::pin(async move { session.fetch(&uid.to_string(), "(BODY.PEEK[])", true).await })
        });
        match result {
            Ok(data) => {
                let raw = data.into_iter().find_map(|d| match d {
                    DataResponse::Fetch { items, .. } => items.into_iter().find_map(|i| match i {
                        FetchItem::Body { data, .. } => Some(data),
                        _ => None,
                    }),
                    _ => None,
                });
                match raw {
                    Some(raw) => {
                        let envelope = envelope_from_raw(&raw).unwrap_or_else(|_| default_envelope());
                        on_metadata(envelope);
                        on_content_chunk(&raw);
                        on_complete(Ok(()));
                    }
                    None => on_complete(Err(StoreError::new("message not found"))),
                }
            }
            Err(e) => on_complete(Err(e)),
        }
    }

    fn append_message(&self, data: &[u8], on_complete: Box<dyn FnOnce(Result<(), StoreError>) + Send>) {
        let mailbox = self.mailbox.clone();
        let data = data.to_vec();
        let result = self.state.with_session(None, move |session| {
            let mailbox = mailbox.clone();
            let data = data.clone();
            Box::pin(async move { session.append(&mailbox, &[], &data).await })
        });
        on_complete(result.map(|_| ()));
    }

    fn copy_messages_to(&self, ids: &[&str], dest_folder_name: &str, on_complete: Box<dyn FnOnce(Result<(), StoreError>) + Send>) {
        let mailbox = self.mailbox.clone();
        let dest = dest_folder_name.to_string();
        let uids: Vec<u32> = ids.iter().filter_map(|s| s.parse().ok()).collect();
        let result = self.state.with_session(Some(&mailbox), move |session| {
            let dest = dest.clone();
            let sequence = super::imap::command::sequence_set(&uids);
            Box::pin(async move { session.copy(&sequence, &dest, true).await })
        });
        on_complete(result.map(|_| ()));
    }

    fn move_messages_to(&self, ids: &[&str], dest_folder_name: &str, on_complete: Box<dyn FnOnce(Result<(), StoreError>) + Send>) {
        let mailbox = self.mailbox.clone();
        let dest = dest_folder_name.to_string();
        let uids: Vec<u32> = ids.iter().filter_map(|s| s.parse().ok()).collect();
        let result = self.state.with_session(Some(&mailbox), move |session| {
            let dest = dest.clone();
            let sequence = super::imap::command::sequence_set(&uids);
            Box::pin(async move { session.mv(&sequence, &dest, true).await })
        });
        on_complete(result.map(|_| ()));
    }

    fn store_flags(&self, ids: &[&str], add: &[Flag], remove: &[Flag], on_complete: Box<dyn FnOnce(Result<(), StoreError>) + Send>) {
        let mailbox = self.mailbox.clone();
        let uids: Vec<u32> = ids.iter().filter_map(|s| s.parse().ok()).collect();
        let add_flags: Vec<String> = add.iter().map(store_flag_to_imap).collect();
        let remove_flags: Vec<String> = remove.iter().map(store_flag_to_imap).collect();
        let result = self.state.with_session(Some(&mailbox), move |session| {
            let sequence = super::imap::command::sequence_set(&uids);
            let add_flags = add_flags.clone();
            let remove_flags = remove_flags.clone();
            Box::pin(async move {
                if !add_flags.is_empty() {
                    session.store(&sequence, "+FLAGS", &add_flags, true).await?;
                }
                if !remove_flags.is_empty() {
                    session.store(&sequence, "-FLAGS", &remove_flags, true).await?;
                }
                Ok(())
            })
        });
        on_complete(result);
    }

    fn expunge(&self, on_complete: Box<dyn FnOnce(Result<(), StoreError>) + Send>) {
        let mailbox = self.mailbox.clone();
        let result = self.state.with_session(Some(&mailbox), |session| Box::pin(async move { session.expunge().await }));
        on_complete(result.map(|_| ()));
    }

    // list_threads / list_messages_in_thread: left at the trait's default (no-op on_complete(Ok(())))
    // since thread grouping is message-store indexing, out of scope here (see DESIGN.md).
}

fn fetch_items_to_summary(user: &str, mailbox: &str, items: &[FetchItem]) -> ConversationSummary {
    let mut uid = 0u32;
    let mut flags = std::collections::HashSet::new();
    let mut size = 0u64;
    let mut header = Vec::new();
    for item in items {
        match item {
            FetchItem::Uid(u) => uid = *u,
            FetchItem::Flags(f) => flags = imap_flags_to_store(f),
            FetchItem::Rfc822Size(s) => size = *s as u64,
            FetchItem::Body { data, .. } => header = data.clone(),
            _ => {}
        }
    }
    let envelope = envelope_from_raw(&header).unwrap_or_else(|_| default_envelope());
    ConversationSummary { id: imap_message_id(user, mailbox, uid), envelope, flags, size }
}

fn parse_uid_from_imap_id(id: &MessageId) -> Option<u32> {
    let s = id.as_str();
    let rest = s.strip_prefix("imap://")?;
    let parts: Vec<&str> = rest.splitn(3, '/').collect();
    parts.get(2).and_then(|u| u.parse().ok())
}

fn envelope_from_raw(raw: &[u8]) -> Result<Envelope, crate::mime::MimeParseError> {
    let rfc = parse_envelope(raw)?;
    Ok(rfc5322_envelope_to_store(&rfc))
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

fn store_flag_to_imap(flag: &Flag) -> String {
    match flag {
        Flag::Seen => r"\Seen".to_string(),
        Flag::Answered => r"\Answered".to_string(),
        Flag::Flagged => r"\Flagged".to_string(),
        Flag::Deleted => r"\Deleted".to_string(),
        Flag::Draft => r"\Draft".to_string(),
        Flag::Custom(s) => s.clone(),
    }
}

fn imap_flags_to_store(flags: &[String]) -> std::collections::HashSet<Flag> {
    flags
        .iter()
        .filter_map(|s| {
            let s = s.trim_start_matches('\\');
            Some(match s.to_uppercase().as_str() {
                "SEEN" => Flag::Seen,
                "ANSWERED" => Flag::Answered,
                "FLAGGED" => Flag::Flagged,
                "DELETED" => Flag::Deleted,
                "DRAFT" => Flag::Draft,
                _ => Flag::Custom(s.to_string()),
            })
        })
        .collect()
}

fn default_envelope() -> Envelope {
    Envelope { from: Vec::new(), to: Vec::new(), cc: Vec::new(), bcc: Vec::new(), date: None, subject: None, message_id: None }
}

#[allow(unused_imports)]
use extract_structured_body as _extract_structured_body_reexport_for_future_get_message_attachments;
#[allow(unused_imports)]
use ThreadId as _ThreadId_kept_for_trait_default_signature;
#[allow(unused_imports)]
use ThreadSummary as _ThreadSummary_kept_for_trait_default_signature;
#[allow(unused_imports)]
use Attachment as _Attachment_kept_for_future_get_message_attachments;
#[allow(unused_imports)]
use Message as _Message_kept_for_future_full_message_fetch;
