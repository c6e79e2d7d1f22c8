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

//! The IMAP session engine: tag-correlated command/response exchange over a framed byte stream,
//! capability tracking, SASL-driven AUTHENTICATE, the selected-mailbox reducer, and command
//! builders for the RFC 3501 core plus the extensions this crate supports (UIDPLUS, CONDSTORE,
//! QRESYNC, ENABLE, IDLE, SORT, MOVE, NAMESPACE, METADATA, ACL, QUOTA, LIST-STATUS, ID,
//! SPECIAL-USE, COMPRESS, LITERAL+/LITERAL-, STARTTLS, XLIST, LISTRIGHTS/MYRIGHTS).

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::sasl::{SaslCredentials, SaslMechanism, SaslNegotiator, SaslStep};

use super::command::{encode_astring, sequence_set, Arg, TagGenerator};
use super::framer::ImapFramer;
use super::response::{parse_line, DataResponse, Response, ResponseCode, Status};
use super::selected_state::{MailboxAccess, SelectedMailbox};
use super::ImapClientError;

/// Outcome of one tagged command: the status, any response codes on the completion line, the
/// human-readable text, and every untagged `Response::Data`/`UntaggedStatus` seen while waiting.
pub struct CommandOutcome {
    pub status: Status,
    pub codes: Vec<ResponseCode>,
    pub text: String,
    pub data: Vec<DataResponse>,
}

impl CommandOutcome {
    fn ok(&self) -> Result<(), ImapClientError> {
        match self.status {
            Status::Ok => Ok(()),
            _ => Err(ImapClientError::CommandFailed {
                tag: String::new(),
                status: format!("{:?}", self.status),
                text: self.text.clone(),
            }),
        }
    }
}

pub struct ImapSession<S> {
    framer: ImapFramer<S>,
    tags: TagGenerator,
    pub capabilities: Vec<String>,
    pub selected: Option<SelectedMailbox>,
    literal_plus: bool,
    pending_idle_tag: Option<String>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ImapSession<S> {
    pub fn new(stream: S) -> Self {
        Self {
            framer: ImapFramer::new(stream),
            tags: TagGenerator::new(),
            capabilities: Vec::new(),
            selected: None,
            literal_plus: false,
            pending_idle_tag: None,
        }
    }

    pub fn into_inner(self) -> S {
        self.framer.into_inner()
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    fn set_capabilities(&mut self, caps: Vec<String>) {
        self.literal_plus = caps.iter().any(|c| c.eq_ignore_ascii_case("LITERAL+"));
        self.capabilities = caps;
    }

    /// Guard for verbs that only make sense against a selected mailbox (FETCH, STORE, COPY,
    /// MOVE, EXPUNGE, SEARCH, SORT).
    fn require_selected(&self) -> Result<(), ImapClientError> {
        if self.selected.is_none() {
            return Err(ImapClientError::NoSelectedMailbox);
        }
        Ok(())
    }

    /// Read the server greeting (`* OK`/`* PREAUTH`/`* BYE`) sent immediately on connect.
    pub async fn read_greeting(&mut self) -> Result<Response, ImapClientError> {
        let line = self.framer.read_line().await?;
        let resp = parse_line(&line)?;
        if let Response::UntaggedStatus { codes, .. } = &resp {
            for code in codes {
                if let ResponseCode::Capability(caps) = code {
                    self.set_capabilities(caps.clone());
                }
            }
        }
        Ok(resp)
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), ImapClientError> {
        self.framer.writer().write_all(bytes).await?;
        self.framer.writer().flush().await?;
        Ok(())
    }

    /// Send a command and collect every untagged response up to (and including) the tagged
    /// completion. `on_untagged` is called for each untagged data response as it arrives, useful
    /// for streaming FETCH/LIST callers; the same data is also returned in `CommandOutcome::data`.
    pub async fn send_command(&mut self, command: &str) -> Result<CommandOutcome, ImapClientError> {
        let tag = self.tags.next();
        let line = format!("{} {}\r\n", tag, command);
        self.write_raw(line.as_bytes()).await?;
        self.read_until_tagged(&tag).await
    }

    /// Send a command whose arguments include literals, which require either a continuation
    /// round-trip (classic) or, when the server advertised LITERAL+, a non-synchronizing `{n+}`
    /// sent inline without waiting for `+`.
    pub async fn send_command_with_args(&mut self, command_word: &str, args: &[Arg]) -> Result<CommandOutcome, ImapClientError> {
        let tag = self.tags.next();
        let mut line = format!("{} {}", tag, command_word);
        for arg in args {
            line.push(' ');
            match arg {
                Arg::Inline(s) => line.push_str(s),
                Arg::Literal(bytes) => {
                    if self.literal_plus {
                        line.push_str(&format!("{{{}+}}\r\n", bytes.len()));
                        self.write_raw(line.as_bytes()).await?;
                        self.write_raw(bytes).await?;
                    } else {
                        line.push_str(&format!("{{{}}}\r\n", bytes.len()));
                        self.write_raw(line.as_bytes()).await?;
                        self.await_continuation().await?;
                        self.write_raw(bytes).await?;
                    }
                    // The literal's payload is followed directly by whatever comes next on the
                    // same logical line (more tokens, or the terminating CRLF below) with no
                    // CRLF in between — only a `{n}`/`{n+}` marker itself ends with one.
                    line = String::new();
                }
            }
        }
        line.push_str("\r\n");
        self.write_raw(line.as_bytes()).await?;
        self.read_until_tagged(&tag).await
    }

    async fn await_continuation(&mut self) -> Result<(), ImapClientError> {
        let line = self.framer.read_line().await?;
        match parse_line(&line)? {
            Response::Continuation { .. } => Ok(()),
            other => Err(ImapClientError::new(format!("expected continuation, got {:?}", other))),
        }
    }

    async fn read_until_tagged(&mut self, tag: &str) -> Result<CommandOutcome, ImapClientError> {
        let mut data = Vec::new();
        loop {
            let raw = self.framer.read_line().await?;
            let resp = parse_line(&raw)?;
            match resp {
                Response::Tagged { tag: t, status, codes, text } if t == tag => {
                    if let Some(sel) = &mut self.selected {
                        sel.apply_codes(&codes);
                    }
                    for code in &codes {
                        if let ResponseCode::Capability(caps) = code {
                            self.set_capabilities(caps.clone());
                        }
                    }
                    return Ok(CommandOutcome { status, codes, text, data });
                }
                Response::Tagged { .. } => {
                    // A response tagged with a different tag than the one we're waiting on would
                    // indicate the pipeline got out of sync; treat as protocol error.
                    return Err(ImapClientError::new("tagged response did not match the command in flight"));
                }
                Response::UntaggedStatus { status, codes, text } => {
                    if let Some(sel) = &mut self.selected {
                        sel.apply_codes(&codes);
                    }
                    for code in &codes {
                        if let ResponseCode::Capability(caps) = code {
                            self.set_capabilities(caps.clone());
                        }
                    }
                    if status == Status::Bye {
                        return Err(ImapClientError::new(format!("server closed connection: {}", text)));
                    }
                }
                Response::Data(d) => {
                    let applied = self.selected.as_mut().map(|sel| sel.apply_data(&d)).unwrap_or(false);
                    let _ = applied;
                    data.push(d);
                }
                Response::Continuation { .. } => {
                    return Err(ImapClientError::new("unexpected continuation outside literal/AUTHENTICATE flow"));
                }
            }
        }
    }

    // ---- Capability / basic commands ----

    pub async fn capability(&mut self) -> Result<Vec<String>, ImapClientError> {
        let outcome = self.send_command("CAPABILITY").await?;
        outcome.ok()?;
        for d in &outcome.data {
            if let DataResponse::Capability(caps) = d {
                self.set_capabilities(caps.clone());
            }
        }
        Ok(self.capabilities.clone())
    }

    pub async fn noop(&mut self) -> Result<(), ImapClientError> {
        self.send_command("NOOP").await?.ok()
    }

    pub async fn enable(&mut self, extensions: &[&str]) -> Result<Vec<String>, ImapClientError> {
        let outcome = self.send_command(&format!("ENABLE {}", extensions.join(" "))).await?;
        outcome.ok()?;
        for d in &outcome.data {
            if let DataResponse::Enabled(exts) = d {
                return Ok(exts.clone());
            }
        }
        Ok(Vec::new())
    }

    pub async fn id(&mut self, fields: &[(&str, &str)]) -> Result<Vec<(String, Option<String>)>, ImapClientError> {
        let payload = if fields.is_empty() {
            "NIL".to_string()
        } else {
            let mut parts = Vec::new();
            for (k, v) in fields {
                parts.push(quoted(k));
                parts.push(quoted(v));
            }
            format!("({})", parts.join(" "))
        };
        let outcome = self.send_command(&format!("ID {}", payload)).await?;
        outcome.ok()?;
        for d in &outcome.data {
            if let DataResponse::Id(entries) = d {
                return Ok(entries.clone());
            }
        }
        Ok(Vec::new())
    }

    pub async fn starttls(&mut self) -> Result<(), ImapClientError> {
        if !self.has_capability("STARTTLS") {
            return Err(ImapClientError::CapabilityMissing("STARTTLS".to_string()));
        }
        self.send_command("STARTTLS").await?.ok()?;
        // Capabilities must be re-queried after the TLS upgrade since a pre-TLS CAPABILITY
        // response is not trustworthy (RFC 3501 §6.2.1).
        self.capabilities.clear();
        Ok(())
    }

    // ---- Authentication ----

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ImapClientError> {
        let cmd = format!("LOGIN {} {}", quoted(username), quoted(password));
        self.send_command(&cmd).await?.ok()
    }

    pub async fn authenticate(&mut self, mechanism: SaslMechanism, creds: SaslCredentials<'_>) -> Result<(), ImapClientError> {
        let mut negotiator = SaslNegotiator::new(mechanism, creds);
        let tag = self.tags.next();
        let initial = negotiator.initial_response()?;
        let mut line = format!("{} AUTHENTICATE {}", tag, mechanism.name());
        if let Some(resp) = &initial {
            line.push(' ');
            line.push_str(&base64_encode(resp));
        }
        line.push_str("\r\n");
        self.write_raw(line.as_bytes()).await?;
        loop {
            let raw = self.framer.read_line().await?;
            match parse_line(&raw)? {
                Response::Continuation { text } => {
                    match negotiator.challenge(&text)? {
                        SaslStep::Respond(bytes) => {
                            let encoded = base64_encode(&bytes);
                            self.write_raw(format!("{}\r\n", encoded).as_bytes()).await?;
                        }
                        SaslStep::Done => {
                            self.write_raw(b"\r\n").await?;
                        }
                    }
                }
                Response::Tagged { tag: t, status, codes, text } if t == tag => {
                    for code in &codes {
                        if let ResponseCode::Capability(caps) = code {
                            self.set_capabilities(caps.clone());
                        }
                    }
                    return match status {
                        Status::Ok => Ok(()),
                        _ => Err(ImapClientError::CommandFailed { tag: t, status: format!("{:?}", status), text }),
                    };
                }
                Response::UntaggedStatus { codes, .. } => {
                    for code in &codes {
                        if let ResponseCode::Capability(caps) = code {
                            self.set_capabilities(caps.clone());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    // ---- Mailbox management ----

    pub async fn select(&mut self, mailbox: &str, read_only: bool) -> Result<(), ImapClientError> {
        let word = if read_only { "EXAMINE" } else { "SELECT" };
        let outcome = self.send_command(&format!("{} {}", word, encode_mailbox_inline(mailbox))).await?;
        let access = if read_only { MailboxAccess::ReadOnly } else { MailboxAccess::ReadWrite };
        let mut sel = SelectedMailbox::new(mailbox.to_string(), access);
        for d in &outcome.data {
            sel.apply_data(d);
        }
        sel.apply_codes(&outcome.codes);
        outcome.ok()?;
        self.selected = Some(sel);
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), ImapClientError> {
        self.send_command("CLOSE").await?.ok()?;
        self.selected = None;
        Ok(())
    }

    pub async fn unselect(&mut self) -> Result<(), ImapClientError> {
        if !self.has_capability("UNSELECT") {
            return Err(ImapClientError::CapabilityMissing("UNSELECT".to_string()));
        }
        self.send_command("UNSELECT").await?.ok()?;
        self.selected = None;
        Ok(())
    }

    pub async fn create_mailbox(&mut self, name: &str) -> Result<(), ImapClientError> {
        self.send_command(&format!("CREATE {}", encode_mailbox_inline(name))).await?.ok()
    }

    pub async fn delete_mailbox(&mut self, name: &str) -> Result<(), ImapClientError> {
        self.send_command(&format!("DELETE {}", encode_mailbox_inline(name))).await?.ok()
    }

    pub async fn rename_mailbox(&mut self, from: &str, to: &str) -> Result<(), ImapClientError> {
        self.send_command(&format!("RENAME {} {}", encode_mailbox_inline(from), encode_mailbox_inline(to))).await?.ok()
    }

    pub async fn subscribe(&mut self, name: &str) -> Result<(), ImapClientError> {
        self.send_command(&format!("SUBSCRIBE {}", encode_mailbox_inline(name))).await?.ok()
    }

    pub async fn unsubscribe(&mut self, name: &str) -> Result<(), ImapClientError> {
        self.send_command(&format!("UNSUBSCRIBE {}", encode_mailbox_inline(name))).await?.ok()
    }

    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<DataResponse>, ImapClientError> {
        let cmd = format!("LIST {} {}", encode_mailbox_inline(reference), encode_mailbox_inline(pattern));
        let outcome = self.send_command(&cmd).await?;
        outcome.ok()?;
        Ok(outcome.data)
    }

    /// `LIST ... RETURN (STATUS (...))` (LIST-STATUS, RFC 5819): one round-trip for folder list
    /// plus STATUS attributes, instead of LIST followed by one STATUS per mailbox.
    pub async fn list_status(&mut self, reference: &str, pattern: &str, status_items: &[&str]) -> Result<Vec<DataResponse>, ImapClientError> {
        if !self.has_capability("LIST-STATUS") {
            return Err(ImapClientError::CapabilityMissing("LIST-STATUS".to_string()));
        }
        let cmd = format!(
            "LIST {} {} RETURN (STATUS ({}))",
            encode_mailbox_inline(reference),
            encode_mailbox_inline(pattern),
            status_items.join(" ")
        );
        let outcome = self.send_command(&cmd).await?;
        outcome.ok()?;
        Ok(outcome.data)
    }

    pub async fn lsub(&mut self, reference: &str, pattern: &str) -> Result<Vec<DataResponse>, ImapClientError> {
        let cmd = format!("LSUB {} {}", encode_mailbox_inline(reference), encode_mailbox_inline(pattern));
        let outcome = self.send_command(&cmd).await?;
        outcome.ok()?;
        Ok(outcome.data)
    }

    /// Legacy Gmail `XLIST` (superseded by `LIST ... RETURN (SPECIAL-USE)` but still offered by
    /// some servers that advertise the `XLIST` capability).
    pub async fn xlist(&mut self, reference: &str, pattern: &str) -> Result<Vec<DataResponse>, ImapClientError> {
        if !self.has_capability("XLIST") {
            return Err(ImapClientError::CapabilityMissing("XLIST".to_string()));
        }
        let cmd = format!("XLIST {} {}", encode_mailbox_inline(reference), encode_mailbox_inline(pattern));
        let outcome = self.send_command(&cmd).await?;
        outcome.ok()?;
        Ok(outcome.data)
    }

    /// `LIST ... RETURN (SPECIAL-USE)` (RFC 6154): restrict results to mailboxes carrying a
    /// `\Drafts`/`\Sent`/`\Junk`/`\Trash`/`\Archive`/`\All`/`\Flagged` attribute, or include it
    /// among any other requested `RETURN` options.
    pub async fn list_special_use(&mut self, reference: &str, pattern: &str) -> Result<Vec<DataResponse>, ImapClientError> {
        if !self.has_capability("SPECIAL-USE") {
            return Err(ImapClientError::CapabilityMissing("SPECIAL-USE".to_string()));
        }
        let cmd = format!(
            "LIST {} {} RETURN (SPECIAL-USE)",
            encode_mailbox_inline(reference),
            encode_mailbox_inline(pattern)
        );
        let outcome = self.send_command(&cmd).await?;
        outcome.ok()?;
        Ok(outcome.data)
    }

    pub async fn status(&mut self, mailbox: &str, items: &[&str]) -> Result<Vec<(String, u64)>, ImapClientError> {
        let cmd = format!("STATUS {} ({})", encode_mailbox_inline(mailbox), items.join(" "));
        let outcome = self.send_command(&cmd).await?;
        outcome.ok()?;
        for d in &outcome.data {
            if let DataResponse::Status { attrs, .. } = d {
                return Ok(attrs.clone());
            }
        }
        Ok(Vec::new())
    }

    pub async fn namespace(&mut self) -> Result<Vec<DataResponse>, ImapClientError> {
        if !self.has_capability("NAMESPACE") {
            return Err(ImapClientError::CapabilityMissing("NAMESPACE".to_string()));
        }
        let outcome = self.send_command("NAMESPACE").await?;
        outcome.ok()?;
        Ok(outcome.data)
    }

    // ---- Message operations ----

    pub async fn fetch(&mut self, sequence: &str, items: &str, by_uid: bool) -> Result<Vec<DataResponse>, ImapClientError> {
        self.require_selected()?;
        let word = if by_uid { "UID FETCH" } else { "FETCH" };
        let outcome = self.send_command(&format!("{} {} {}", word, sequence, items)).await?;
        outcome.ok()?;
        Ok(outcome.data)
    }

    /// Fetch with CONDSTORE's `CHANGEDSINCE` modifier.
    pub async fn fetch_changed_since(&mut self, sequence: &str, items: &str, mod_seq: u64, by_uid: bool) -> Result<Vec<DataResponse>, ImapClientError> {
        self.require_selected()?;
        let word = if by_uid { "UID FETCH" } else { "FETCH" };
        let outcome = self.send_command(&format!("{} {} {} (CHANGEDSINCE {})", word, sequence, items, mod_seq)).await?;
        outcome.ok()?;
        Ok(outcome.data)
    }

    pub async fn store(&mut self, sequence: &str, flag_op: &str, flags: &[String], by_uid: bool) -> Result<Vec<DataResponse>, ImapClientError> {
        self.require_selected()?;
        let word = if by_uid { "UID STORE" } else { "STORE" };
        let outcome = self.send_command(&format!("{} {} {} ({})", word, sequence, flag_op, flags.join(" "))).await?;
        outcome.ok()?;
        Ok(outcome.data)
    }

    pub async fn copy(&mut self, sequence: &str, dest: &str, by_uid: bool) -> Result<Vec<ResponseCode>, ImapClientError> {
        self.require_selected()?;
        let word = if by_uid { "UID COPY" } else { "COPY" };
        let outcome = self.send_command(&format!("{} {} {}", word, sequence, encode_mailbox_inline(dest))).await?;
        outcome.ok()?;
        Ok(outcome.codes)
    }

    pub async fn mv(&mut self, sequence: &str, dest: &str, by_uid: bool) -> Result<Vec<ResponseCode>, ImapClientError> {
        self.require_selected()?;
        if !self.has_capability("MOVE") {
            return Err(ImapClientError::CapabilityMissing("MOVE".to_string()));
        }
        let word = if by_uid { "UID MOVE" } else { "MOVE" };
        let outcome = self.send_command(&format!("{} {} {}", word, sequence, encode_mailbox_inline(dest))).await?;
        outcome.ok()?;
        Ok(outcome.codes)
    }

    pub async fn expunge(&mut self) -> Result<Vec<u32>, ImapClientError> {
        self.require_selected()?;
        let outcome = self.send_command("EXPUNGE").await?;
        outcome.ok()?;
        Ok(outcome.data.into_iter().filter_map(|d| if let DataResponse::Expunge(n) = d { Some(n) } else { None }).collect())
    }

    /// `CHECK`: a hint that the server should perform a housekeeping checkpoint on the selected
    /// mailbox. Purely advisory; any untagged data it emits is applied like any other response.
    pub async fn check(&mut self) -> Result<(), ImapClientError> {
        self.require_selected()?;
        self.send_command("CHECK").await?.ok()
    }

    /// UID EXPUNGE with a UID set (RFC 4315 UIDPLUS), narrowing the expunge to specific messages.
    pub async fn uid_expunge(&mut self, uid_set: &str) -> Result<(), ImapClientError> {
        self.require_selected()?;
        if !self.has_capability("UIDPLUS") {
            return Err(ImapClientError::CapabilityMissing("UIDPLUS".to_string()));
        }
        self.send_command(&format!("UID EXPUNGE {}", uid_set)).await?.ok()
    }

    pub async fn search(&mut self, criteria: &str, by_uid: bool) -> Result<Vec<u32>, ImapClientError> {
        self.require_selected()?;
        let word = if by_uid { "UID SEARCH" } else { "SEARCH" };
        let outcome = self.send_command(&format!("{} {}", word, criteria)).await?;
        outcome.ok()?;
        Ok(outcome.data.into_iter().find_map(|d| if let DataResponse::Search(ids) = d { Some(ids) } else { None }).unwrap_or_default())
    }

    pub async fn sort(&mut self, sort_keys: &str, charset: &str, criteria: &str, by_uid: bool) -> Result<Vec<u32>, ImapClientError> {
        self.require_selected()?;
        if !self.has_capability("SORT") {
            return Err(ImapClientError::CapabilityMissing("SORT".to_string()));
        }
        let word = if by_uid { "UID SORT" } else { "SORT" };
        let outcome = self.send_command(&format!("{} ({}) {} {}", word, sort_keys, charset, criteria)).await?;
        outcome.ok()?;
        Ok(outcome.data.into_iter().find_map(|d| if let DataResponse::Search(ids) = d { Some(ids) } else { None }).unwrap_or_default())
    }

    pub async fn append(&mut self, mailbox: &str, flags: &[String], message: &[u8]) -> Result<Option<(u32, u32)>, ImapClientError> {
        let mut args = vec![Arg::Inline(encode_mailbox_inline(mailbox))];
        if !flags.is_empty() {
            args.push(Arg::Inline(format!("({})", flags.join(" "))));
        }
        args.push(Arg::Literal(message.to_vec()));
        let outcome = self.send_command_with_args("APPEND", &args).await?;
        outcome.ok()?;
        for code in &outcome.codes {
            if let ResponseCode::AppendUid { uid_validity, uid } = code {
                return Ok(Some((*uid_validity, *uid)));
            }
        }
        Ok(None)
    }

    // ---- IDLE ----

    /// Send `IDLE` and wait for the `+` continuation; returns a guard that must be given every
    /// line observed until `stop` is called to send `DONE`.
    pub async fn idle_start(&mut self) -> Result<(), ImapClientError> {
        if !self.has_capability("IDLE") {
            return Err(ImapClientError::CapabilityMissing("IDLE".to_string()));
        }
        let tag = self.tags.next();
        self.write_raw(format!("{} IDLE\r\n", tag).as_bytes()).await?;
        self.await_continuation().await?;
        self.pending_idle_tag = Some(tag);
        Ok(())
    }

    /// Read one event while idling (an untagged mailbox-state response).
    pub async fn idle_next_event(&mut self) -> Result<DataResponse, ImapClientError> {
        loop {
            let raw = self.framer.read_line().await?;
            match parse_line(&raw)? {
                Response::Data(d) => {
                    if let Some(sel) = &mut self.selected {
                        sel.apply_data(&d);
                    }
                    return Ok(d);
                }
                Response::UntaggedStatus { status, text, .. } if status == Status::Bye => {
                    return Err(ImapClientError::new(format!("server closed connection during IDLE: {}", text)));
                }
                _ => {}
            }
        }
    }

    pub async fn idle_stop(&mut self) -> Result<(), ImapClientError> {
        let tag = self.pending_idle_tag.take().ok_or_else(|| ImapClientError::invalid_state("IDLE not in progress"))?;
        self.write_raw(b"DONE\r\n").await?;
        loop {
            let raw = self.framer.read_line().await?;
            match parse_line(&raw)? {
                Response::Tagged { tag: t, status, .. } if t == tag => {
                    return match status {
                        Status::Ok => Ok(()),
                        other => Err(ImapClientError::new(format!("IDLE did not complete OK: {:?}", other))),
                    };
                }
                Response::Data(d) => {
                    if let Some(sel) = &mut self.selected {
                        sel.apply_data(&d);
                    }
                }
                _ => {}
            }
        }
    }

    /// `NOTIFY` (RFC 5465): registers server-push event filters so IDLE-like updates can be
    /// scoped to particular mailboxes/event classes. `spec` is the already-formatted
    /// `(event-set event-types...)` argument list; event-set/type grammar is a caller concern.
    pub async fn notify(&mut self, spec: &str) -> Result<(), ImapClientError> {
        if !self.has_capability("NOTIFY") {
            return Err(ImapClientError::CapabilityMissing("NOTIFY".to_string()));
        }
        self.send_command(&format!("NOTIFY {}", spec)).await?.ok()
    }

    // ---- COMPRESS ----

    pub async fn compress_deflate(&mut self) -> Result<(), ImapClientError> {
        if !self.has_capability("COMPRESS=DEFLATE") {
            return Err(ImapClientError::CapabilityMissing("COMPRESS=DEFLATE".to_string()));
        }
        self.send_command("COMPRESS DEFLATE").await?.ok()
        // Wiring a DEFLATE-wrapped stream in place of `self.framer`'s reader/writer is left to
        // the caller: it owns the raw stream and can rebuild an `ImapSession` around a deflate
        // adapter after this completes, since `ImapSession` is generic over the stream type.
    }

    // ---- ACL / METADATA / QUOTA ----

    pub async fn set_acl(&mut self, mailbox: &str, identifier: &str, rights: &str) -> Result<(), ImapClientError> {
        if !self.has_capability("ACL") {
            return Err(ImapClientError::CapabilityMissing("ACL".to_string()));
        }
        self.send_command(&format!("SETACL {} {} {}", encode_mailbox_inline(mailbox), quoted(identifier), quoted(rights))).await?.ok()
    }

    pub async fn delete_acl(&mut self, mailbox: &str, identifier: &str) -> Result<(), ImapClientError> {
        self.send_command(&format!("DELETEACL {} {}", encode_mailbox_inline(mailbox), quoted(identifier))).await?.ok()
    }

    pub async fn get_acl(&mut self, mailbox: &str) -> Result<Vec<(String, String)>, ImapClientError> {
        let outcome = self.send_command(&format!("GETACL {}", encode_mailbox_inline(mailbox))).await?;
        outcome.ok()?;
        Ok(outcome.data.into_iter().find_map(|d| if let DataResponse::Acl { entries, .. } = d { Some(entries) } else { None }).unwrap_or_default())
    }

    /// `LISTRIGHTS`: the rights a given identifier always has on a mailbox, plus the rights that
    /// may optionally be granted, as a single server-defined rights string list.
    pub async fn list_rights(&mut self, mailbox: &str, identifier: &str) -> Result<Vec<String>, ImapClientError> {
        if !self.has_capability("ACL") {
            return Err(ImapClientError::CapabilityMissing("ACL".to_string()));
        }
        let outcome = self.send_command(&format!("LISTRIGHTS {} {}", encode_mailbox_inline(mailbox), quoted(identifier))).await?;
        outcome.ok()?;
        Ok(outcome
            .data
            .into_iter()
            .find_map(|d| if let DataResponse::ListRights { rights, .. } = d { Some(rights) } else { None })
            .unwrap_or_default())
    }

    /// `MYRIGHTS`: the rights the authenticated user holds on a mailbox.
    pub async fn my_rights(&mut self, mailbox: &str) -> Result<String, ImapClientError> {
        if !self.has_capability("ACL") {
            return Err(ImapClientError::CapabilityMissing("ACL".to_string()));
        }
        let outcome = self.send_command(&format!("MYRIGHTS {}", encode_mailbox_inline(mailbox))).await?;
        outcome.ok()?;
        Ok(outcome
            .data
            .into_iter()
            .find_map(|d| if let DataResponse::MyRights { rights, .. } = d { Some(rights) } else { None })
            .unwrap_or_default())
    }

    pub async fn get_metadata(&mut self, mailbox: &str, entries: &[&str]) -> Result<Vec<(String, Option<Vec<u8>>)>, ImapClientError> {
        if !self.has_capability("METADATA") {
            return Err(ImapClientError::CapabilityMissing("METADATA".to_string()));
        }
        let cmd = format!("GETMETADATA {} ({})", encode_mailbox_inline(mailbox), entries.join(" "));
        let outcome = self.send_command(&cmd).await?;
        outcome.ok()?;
        Ok(outcome.data.into_iter().find_map(|d| if let DataResponse::Metadata { entries, .. } = d { Some(entries) } else { None }).unwrap_or_default())
    }

    pub async fn set_metadata(&mut self, mailbox: &str, entry: &str, value: Option<&[u8]>) -> Result<(), ImapClientError> {
        let args = match value {
            None => vec![Arg::Inline(encode_mailbox_inline(mailbox)), Arg::Inline(format!("({} NIL)", quoted(entry)))],
            Some(bytes) => match encode_astring(&String::from_utf8_lossy(bytes)) {
                Arg::Inline(s) => vec![Arg::Inline(encode_mailbox_inline(mailbox)), Arg::Inline(format!("({} {})", quoted(entry), s))],
                Arg::Literal(b) => vec![
                    Arg::Inline(encode_mailbox_inline(mailbox)),
                    Arg::Inline(format!("({}", quoted(entry))),
                    Arg::Literal(b),
                    Arg::Inline(")".to_string()),
                ],
            },
        };
        self.send_command_with_args("SETMETADATA", &args).await?.ok()
    }

    pub async fn get_quota(&mut self, root: &str) -> Result<Vec<(String, u64, u64)>, ImapClientError> {
        if !self.has_capability("QUOTA") {
            return Err(ImapClientError::CapabilityMissing("QUOTA".to_string()));
        }
        let outcome = self.send_command(&format!("GETQUOTA {}", quoted(root))).await?;
        outcome.ok()?;
        Ok(outcome.data.into_iter().find_map(|d| if let DataResponse::Quota { resources, .. } = d { Some(resources) } else { None }).unwrap_or_default())
    }

    pub async fn get_quota_root(&mut self, mailbox: &str) -> Result<Vec<String>, ImapClientError> {
        let outcome = self.send_command(&format!("GETQUOTAROOT {}", encode_mailbox_inline(mailbox))).await?;
        outcome.ok()?;
        Ok(outcome.data.into_iter().find_map(|d| if let DataResponse::QuotaRoot { roots, .. } = d { Some(roots) } else { None }).unwrap_or_default())
    }

    pub async fn logout(&mut self) -> Result<(), ImapClientError> {
        let outcome = self.send_command("LOGOUT").await?;
        outcome.ok()
    }
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn encode_mailbox_inline(name: &str) -> String {
    match encode_astring(name) {
        Arg::Inline(s) => s,
        // Mailbox names needing a literal are rare (embedded quote/backslash); fall back to a
        // best-effort quoted form here since the simple command-building helpers above don't
        // thread literal continuations through. Callers with such names should use
        // `send_command_with_args` directly.
        Arg::Literal(bytes) => quoted(&String::from_utf8_lossy(&bytes)),
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn reads_greeting_and_capability() {
        let (mut client, server) = duplex(4096);
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client.write_all(b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n").await.unwrap();
        });
        let mut session = ImapSession::new(server);
        session.read_greeting().await.unwrap();
        assert!(session.has_capability("IDLE"));
    }

    #[tokio::test]
    async fn select_updates_state_from_untagged_and_codes() {
        let (mut client, server) = duplex(8192);
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let mut buf = [0u8; 256];
            let n = client.read(&mut buf).await.unwrap();
            let sent = String::from_utf8_lossy(&buf[..n]);
            assert!(sent.contains("SELECT INBOX"));
            let tag = sent.split_whitespace().next().unwrap().to_string();
            client
                .write_all(
                    format!(
                        "* 10 EXISTS\r\n* 2 RECENT\r\n* FLAGS (\\Seen \\Answered)\r\n{} OK [UIDVALIDITY 99 UIDNEXT 11 READ-WRITE] SELECT completed\r\n",
                        tag
                    )
                    .as_bytes(),
                )
                .await
                .unwrap();
        });
        let mut session = ImapSession::new(server);
        session.select("INBOX", false).await.unwrap();
        let sel = session.selected.as_ref().unwrap();
        assert_eq!(sel.exists, 10);
        assert_eq!(sel.recent, 2);
        assert_eq!(sel.uid_validity, Some(99));
        assert_eq!(sel.uid_next, Some(11));
    }

    #[tokio::test]
    async fn my_rights_and_list_rights_round_trip() {
        let (mut client, server) = duplex(8192);
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let mut buf = [0u8; 256];
            let n = client.read(&mut buf).await.unwrap();
            let tag = String::from_utf8_lossy(&buf[..n]).split_whitespace().next().unwrap().to_string();
            client
                .write_all(format!("* MYRIGHTS INBOX lrswipkxtecda\r\n{} OK MYRIGHTS completed\r\n", tag).as_bytes())
                .await
                .unwrap();

            let n = client.read(&mut buf).await.unwrap();
            let tag = String::from_utf8_lossy(&buf[..n]).split_whitespace().next().unwrap().to_string();
            client
                .write_all(format!("* LISTRIGHTS INBOX alice la r s\r\n{} OK LISTRIGHTS completed\r\n", tag).as_bytes())
                .await
                .unwrap();
        });
        let mut session = ImapSession::new(server);
        session.set_capabilities(vec!["ACL".to_string()]);
        let rights = session.my_rights("INBOX").await.unwrap();
        assert_eq!(rights, "lrswipkxtecda");
        let listed = session.list_rights("INBOX", "alice").await.unwrap();
        assert_eq!(listed, vec!["la".to_string(), "r".to_string(), "s".to_string()]);
    }
}
