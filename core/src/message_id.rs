/*
 * message_id.rs
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

//! Stable message identifier (opaque + URI form). Keyed by Store/Folder; not folder index or Message-ID header.

use std::fmt;

/// Opaque stable message id. Unique within a folder (or store). URI form for parsing/cross-reference.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(uri_or_opaque: impl Into<String>) -> Self {
        Self(uri_or_opaque.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Build MessageId for IMAP (uid + mailbox + host).
pub fn imap_message_id(user_at_host: &str, mailbox_name: &str, uid: u32) -> MessageId {
    MessageId::new(format!("imap://{}/{}/{}", user_at_host, mailbox_name, uid))
}

/// Build MessageId for POP3 (uidl).
pub fn pop3_message_id(user_at_host: &str, uidl: &str) -> MessageId {
    MessageId::new(format!("pop3://{}/{}", user_at_host, uidl))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_uri_roundtrip_imap() {
        let id = imap_message_id("user@host", "INBOX", 42);
        let s = id.as_str();
        assert!(s.starts_with("imap://"));
        assert!(s.contains("/INBOX/42"));
        let id2 = MessageId::new(s);
        assert_eq!(id.as_str(), id2.as_str());
    }

    #[test]
    fn message_id_uri_roundtrip_pop3() {
        let id = pop3_message_id("user@host", "UIDL123");
        let s = id.as_str();
        assert!(s.starts_with("pop3://"));
        let id2 = MessageId::new(s);
        assert_eq!(id.as_str(), id2.as_str());
    }
}
