/*
 * selected_state.rs
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

//! Reduces untagged data responses against the currently selected mailbox's state: message
//! count, recent count, flags, UIDVALIDITY/UIDNEXT, CONDSTORE's HIGHESTMODSEQ, and the UID/
//! sequence-number correspondence that EXPUNGE, FETCH and QRESYNC's VANISHED all mutate. A
//! session holds one `SelectedMailbox` between SELECT/EXAMINE and the next CLOSE/SELECT/logout.

use std::collections::{BTreeSet, HashMap};

use super::response::{DataResponse, FetchItem, ResponseCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxAccess {
    ReadWrite,
    ReadOnly,
}

/// A message identity that survives only as long as its UIDVALIDITY does. Two messages in
/// different mailbox generations can share a `uid` without being the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniqueId {
    pub validity: u32,
    pub uid: u32,
}

/// UIDs added to or removed from the mailbox since the delta was last taken. Populated by
/// FETCH (UID appears for the first time), EXPUNGE, and VANISHED.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxDelta {
    pub added_uids: Vec<u32>,
    pub removed_uids: Vec<u32>,
}

impl MailboxDelta {
    fn is_empty(&self) -> bool {
        self.added_uids.is_empty() && self.removed_uids.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SelectedMailbox {
    pub name: String,
    pub access: MailboxAccess,
    pub exists: u32,
    pub recent: u32,
    pub flags: Vec<String>,
    pub permanent_flags: Vec<String>,
    pub uid_validity: Option<u32>,
    pub uid_next: Option<u32>,
    pub highest_mod_seq: Option<u64>,
    /// Sequence numbers expunged since the mailbox was opened (server-number renumbering applies
    /// only going forward from the point the event was received, per RFC 3501 §7.4.1).
    pub expunged_this_session: Vec<u32>,
    uid_by_seq: HashMap<u32, u32>,
    seq_by_uid: HashMap<u32, u32>,
    uid_set: BTreeSet<u32>,
    delta: MailboxDelta,
}

impl SelectedMailbox {
    pub fn new(name: String, access: MailboxAccess) -> Self {
        Self {
            name,
            access,
            exists: 0,
            recent: 0,
            flags: Vec::new(),
            permanent_flags: Vec::new(),
            uid_validity: None,
            uid_next: None,
            highest_mod_seq: None,
            expunged_this_session: Vec::new(),
            uid_by_seq: HashMap::new(),
            seq_by_uid: HashMap::new(),
            uid_set: BTreeSet::new(),
            delta: MailboxDelta::default(),
        }
    }

    pub fn uid_for_seq(&self, seq: u32) -> Option<u32> {
        self.uid_by_seq.get(&seq).copied()
    }

    pub fn seq_for_uid(&self, uid: u32) -> Option<u32> {
        self.seq_by_uid.get(&uid).copied()
    }

    pub fn unique_id_for_seq(&self, seq: u32) -> Option<UniqueId> {
        let validity = self.uid_validity?;
        let uid = self.uid_for_seq(seq)?;
        Some(UniqueId { validity, uid })
    }

    pub fn known_uids(&self) -> impl Iterator<Item = u32> + '_ {
        self.uid_set.iter().copied()
    }

    /// Drain and return the UIDs added/removed since the last call. Call once per event loop
    /// turn so callers can diff the mailbox without re-scanning the whole UID set.
    pub fn take_delta(&mut self) -> MailboxDelta {
        std::mem::take(&mut self.delta)
    }

    pub fn has_pending_delta(&self) -> bool {
        !self.delta.is_empty()
    }

    /// Apply one untagged data response. Returns true if the response was mailbox-state-related
    /// and was applied; false if it's not a SELECT-related response (caller should handle it
    /// through whatever other mechanism applies, e.g. FETCH payload delivery to a caller).
    pub fn apply_data(&mut self, data: &DataResponse) -> bool {
        match data {
            DataResponse::Exists(n) => {
                self.exists = *n;
                true
            }
            DataResponse::Recent(n) => {
                self.recent = *n;
                true
            }
            DataResponse::Expunge(seq) => {
                self.expunge_seq(*seq);
                true
            }
            DataResponse::Flags(flags) => {
                self.flags = flags.clone();
                true
            }
            DataResponse::Vanished { uids, .. } => {
                for uid in parse_uid_set(uids) {
                    self.remove_uid_keep_sequence(uid);
                }
                true
            }
            DataResponse::Fetch { seq, items } => {
                self.apply_fetch(*seq, items);
                true
            }
            _ => false,
        }
    }

    fn apply_fetch(&mut self, seq: u32, items: &[FetchItem]) {
        for item in items {
            match item {
                FetchItem::Uid(uid) => self.set_uid_for_seq(seq, *uid),
                FetchItem::ModSeq(modseq) => {
                    if self.highest_mod_seq.map_or(true, |h| *modseq > h) {
                        self.highest_mod_seq = Some(*modseq);
                    }
                }
                _ => {}
            }
        }
    }

    fn set_uid_for_seq(&mut self, seq: u32, uid: u32) {
        if let Some(old_uid) = self.uid_by_seq.insert(seq, uid) {
            if old_uid != uid {
                self.seq_by_uid.remove(&old_uid);
            }
        }
        self.seq_by_uid.insert(uid, seq);
        if self.uid_set.insert(uid) {
            self.delta.added_uids.push(uid);
        }
    }

    /// Apply an EXPUNGE: drop the message at `seq`, then decrement every sequence number above
    /// it by one (RFC 3501 §7.4.1 — the server numbers remaining messages as if the expunged
    /// one had never existed).
    fn expunge_seq(&mut self, seq: u32) {
        if let Some(uid) = self.uid_by_seq.remove(&seq) {
            self.seq_by_uid.remove(&uid);
            if self.uid_set.remove(&uid) {
                self.delta.removed_uids.push(uid);
            }
        }
        let shifted: HashMap<u32, u32> =
            self.uid_by_seq.iter().map(|(&s, &u)| if s > seq { (s - 1, u) } else { (s, u) }).collect();
        self.uid_by_seq = shifted;
        self.seq_by_uid = self.uid_by_seq.iter().map(|(&s, &u)| (u, s)).collect();
        self.expunged_this_session.push(seq);
        if self.exists > 0 {
            self.exists -= 1;
        }
    }

    /// Apply a QRESYNC VANISHED UID: the message is gone, but (unlike EXPUNGE) no sequence
    /// number is known to have shifted — a QRESYNC-aware client tracks messages by UID and
    /// VANISHED carries no sequence number to renumber around.
    fn remove_uid_keep_sequence(&mut self, uid: u32) {
        if self.uid_set.remove(&uid) {
            self.delta.removed_uids.push(uid);
        }
        if let Some(seq) = self.seq_by_uid.remove(&uid) {
            self.uid_by_seq.remove(&seq);
        }
    }

    fn clear_uid_maps(&mut self) {
        self.uid_by_seq.clear();
        self.seq_by_uid.clear();
        self.uid_set.clear();
    }

    /// Apply response codes carried on the tagged SELECT/EXAMINE completion, or on later tagged
    /// responses within the selected mailbox (e.g. `[HIGHESTMODSEQ ...]` on a STORE).
    pub fn apply_codes(&mut self, codes: &[ResponseCode]) {
        for code in codes {
            match code {
                ResponseCode::UidValidity(v) => {
                    // A UIDVALIDITY that differs from what we already had means the mailbox
                    // was recreated server-side; every cached UID is meaningless now.
                    if self.uid_validity.is_some_and(|old| old != *v) {
                        self.clear_uid_maps();
                    }
                    self.uid_validity = Some(*v);
                }
                ResponseCode::UidNext(v) => self.uid_next = Some(*v),
                ResponseCode::HighestModSeq(v) => {
                    if self.highest_mod_seq.map_or(true, |h| *v > h) {
                        self.highest_mod_seq = Some(*v);
                    }
                }
                ResponseCode::NoModSeq => self.highest_mod_seq = None,
                ResponseCode::PermanentFlags(f) => self.permanent_flags = f.clone(),
                ResponseCode::ReadOnly => self.access = MailboxAccess::ReadOnly,
                ResponseCode::ReadWrite => self.access = MailboxAccess::ReadWrite,
                _ => {}
            }
        }
    }
}

/// Parse an IMAP UID set (`7,9:11`) into its member UIDs. A range endpoint of `*` cannot be
/// resolved without knowing the mailbox's current max UID and is skipped; callers that need it
/// should resolve `*` against `uid_next` before calling VANISHED-driven bookkeeping.
fn parse_uid_set(s: &str) -> Vec<u32> {
    let mut out = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((a, b)) = part.split_once(':') {
            if let (Ok(start), Ok(end)) = (a.parse::<u32>(), b.parse::<u32>()) {
                let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
                out.extend(lo..=hi);
            }
        } else if let Ok(n) = part.parse::<u32>() {
            out.push(n);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_exists_and_expunge() {
        let mut m = SelectedMailbox::new("INBOX".to_string(), MailboxAccess::ReadWrite);
        assert!(m.apply_data(&DataResponse::Exists(10)));
        assert!(m.apply_data(&DataResponse::Expunge(3)));
        assert_eq!(m.exists, 9);
        assert_eq!(m.expunged_this_session, vec![3]);
    }

    #[test]
    fn applies_select_response_codes() {
        let mut m = SelectedMailbox::new("INBOX".to_string(), MailboxAccess::ReadWrite);
        m.apply_codes(&[
            ResponseCode::UidValidity(111),
            ResponseCode::UidNext(222),
            ResponseCode::HighestModSeq(5000),
            ResponseCode::ReadOnly,
        ]);
        assert_eq!(m.uid_validity, Some(111));
        assert_eq!(m.uid_next, Some(222));
        assert_eq!(m.highest_mod_seq, Some(5000));
        assert_eq!(m.access, MailboxAccess::ReadOnly);
    }

    #[test]
    fn non_mailbox_response_is_not_applied() {
        let mut m = SelectedMailbox::new("INBOX".to_string(), MailboxAccess::ReadWrite);
        assert!(!m.apply_data(&DataResponse::Search(vec![1, 2])));
    }

    #[test]
    fn fetch_populates_uid_seq_maps_as_mutual_inverses() {
        let mut m = SelectedMailbox::new("INBOX".to_string(), MailboxAccess::ReadWrite);
        m.apply_data(&DataResponse::Fetch { seq: 1, items: vec![FetchItem::Uid(100)] });
        m.apply_data(&DataResponse::Fetch { seq: 2, items: vec![FetchItem::Uid(101)] });
        m.apply_data(&DataResponse::Fetch { seq: 3, items: vec![FetchItem::Uid(102)] });
        assert_eq!(m.uid_for_seq(2), Some(101));
        assert_eq!(m.seq_for_uid(101), Some(2));
        for seq in 1..=3 {
            let uid = m.uid_for_seq(seq).unwrap();
            assert_eq!(m.seq_for_uid(uid), Some(seq));
        }
        let delta = m.take_delta();
        assert_eq!(delta.added_uids, vec![100, 101, 102]);
    }

    #[test]
    fn expunge_renumbers_subsequent_sequence_numbers() {
        let mut m = SelectedMailbox::new("INBOX".to_string(), MailboxAccess::ReadWrite);
        m.apply_data(&DataResponse::Exists(3));
        for (seq, uid) in [(1, 10), (2, 20), (3, 30)] {
            m.apply_data(&DataResponse::Fetch { seq, items: vec![FetchItem::Uid(uid)] });
        }
        m.take_delta();
        m.apply_data(&DataResponse::Expunge(2));
        assert_eq!(m.exists, 2);
        assert_eq!(m.uid_for_seq(1), Some(10));
        assert_eq!(m.uid_for_seq(2), Some(30));
        assert_eq!(m.seq_for_uid(30), Some(2));
        assert_eq!(m.seq_for_uid(20), None);
        let delta = m.take_delta();
        assert_eq!(delta.removed_uids, vec![20]);
    }

    #[test]
    fn uid_validity_change_clears_all_maps() {
        let mut m = SelectedMailbox::new("INBOX".to_string(), MailboxAccess::ReadWrite);
        m.apply_codes(&[ResponseCode::UidValidity(1)]);
        m.apply_data(&DataResponse::Fetch { seq: 1, items: vec![FetchItem::Uid(5)] });
        assert_eq!(m.uid_for_seq(1), Some(5));
        m.apply_codes(&[ResponseCode::UidValidity(2)]);
        assert_eq!(m.uid_for_seq(1), None);
        assert_eq!(m.known_uids().count(), 0);
        assert_eq!(m.uid_validity, Some(2));
    }

    #[test]
    fn highest_mod_seq_is_monotonic() {
        let mut m = SelectedMailbox::new("INBOX".to_string(), MailboxAccess::ReadWrite);
        m.apply_codes(&[ResponseCode::HighestModSeq(100)]);
        m.apply_data(&DataResponse::Fetch { seq: 1, items: vec![FetchItem::ModSeq(50)] });
        assert_eq!(m.highest_mod_seq, Some(100));
        m.apply_data(&DataResponse::Fetch { seq: 1, items: vec![FetchItem::ModSeq(150)] });
        assert_eq!(m.highest_mod_seq, Some(150));
    }

    #[test]
    fn vanished_removes_uid_without_shifting_sequence_numbers() {
        let mut m = SelectedMailbox::new("INBOX".to_string(), MailboxAccess::ReadWrite);
        for (seq, uid) in [(1, 10), (2, 20), (3, 30)] {
            m.apply_data(&DataResponse::Fetch { seq, items: vec![FetchItem::Uid(uid)] });
        }
        m.take_delta();
        m.apply_data(&DataResponse::Vanished { earlier: false, uids: "20".to_string() });
        assert_eq!(m.seq_for_uid(20), None);
        assert_eq!(m.uid_for_seq(1), Some(10));
        assert_eq!(m.uid_for_seq(3), Some(30));
        let delta = m.take_delta();
        assert_eq!(delta.removed_uids, vec![20]);
    }

    #[test]
    fn vanished_uid_set_expands_ranges() {
        let mut m = SelectedMailbox::new("INBOX".to_string(), MailboxAccess::ReadWrite);
        for (seq, uid) in [(1, 7), (2, 9), (3, 10), (4, 11)] {
            m.apply_data(&DataResponse::Fetch { seq, items: vec![FetchItem::Uid(uid)] });
        }
        m.take_delta();
        m.apply_data(&DataResponse::Vanished { earlier: true, uids: "7,9:11".to_string() });
        assert_eq!(m.known_uids().count(), 0);
    }
}
