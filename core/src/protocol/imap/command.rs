/*
 * command.rs
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

//! Command-line construction: tag generation and astring/literal encoding for mailbox names and
//! other free-form arguments (RFC 3501 §9 `astring`).

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing tag generator, unique for the lifetime of a session (never wraps
/// within any realistic session length, unlike a `% 9999` counter).
pub struct TagGenerator {
    counter: AtomicU64,
}

impl TagGenerator {
    pub fn new() -> Self {
        Self { counter: AtomicU64::new(0) }
    }

    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("A{:06}", n)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// One argument to send after a command word, either inlined into the command line (an atom or
/// quoted string) or sent as a literal (requiring a continuation round-trip, or `{n+}` if the
/// server advertised LITERAL+/LITERAL-).
pub enum Arg {
    Inline(String),
    Literal(Vec<u8>),
}

/// Classify a string for the astring production: usable as a bare atom, needs quoting, or (if it
/// contains control bytes, a literal-unsafe length, or a `"`/`\` that would need heavy escaping)
/// must be sent as a literal.
pub fn encode_astring(s: &str) -> Arg {
    if s.is_empty() {
        return Arg::Inline("\"\"".to_string());
    }
    if is_safe_atom(s) {
        return Arg::Inline(s.to_string());
    }
    if s.bytes().all(|b| b != b'"' && b != b'\\' && b != b'\r' && b != b'\n' && b.is_ascii()) {
        return Arg::Inline(format!("\"{}\"", s));
    }
    Arg::Literal(s.as_bytes().to_vec())
}

fn is_safe_atom(s: &str) -> bool {
    s.bytes().all(|b| {
        b.is_ascii_graphic()
            && !matches!(b, b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\' | b']' | b'[')
    })
}

/// Quote a mailbox name per the astring rules, preferring a literal only when required.
pub fn encode_mailbox(name: &str) -> Arg {
    encode_astring(name)
}

/// Render a sequence-set (e.g. `1:3,5,7:*`) from ranges; callers build the string directly since
/// IMAP sequence sets have no quoting concerns (digits, `:`, `,`, `*` only).
pub fn sequence_set(ids: &[u32]) -> String {
    let mut parts = Vec::new();
    let mut i = 0;
    while i < ids.len() {
        let start = ids[i];
        let mut end = start;
        while i + 1 < ids.len() && ids[i + 1] == end + 1 {
            i += 1;
            end = ids[i];
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{}:{}", start, end));
        }
        i += 1;
    }
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_generator_produces_strictly_increasing_distinct_tags() {
        let gen = TagGenerator::new();
        let mut seen = std::collections::HashSet::new();
        let mut last = None;
        for _ in 0..20000 {
            let t = gen.next();
            assert!(seen.insert(t.clone()), "tag {} repeated", t);
            if let Some(prev) = &last {
                assert!(&t > prev);
            }
            last = Some(t);
        }
    }

    #[test]
    fn encodes_plain_name_as_atom() {
        match encode_astring("INBOX") {
            Arg::Inline(s) => assert_eq!(s, "INBOX"),
            _ => panic!("expected inline"),
        }
    }

    #[test]
    fn encodes_name_with_space_as_quoted_string() {
        match encode_astring("My Folder") {
            Arg::Inline(s) => assert_eq!(s, "\"My Folder\""),
            _ => panic!("expected quoted"),
        }
    }

    #[test]
    fn encodes_name_with_quote_as_literal() {
        match encode_astring("weird\"name") {
            Arg::Literal(b) => assert_eq!(b, b"weird\"name".to_vec()),
            _ => panic!("expected literal"),
        }
    }

    #[test]
    fn sequence_set_collapses_consecutive_runs() {
        assert_eq!(sequence_set(&[1, 2, 3, 5, 7, 8, 9]), "1:3,5,7:9");
    }
}
