/*
 * framer.rs
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

//! Byte-stream framer: splits an IMAP connection's byte stream into logical response lines,
//! inlining literal payloads (`{n}` and non-synchronizing `{n+}`) as they occur rather than
//! assuming at most one literal per line. A single untagged response can carry several literals
//! (e.g. a FETCH with both an ENVELOPE astring literal and a BODY[] literal), so the framer keeps
//! scanning for more `{n}` markers after each literal it reads until it reaches an actual CRLF
//! that isn't followed by another literal marker.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use super::ImapClientError;

/// One logical response line with any literal payloads it contained, in order of appearance.
/// `text` has each literal's `{n}` marker replaced by a `\x00` placeholder byte so callers can
/// walk `text` and `literals` in lockstep without re-deriving offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub text: Vec<u8>,
    pub literals: Vec<Vec<u8>>,
}

impl RawLine {
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.text)
    }
}

const LITERAL_PLACEHOLDER: u8 = 0x00;

/// Reads logical IMAP lines from an async byte stream, buffering partial reads across calls.
pub struct ImapFramer<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> ImapFramer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: Vec::new() }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read one logical line, inlining every literal it references.
    pub async fn read_line(&mut self) -> Result<RawLine, ImapClientError> {
        let mut text = Vec::new();
        let mut literals = Vec::new();
        loop {
            let segment = self.read_until_crlf().await?;
            match trailing_literal_size(&segment) {
                Some((prefix_len, size, non_sync)) => {
                    text.extend_from_slice(&segment[..prefix_len]);
                    text.push(LITERAL_PLACEHOLDER);
                    let payload = self.read_exact_bytes(size).await?;
                    literals.push(payload);
                    let _ = non_sync;
                    // Loop back: the bytes right after the literal are more of this logical
                    // line (possibly another `{n}` marker), not a fresh CRLF-terminated line.
                }
                None => {
                    text.extend_from_slice(&segment);
                    break;
                }
            }
        }
        Ok(RawLine { text, literals })
    }

    async fn read_until_crlf(&mut self) -> Result<Vec<u8>, ImapClientError> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line = self.buf[..pos].to_vec();
                self.buf.drain(..pos + 2);
                return Ok(line);
            }
            self.fill().await?;
        }
    }

    async fn read_exact_bytes(&mut self, n: usize) -> Result<Vec<u8>, ImapClientError> {
        while self.buf.len() < n {
            self.fill().await?;
        }
        let bytes = self.buf[..n].to_vec();
        self.buf.drain(..n);
        Ok(bytes)
    }

    async fn fill(&mut self) -> Result<(), ImapClientError> {
        let mut chunk = [0u8; 4096];
        let n = self.reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(ImapClientError::new("connection closed while reading response"));
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}

impl<R: AsyncWrite + Unpin> ImapFramer<R> {
    /// Access the stream for writing. Valid because the same connection object implements both
    /// `AsyncRead` and `AsyncWrite` (a `TcpStream`/`TlsStreamWrapper`/`tokio::io::duplex` half).
    pub fn writer(&mut self) -> &mut R {
        &mut self.reader
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// If `line` ends with a `{n}` or `{n+}` literal marker, returns
/// `(prefix_len_before_marker, n, is_non_synchronizing)`.
fn trailing_literal_size(line: &[u8]) -> Option<(usize, usize, bool)> {
    if line.last() != Some(&b'}') {
        return None;
    }
    let open = line.iter().rposition(|&b| b == b'{')?;
    let mut digits = &line[open + 1..line.len() - 1];
    let non_sync = digits.last() == Some(&b'+');
    if non_sync {
        digits = &digits[..digits.len() - 1];
    }
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let n: usize = std::str::from_utf8(digits).ok()?.parse().ok()?;
    Some((open, n, non_sync))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn reads_plain_line_without_literal() {
        let (mut client, server) = duplex(1024);
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client.write_all(b"* OK ready\r\n").await.unwrap();
        });
        let mut framer = ImapFramer::new(server);
        let line = framer.read_line().await.unwrap();
        assert_eq!(line.text, b"* OK ready");
        assert!(line.literals.is_empty());
    }

    #[tokio::test]
    async fn reads_single_literal() {
        let (mut client, server) = duplex(1024);
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client.write_all(b"* 1 FETCH (BODY[] {5}\r\nhello)\r\n").await.unwrap();
        });
        let mut framer = ImapFramer::new(server);
        let line = framer.read_line().await.unwrap();
        assert_eq!(line.literals, vec![b"hello".to_vec()]);
        assert_eq!(line.text, b"* 1 FETCH (BODY[] \x00)");
    }

    #[tokio::test]
    async fn reads_two_literals_in_one_logical_line() {
        let (mut client, server) = duplex(2048);
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client
                .write_all(b"* 1 FETCH (ENVELOPE {3}\r\nfoo BODY[] {3}\r\nbar)\r\n")
                .await
                .unwrap();
        });
        let mut framer = ImapFramer::new(server);
        let line = framer.read_line().await.unwrap();
        assert_eq!(line.literals, vec![b"foo".to_vec(), b"bar".to_vec()]);
        assert_eq!(line.text, b"* 1 FETCH (ENVELOPE \x00 BODY[] \x00)");
    }

    #[tokio::test]
    async fn non_synchronizing_literal_is_still_inlined() {
        let (mut client, server) = duplex(1024);
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client.write_all(b"a1 LOGIN {5+}\r\nalice {6+}\r\nsecret\r\n").await.unwrap();
        });
        let mut framer = ImapFramer::new(server);
        let line = framer.read_line().await.unwrap();
        assert_eq!(line.literals, vec![b"alice".to_vec(), b"secret".to_vec()]);
    }
}
