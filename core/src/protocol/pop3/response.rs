/*
 * response.rs
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

//! POP3 reply decoding (RFC 1939 §3): a single status line (`+OK`/`-ERR`/`+ ` during AUTH),
//! optionally followed by a dot-terminated multi-line body whose dot-stuffing is undone here.

use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::Pop3ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Ok,
    Err,
    /// `+ ` continuation line sent during an AUTH/APOP challenge-response exchange.
    Continuation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub kind: StatusKind,
    pub message: String,
}

impl StatusLine {
    pub fn is_ok(&self) -> bool {
        matches!(self.kind, StatusKind::Ok | StatusKind::Continuation)
    }
}

pub async fn read_line<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> Result<String, Pop3ClientError> {
    buf.clear();
    loop {
        let mut b = [0u8; 1];
        let n = reader.read(&mut b).await.map_err(Pop3ClientError::Io)?;
        if n == 0 {
            return Err(Pop3ClientError::Closed);
        }
        if b[0] == b'\n' {
            break;
        }
        if b[0] != b'\r' {
            buf.push(b[0]);
        }
    }
    Ok(String::from_utf8_lossy(buf).into_owned())
}

/// Read one status line and classify it.
pub async fn read_status<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> Result<StatusLine, Pop3ClientError> {
    let line = read_line(reader, buf).await?;
    parse_status(&line)
}

fn parse_status(line: &str) -> Result<StatusLine, Pop3ClientError> {
    if let Some(rest) = line.strip_prefix("+OK") {
        Ok(StatusLine { kind: StatusKind::Ok, message: rest.trim_start().to_string() })
    } else if let Some(rest) = line.strip_prefix("-ERR") {
        Ok(StatusLine { kind: StatusKind::Err, message: rest.trim_start().to_string() })
    } else if let Some(rest) = line.strip_prefix('+') {
        Ok(StatusLine { kind: StatusKind::Continuation, message: rest.trim_start().to_string() })
    } else {
        Err(Pop3ClientError::Protocol(format!("malformed POP3 status line: {:?}", line)))
    }
}

/// Read lines until the bare `.` terminator, undoing dot-stuffing, and return the reassembled
/// bytes (CRLF-terminated lines, byte-stuffing removed).
pub async fn read_multiline<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> Result<Vec<u8>, Pop3ClientError> {
    let mut out = Vec::new();
    read_multiline_streaming(reader, buf, |chunk| out.extend_from_slice(chunk)).await?;
    Ok(out)
}

/// Like [`read_multiline`] but yields each decoded line to `on_line` instead of reassembling,
/// so a caller can stream a large RETR body without holding it all in memory at once.
pub async fn read_multiline_streaming<R, F>(reader: &mut R, buf: &mut Vec<u8>, mut on_line: F) -> Result<(), Pop3ClientError>
where
    R: AsyncRead + Unpin,
    F: FnMut(&[u8]),
{
    loop {
        let line = read_line(reader, buf).await?;
        if line == "." {
            break;
        }
        let unstuffed = line.strip_prefix('.').unwrap_or(&line);
        on_line(unstuffed.as_bytes());
        on_line(b"\r\n");
    }
    Ok(())
}

/// Decode a multi-line listing (LIST/UIDL with no argument, CAPA) into its raw text lines
/// rather than reassembled bytes.
pub async fn read_multiline_lines<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> Result<Vec<String>, Pop3ClientError> {
    let mut lines = Vec::new();
    loop {
        let line = read_line(reader, buf).await?;
        if line == "." {
            break;
        }
        let unstuffed = line.strip_prefix('.').unwrap_or(&line);
        lines.push(unstuffed.to_string());
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_ok_status_with_message() {
        let mut cursor = Cursor::new(b"+OK 2 320\r\n".to_vec());
        let mut buf = Vec::new();
        let s = read_status(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(s.kind, StatusKind::Ok);
        assert_eq!(s.message, "2 320");
    }

    #[tokio::test]
    async fn reads_err_status() {
        let mut cursor = Cursor::new(b"-ERR no such message\r\n".to_vec());
        let mut buf = Vec::new();
        let s = read_status(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(s.kind, StatusKind::Err);
        assert!(!s.is_ok());
        assert_eq!(s.message, "no such message");
    }

    #[tokio::test]
    async fn reads_continuation_status() {
        let mut cursor = Cursor::new(b"+ abcd1234\r\n".to_vec());
        let mut buf = Vec::new();
        let s = read_status(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(s.kind, StatusKind::Continuation);
        assert_eq!(s.message, "abcd1234");
    }

    #[tokio::test]
    async fn undoes_dot_stuffing_in_multiline_body() {
        let mut cursor = Cursor::new(b"Subject: hi\r\n..dotted line\r\nplain\r\n.\r\n".to_vec());
        let mut buf = Vec::new();
        let body = read_multiline(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(body, b"Subject: hi\r\n.dotted line\r\nplain\r\n".to_vec());
    }

    #[tokio::test]
    async fn multiline_lines_reader_yields_capa_list() {
        let mut cursor = Cursor::new(b"USER\r\nUIDL\r\nSASL PLAIN LOGIN\r\n.\r\n".to_vec());
        let mut buf = Vec::new();
        let lines = read_multiline_lines(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(lines, vec!["USER".to_string(), "UIDL".to_string(), "SASL PLAIN LOGIN".to_string()]);
    }

    #[tokio::test]
    async fn streaming_multiline_preserves_line_boundaries() {
        let mut cursor = Cursor::new(b"line one\r\nline two\r\n.\r\n".to_vec());
        let mut buf = Vec::new();
        let mut chunks = Vec::new();
        read_multiline_streaming(&mut cursor, &mut buf, |c| chunks.push(c.to_vec())).await.unwrap();
        assert_eq!(chunks, vec![b"line one".to_vec(), b"\r\n".to_vec(), b"line two".to_vec(), b"\r\n".to_vec()]);
    }
}
