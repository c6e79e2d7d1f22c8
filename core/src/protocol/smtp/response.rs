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

//! SMTP reply parsing (RFC 5321 §4.2): multi-line replies share one reply code, terminated by
//! the line whose separator is a space rather than a hyphen. RFC 2034 enhanced status codes
//! (`X.Y.Z`) are extracted from the first line of text when present.

use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::SmtpClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhancedStatus {
    pub class: u16,
    pub subject: u16,
    pub detail: u16,
}

impl std::fmt::Display for EnhancedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    pub code: u16,
    pub enhanced: Option<EnhancedStatus>,
    pub lines: Vec<String>,
}

impl SmtpResponse {
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 3xx: more input expected (e.g. the 354 that follows DATA).
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    pub fn is_error(&self) -> bool {
        self.code >= 400
    }

    pub fn is_permanent_failure(&self) -> bool {
        self.code >= 500
    }
}

/// Read one (possibly multi-line) SMTP reply. Per RFC 5321 §4.2.1, every line of a multi-line
/// reply must carry the same reply code; a server that changes code mid-reply is non-conformant,
/// and we tolerate it by discarding the lines collected so far and restarting under the new code
/// rather than returning a reply that mixes codes.
pub async fn read_response<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> Result<SmtpResponse, SmtpClientError> {
    let mut code: Option<u16> = None;
    let mut lines: Vec<String> = Vec::new();
    loop {
        let line = read_line(reader, buf).await?;
        if line.len() < 3 || !line.as_bytes()[0..3].iter().all(u8::is_ascii_digit) {
            return Err(SmtpClientError::Protocol(format!("malformed SMTP reply line: {:?}", line)));
        }
        let this_code: u16 = line[..3].parse().map_err(|_| SmtpClientError::Protocol(format!("non-numeric SMTP code in {:?}", line)))?;
        let sep = line.as_bytes().get(3).copied();
        let text = if line.len() > 4 { line[4..].to_string() } else { String::new() };

        if code.is_some_and(|prev| prev != this_code) {
            lines.clear();
        }
        code = Some(this_code);
        lines.push(text);

        match sep {
            Some(b'-') => continue,
            _ => break,
        }
    }
    let code = code.unwrap();
    let (enhanced, lines) = extract_enhanced_status(code, lines);
    Ok(SmtpResponse { code, enhanced, lines })
}

async fn read_line<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> Result<String, SmtpClientError> {
    buf.clear();
    loop {
        let mut b = [0u8; 1];
        let n = reader.read(&mut b).await.map_err(SmtpClientError::Io)?;
        if n == 0 {
            return Err(SmtpClientError::Closed);
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

fn extract_enhanced_status(code: u16, mut lines: Vec<String>) -> (Option<EnhancedStatus>, Vec<String>) {
    let class_digit = code / 100;
    if let Some(first) = lines.first() {
        if let Some((status, rest)) = parse_enhanced_prefix(first) {
            if status.class == class_digit {
                lines[0] = rest;
                return (Some(status), lines);
            }
        }
    }
    (None, lines)
}

fn parse_enhanced_prefix(s: &str) -> Option<(EnhancedStatus, String)> {
    let mut parts = s.splitn(2, ' ');
    let code_part = parts.next()?;
    let rest = parts.next().unwrap_or("").to_string();
    let mut nums = code_part.split('.');
    let class = nums.next()?.parse().ok()?;
    let subject = nums.next()?.parse().ok()?;
    let detail = nums.next()?.parse().ok()?;
    if nums.next().is_some() {
        return None;
    }
    Some((EnhancedStatus { class, subject, detail }, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_single_line_reply() {
        let mut cursor = Cursor::new(b"250 OK\r\n".to_vec());
        let mut buf = Vec::new();
        let r = read_response(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(r.code, 250);
        assert_eq!(r.lines, vec!["OK".to_string()]);
    }

    #[tokio::test]
    async fn reads_multiline_ehlo_reply() {
        let mut cursor = Cursor::new(b"250-mail.example.com\r\n250-PIPELINING\r\n250-SIZE 35882577\r\n250 8BITMIME\r\n".to_vec());
        let mut buf = Vec::new();
        let r = read_response(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(r.code, 250);
        assert_eq!(r.lines, vec!["mail.example.com", "PIPELINING", "SIZE 35882577", "8BITMIME"]);
    }

    #[tokio::test]
    async fn extracts_enhanced_status_code() {
        let mut cursor = Cursor::new(b"550 5.1.1 No such user here\r\n".to_vec());
        let mut buf = Vec::new();
        let r = read_response(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(r.code, 550);
        assert_eq!(r.enhanced, Some(EnhancedStatus { class: 5, subject: 1, detail: 1 }));
        assert_eq!(r.message(), "No such user here");
        assert!(r.is_permanent_failure());
    }

    #[tokio::test]
    async fn enhanced_status_class_must_match_reply_code() {
        // A line that merely looks like "N.N.N text" but whose class digit disagrees with the
        // reply code is ordinary text, not an enhanced status code.
        let mut cursor = Cursor::new(b"250 1.2.3 not an enhanced code here\r\n".to_vec());
        let mut buf = Vec::new();
        let r = read_response(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(r.enhanced, None);
    }

    #[tokio::test]
    async fn restarts_aggregation_if_reply_code_changes_mid_stream() {
        let mut cursor = Cursor::new(b"250-first\r\n451-oops\r\n451 second\r\n".to_vec());
        let mut buf = Vec::new();
        let r = read_response(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(r.code, 451);
        assert_eq!(r.lines, vec!["oops", "second"]);
    }
}
