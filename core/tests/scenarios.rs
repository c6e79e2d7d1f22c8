/*
 * scenarios.rs
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

//! End-to-end drives of the IMAP/SMTP/POP3 session engines over an in-memory duplex stream, no
//! real sockets. Each test plays one side of a captured wire exchange and asserts the other side's
//! client-visible outcome.

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

use tagliacarte_core::protocol::imap::{DataResponse, FetchItem, ImapSession};
use tagliacarte_core::protocol::pop3::Pop3Session;
use tagliacarte_core::protocol::smtp::{MailParams, RcptParams, SmtpClientError, SmtpSession};

#[tokio::test]
async fn imap_login_success() {
    let (mut server, client) = duplex(4096);
    tokio::spawn(async move {
        server.write_all(b"* OK IMAP4rev1 Service Ready\r\n").await.unwrap();
        let mut buf = [0u8; 256];
        let n = server.read(&mut buf).await.unwrap();
        let sent = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(sent.contains("LOGIN \"alice\" \"s3cret\""));
        let tag = sent.split_whitespace().next().unwrap().to_string();
        server.write_all(format!("{} OK LOGIN completed\r\n", tag).as_bytes()).await.unwrap();
    });
    let mut session = ImapSession::new(client);
    session.read_greeting().await.unwrap();
    session.login("alice", "s3cret").await.unwrap();
}

#[tokio::test]
async fn imap_select_reports_uidvalidity_and_highest_modseq() {
    let (mut server, client) = duplex(4096);
    tokio::spawn(async move {
        let mut buf = [0u8; 256];
        let n = server.read(&mut buf).await.unwrap();
        let sent = String::from_utf8_lossy(&buf[..n]).to_string();
        let tag = sent.split_whitespace().next().unwrap().to_string();
        server
            .write_all(
                format!(
                    "* 172 EXISTS\r\n* 1 RECENT\r\n* OK [UIDVALIDITY 3857529045]\r\n* OK [UIDNEXT 4392]\r\n\
                     * OK [HIGHESTMODSEQ 715194045007]\r\n{} OK [READ-WRITE] SELECT completed\r\n",
                    tag
                )
                .as_bytes(),
            )
            .await
            .unwrap();
    });
    let mut session = ImapSession::new(client);
    session.select("INBOX", false).await.unwrap();
    let sel = session.selected.as_ref().unwrap();
    assert_eq!(sel.exists, 172);
    assert_eq!(sel.recent, 1);
    assert_eq!(sel.uid_validity, Some(3857529045));
    assert_eq!(sel.uid_next, Some(4392));
    assert_eq!(sel.highest_mod_seq, Some(715194045007));
}

#[tokio::test]
async fn imap_fetch_returns_literal_body_section() {
    let (mut server, client) = duplex(4096);
    tokio::spawn(async move {
        let mut buf = [0u8; 256];
        server.read(&mut buf).await.unwrap(); // SELECT
        server.write_all(b"x OK [UIDVALIDITY 1] SELECT completed\r\n").await.unwrap();
        let n = server.read(&mut buf).await.unwrap();
        let sent = String::from_utf8_lossy(&buf[..n]).to_string();
        let tag = sent.split_whitespace().next().unwrap().to_string();
        assert!(sent.contains("FETCH 12 (UID RFC822.SIZE BODY[TEXT])"));
        server
            .write_all(
                format!(
                    "* 12 FETCH (UID 4500 RFC822.SIZE 44827 BODY[TEXT] {{11}}\r\nHello world)\r\n{} OK FETCH completed\r\n",
                    tag
                )
                .as_bytes(),
            )
            .await
            .unwrap();
    });
    let mut session2 = ImapSession::new(client);
    session2.select("INBOX", false).await.unwrap();
    let data = session2.fetch("12", "(UID RFC822.SIZE BODY[TEXT])", false).await.unwrap();
    let mut saw_uid = false;
    let mut saw_size = false;
    let mut saw_body = false;
    for resp in data {
        if let DataResponse::Fetch { seq, items } = resp {
            assert_eq!(seq, 12);
            for item in items {
                match item {
                    FetchItem::Uid(uid) => {
                        assert_eq!(uid, 4500);
                        saw_uid = true;
                    }
                    FetchItem::Rfc822Size(size) => {
                        assert_eq!(size, 44827);
                        saw_size = true;
                    }
                    FetchItem::Body { section, data, .. } => {
                        assert_eq!(section, "TEXT");
                        assert_eq!(data, b"Hello world");
                        saw_body = true;
                    }
                    _ => {}
                }
            }
        }
    }
    assert!(saw_uid && saw_size && saw_body);
}

#[tokio::test]
async fn smtp_data_dot_stuffs_leading_dot_lines() {
    let (mut server, client) = duplex(4096);
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        server.write_all(b"220 mail.example.com ESMTP\r\n").await.unwrap();
        server.read(&mut buf).await.unwrap(); // EHLO
        server.write_all(b"250-mail.example.com\r\n250 ENHANCEDSTATUSCODES\r\n").await.unwrap();
        server.read(&mut buf).await.unwrap(); // MAIL FROM
        server.write_all(b"250 2.1.0 OK\r\n").await.unwrap();
        server.read(&mut buf).await.unwrap(); // RCPT TO
        server.write_all(b"250 2.1.5 OK\r\n").await.unwrap();
        server.read(&mut buf).await.unwrap(); // DATA
        server.write_all(b"354 Go ahead\r\n").await.unwrap();
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"..\r\n..foo\r\n.\r\n");
        server.write_all(b"250 2.0.0 OK: queued\r\n").await.unwrap();
    });
    let mut session = SmtpSession::new(client);
    session.read_greeting().await.unwrap();
    session.ehlo("client.example.com").await.unwrap();
    let accepted = session
        .send(
            "a@x".to_string().as_str(),
            &["b@y".to_string()],
            &MailParams::default(),
            &RcptParams::default(),
            b".\r\n.foo",
        )
        .await
        .unwrap();
    assert_eq!(accepted, vec!["b@y".to_string()]);
}

#[tokio::test]
async fn smtp_pipelining_surfaces_bad_recipient_and_resets_on_total_failure() {
    let (mut server, client) = duplex(4096);
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        server.write_all(b"220 mail.example.com ESMTP\r\n").await.unwrap();
        server.read(&mut buf).await.unwrap(); // EHLO
        server.write_all(b"250-mail.example.com\r\n250 PIPELINING\r\n").await.unwrap();
        let n = server.read(&mut buf).await.unwrap();
        let sent = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(sent.contains("MAIL FROM:<a@x>"));
        assert!(sent.contains("RCPT TO:<bad@z>"));
        server.write_all(b"250 OK\r\n").await.unwrap();
        server.write_all(b"550 5.1.1 unknown\r\n").await.unwrap();
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"RSET\r\n");
        server.write_all(b"250 OK\r\n").await.unwrap();
    });
    let mut session = SmtpSession::new(client);
    session.read_greeting().await.unwrap();
    session.ehlo("client.example.com").await.unwrap();
    let err = session
        .send_pipelined("a@x", &["bad@z".to_string()], &MailParams::default(), &RcptParams::default(), b"body")
        .await
        .unwrap_err();
    match err {
        SmtpClientError::RecipientNotAccepted { address, status, .. } => {
            assert_eq!(address, "bad@z");
            assert_eq!(status, 550);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn pop3_retr_unstuffs_leading_dot_line() {
    let (mut server, client) = duplex(4096);
    tokio::spawn(async move {
        server.write_all(b"+OK POP3 ready\r\n").await.unwrap();
        let mut buf = [0u8; 256];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"RETR 1\r\n");
        server
            .write_all(b"+OK 42 octets\r\nHeader: value\r\n..leading dot line\r\n.\r\n")
            .await
            .unwrap();
    });
    let mut session = Pop3Session::new(client);
    session.read_greeting().await.unwrap();
    let raw = session.retr(1).await.unwrap();
    let text = String::from_utf8(raw).unwrap();
    let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines, vec!["Header: value", ".leading dot line"]);
}
