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

//! Groups the flat token stream from [`tokenizer`](super::tokenizer) into the IMAP response
//! grammar: tagged/untagged status responses, response codes in `[...]`, server greetings,
//! continuation requests, and the untagged data responses (FETCH, LIST, SEARCH/ESEARCH, STATUS,
//! CAPABILITY, NAMESPACE, ENABLED, VANISHED, METADATA, ACL, QUOTA).

use super::framer::RawLine;
use super::tokenizer::{Token, Tokenizer};
use super::ImapClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
    Bye,
    PreAuth,
}

impl Status {
    fn from_atom(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Some(Status::Ok),
            "NO" => Some(Status::No),
            "BAD" => Some(Status::Bad),
            "BYE" => Some(Status::Bye),
            "PREAUTH" => Some(Status::PreAuth),
            _ => None,
        }
    }
}

/// A response code carried in `[...]` after a status response, e.g. `[UIDVALIDITY 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    Alert,
    Capability(Vec<String>),
    UidValidity(u32),
    UidNext(u32),
    HighestModSeq(u64),
    NoModSeq,
    PermanentFlags(Vec<String>),
    ReadOnly,
    ReadWrite,
    TryCreate,
    CopyUid { uid_validity: u32, source: String, dest: String },
    AppendUid { uid_validity: u32, uid: u32 },
    Closed,
    /// An extension/unrecognized response code, kept as opaque text.
    Other(String),
}

/// One parsed line from the server: either a status response (tagged or untagged `*`/`+`), or an
/// untagged data response that isn't a plain status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Tagged completion: `<tag> OK/NO/BAD ...`.
    Tagged { tag: String, status: Status, codes: Vec<ResponseCode>, text: String },
    /// Untagged status: `* OK/NO/BAD/BYE/PREAUTH ...` (greeting, or mid-session alerts).
    UntaggedStatus { status: Status, codes: Vec<ResponseCode>, text: String },
    /// `+ ...` continuation request (AUTHENTICATE challenge, literal continuation).
    Continuation { text: String },
    /// Untagged data response, e.g. `* 5 EXISTS`, `* LIST (...) "/" INBOX`, `* 3 FETCH (...)`.
    Data(DataResponse),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataResponse {
    Exists(u32),
    Recent(u32),
    Expunge(u32),
    Flags(Vec<String>),
    Capability(Vec<String>),
    List { attributes: Vec<String>, delimiter: Option<char>, name: String },
    Lsub { attributes: Vec<String>, delimiter: Option<char>, name: String },
    Status { mailbox: String, attrs: Vec<(String, u64)> },
    Search(Vec<u32>),
    Esearch { tag: Option<String>, items: Vec<(String, String)> },
    Fetch { seq: u32, items: Vec<FetchItem> },
    Namespace(String),
    Enabled(Vec<String>),
    Vanished { earlier: bool, uids: String },
    Metadata { mailbox: String, entries: Vec<(String, Option<Vec<u8>>)> },
    Acl { mailbox: String, entries: Vec<(String, String)> },
    ListRights { mailbox: String, identifier: String, rights: Vec<String> },
    MyRights { mailbox: String, rights: String },
    Quota { root: String, resources: Vec<(String, u64, u64)> },
    QuotaRoot { mailbox: String, roots: Vec<String> },
    Id(Vec<(String, Option<String>)>),
    /// Unrecognized untagged keyword; kept verbatim for forward compatibility.
    Other(String),
}

/// One FETCH data item, e.g. `FLAGS (\Seen)`, `UID 5`, `BODY[] {n}<bytes>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    Flags(Vec<String>),
    Uid(u32),
    Rfc822Size(u32),
    InternalDate(String),
    ModSeq(u64),
    Envelope(Vec<Token>),
    BodyStructure(Vec<Token>),
    /// `BODY[section]<partial>` payload; `section` includes any nested part path and peek text.
    Body { section: String, partial_origin: Option<u32>, data: Vec<u8> },
    Other(String, Vec<Token>),
}

pub fn parse_line(line: &RawLine) -> Result<Response, ImapClientError> {
    let mut tok = Tokenizer::new(line);
    let first = tok.next_token()?.ok_or_else(|| ImapClientError::new("empty response line"))?;
    match first {
        Token::Atom(a) if a == "+" => {
            let text = remaining_text(line, &a);
            Ok(Response::Continuation { text })
        }
        Token::Atom(a) if a == "*" => parse_untagged(line, tok),
        Token::Atom(tag) => parse_tagged(line, tag, tok),
        other => Err(ImapClientError::new(format!("unexpected leading token {:?}", other))),
    }
}

fn remaining_text(line: &RawLine, consumed_prefix: &str) -> String {
    let s = line.as_str_lossy();
    s.trim_start()
        .strip_prefix(consumed_prefix)
        .unwrap_or(&s)
        .trim_start()
        .to_string()
}

fn parse_tagged(line: &RawLine, tag: String, mut tok: Tokenizer<'_>) -> Result<Response, ImapClientError> {
    let status_tok = tok.next_token()?.ok_or_else(|| ImapClientError::new("tagged response missing status"))?;
    let Token::Atom(status_atom) = status_tok else {
        return Err(ImapClientError::new("tagged response status is not an atom"));
    };
    let status = Status::from_atom(&status_atom).ok_or_else(|| ImapClientError::new(format!("unknown status {}", status_atom)))?;
    let (codes, text) = parse_codes_and_text(line, &mut tok)?;
    Ok(Response::Tagged { tag, status, codes, text })
}

fn parse_untagged(line: &RawLine, mut tok: Tokenizer<'_>) -> Result<Response, ImapClientError> {
    let second = tok.next_token()?.ok_or_else(|| ImapClientError::new("untagged response missing keyword"))?;
    match &second {
        Token::Atom(a) => {
            if let Some(status) = Status::from_atom(a) {
                let (codes, text) = parse_codes_and_text(line, &mut tok)?;
                return Ok(Response::UntaggedStatus { status, codes, text });
            }
            parse_untagged_keyword(a.clone(), tok).map(Response::Data)
        }
        Token::Number(n) => {
            let n = *n as u32;
            let kw = tok.next_token()?;
            match kw {
                Some(Token::Atom(kw)) if kw.eq_ignore_ascii_case("EXISTS") => Ok(Response::Data(DataResponse::Exists(n))),
                Some(Token::Atom(kw)) if kw.eq_ignore_ascii_case("RECENT") => Ok(Response::Data(DataResponse::Recent(n))),
                Some(Token::Atom(kw)) if kw.eq_ignore_ascii_case("EXPUNGE") => Ok(Response::Data(DataResponse::Expunge(n))),
                Some(Token::Atom(kw)) if kw.eq_ignore_ascii_case("FETCH") => {
                    let items = parse_fetch_items(&mut tok)?;
                    Ok(Response::Data(DataResponse::Fetch { seq: n, items }))
                }
                _ => Ok(Response::Data(DataResponse::Other(line.as_str_lossy().into_owned()))),
            }
        }
        _ => Ok(Response::Data(DataResponse::Other(line.as_str_lossy().into_owned()))),
    }
}

fn parse_untagged_keyword(keyword: String, mut tok: Tokenizer<'_>) -> Result<DataResponse, ImapClientError> {
    let kw = keyword.to_ascii_uppercase();
    match kw.as_str() {
        "FLAGS" => Ok(DataResponse::Flags(read_flag_list(&mut tok)?)),
        "CAPABILITY" => Ok(DataResponse::Capability(read_remaining_atoms(&mut tok)?)),
        "ENABLED" => Ok(DataResponse::Enabled(read_remaining_atoms(&mut tok)?)),
        "LIST" | "LSUB" | "XLIST" => {
            let (attrs, delim, name) = read_list_like(&mut tok)?;
            if kw == "LSUB" {
                Ok(DataResponse::Lsub { attributes: attrs, delimiter: delim, name })
            } else {
                // XLIST (deprecated Gmail extension) shares LIST's wire shape and attribute set.
                Ok(DataResponse::List { attributes: attrs, delimiter: delim, name })
            }
        }
        "STATUS" => {
            let mailbox = read_mailbox_name(&mut tok)?;
            let mut attrs = Vec::new();
            expect(&mut tok, Token::ListOpen)?;
            loop {
                match tok.next_token()? {
                    Some(Token::ListClose) | None => break,
                    Some(Token::Atom(a)) => {
                        let v = read_number(&mut tok)?;
                        attrs.push((a, v));
                    }
                    _ => return Err(ImapClientError::new("malformed STATUS attribute list")),
                }
            }
            Ok(DataResponse::Status { mailbox, attrs })
        }
        "SEARCH" => {
            let mut ids = Vec::new();
            while let Some(Token::Number(n)) = tok.next_token()? {
                ids.push(n as u32);
            }
            Ok(DataResponse::Search(ids))
        }
        "ESEARCH" => {
            let mut tag = None;
            let mut items = Vec::new();
            if tok.peek_token()? == Some(Token::BracketOpen) {
                tok.next_token()?;
                if let Some(Token::Atom(t)) = tok.next_token()? {
                    if t.eq_ignore_ascii_case("TAG") {
                        if let Some(Token::QuotedString(s)) = tok.next_token()? {
                            tag = Some(s);
                        }
                    }
                }
                expect(&mut tok, Token::BracketClose)?;
            }
            loop {
                match tok.next_token()? {
                    None => break,
                    Some(Token::Atom(name)) => {
                        let mut value = String::new();
                        while let Some(t) = tok_peek_number_or_atom(&mut tok)? {
                            if !value.is_empty() {
                                value.push(',');
                            }
                            value.push_str(&t);
                        }
                        items.push((name, value));
                    }
                    _ => {}
                }
            }
            Ok(DataResponse::Esearch { tag, items })
        }
        "NAMESPACE" => Ok(DataResponse::Namespace(tok.collect_all().map(|toks| format!("{:?}", toks))?)),
        "VANISHED" => {
            let mut earlier = false;
            if tok.peek_token()? == Some(Token::BracketOpen) {
                tok.next_token()?;
                if let Some(Token::Atom(a)) = tok.next_token()? {
                    earlier = a.eq_ignore_ascii_case("EARLIER");
                }
                expect(&mut tok, Token::BracketClose)?;
            }
            let uids = match tok.next_token()? {
                Some(Token::Atom(a)) => a,
                _ => String::new(),
            };
            Ok(DataResponse::Vanished { earlier, uids })
        }
        "METADATA" => {
            let mailbox = read_mailbox_name(&mut tok)?;
            let mut entries = Vec::new();
            if tok.peek_token()? == Some(Token::ListOpen) {
                tok.next_token()?;
                loop {
                    match tok.next_token()? {
                        Some(Token::ListClose) | None => break,
                        Some(Token::QuotedString(name)) | Some(Token::Atom(name)) => {
                            let value = match tok.next_token()? {
                                Some(Token::Literal(b)) => Some(b),
                                Some(Token::QuotedString(s)) => Some(s.into_bytes()),
                                Some(Token::Nil) | None => None,
                                _ => None,
                            };
                            entries.push((name, value));
                        }
                        _ => break,
                    }
                }
            }
            Ok(DataResponse::Metadata { mailbox, entries })
        }
        "ACL" => {
            let mailbox = read_mailbox_name(&mut tok)?;
            let mut entries = Vec::new();
            loop {
                let id = match tok.next_token()? {
                    Some(Token::Atom(a)) | Some(Token::QuotedString(a)) => a,
                    _ => break,
                };
                let rights = match tok.next_token()? {
                    Some(Token::Atom(a)) | Some(Token::QuotedString(a)) => a,
                    _ => break,
                };
                entries.push((id, rights));
            }
            Ok(DataResponse::Acl { mailbox, entries })
        }
        "QUOTA" => {
            let root = read_mailbox_name(&mut tok)?;
            let mut resources = Vec::new();
            expect(&mut tok, Token::ListOpen)?;
            loop {
                match tok.next_token()? {
                    Some(Token::ListClose) | None => break,
                    Some(Token::Atom(name)) => {
                        let usage = read_number(&mut tok)?;
                        let limit = read_number(&mut tok)?;
                        resources.push((name, usage, limit));
                    }
                    _ => break,
                }
            }
            Ok(DataResponse::Quota { root, resources })
        }
        "QUOTAROOT" => {
            let mailbox = read_mailbox_name(&mut tok)?;
            let roots = read_remaining_atoms(&mut tok)?;
            Ok(DataResponse::QuotaRoot { mailbox, roots })
        }
        "LISTRIGHTS" => {
            let mailbox = read_mailbox_name(&mut tok)?;
            let identifier = match tok.next_token()? {
                Some(Token::Atom(a)) | Some(Token::QuotedString(a)) => a,
                _ => return Err(ImapClientError::new("LISTRIGHTS missing identifier")),
            };
            let rights = read_remaining_atoms(&mut tok)?;
            Ok(DataResponse::ListRights { mailbox, identifier, rights })
        }
        "MYRIGHTS" => {
            let mailbox = read_mailbox_name(&mut tok)?;
            let rights = match tok.next_token()? {
                Some(Token::Atom(a)) | Some(Token::QuotedString(a)) => a,
                _ => return Err(ImapClientError::new("MYRIGHTS missing rights")),
            };
            Ok(DataResponse::MyRights { mailbox, rights })
        }
        "ID" => {
            let mut entries = Vec::new();
            if tok.peek_token()? == Some(Token::ListOpen) {
                tok.next_token()?;
                loop {
                    match tok.next_token()? {
                        Some(Token::ListClose) | None => break,
                        Some(Token::QuotedString(key)) | Some(Token::Atom(key)) => {
                            let value = match tok.next_token()? {
                                Some(Token::QuotedString(v)) => Some(v),
                                Some(Token::Nil) | None => None,
                                _ => None,
                            };
                            entries.push((key, value));
                        }
                        _ => break,
                    }
                }
            }
            Ok(DataResponse::Id(entries))
        }
        _ => Ok(DataResponse::Other(format!("{} ...", keyword))),
    }
}

fn tok_peek_number_or_atom(tok: &mut Tokenizer<'_>) -> Result<Option<String>, ImapClientError> {
    match tok.next_token()? {
        Some(Token::Number(n)) => Ok(Some(n.to_string())),
        Some(Token::Atom(a)) => Ok(Some(a)),
        _ => Ok(None),
    }
}

fn expect(tok: &mut Tokenizer<'_>, expected: Token) -> Result<(), ImapClientError> {
    match tok.next_token()? {
        Some(t) if t == expected => Ok(()),
        Some(t) => Err(ImapClientError::new(format!("expected {:?}, got {:?}", expected, t))),
        None => Err(ImapClientError::new(format!("expected {:?}, got end of line", expected))),
    }
}

fn read_number(tok: &mut Tokenizer<'_>) -> Result<u64, ImapClientError> {
    match tok.next_token()? {
        Some(Token::Number(n)) => Ok(n),
        other => Err(ImapClientError::new(format!("expected number, got {:?}", other))),
    }
}

fn read_mailbox_name(tok: &mut Tokenizer<'_>) -> Result<String, ImapClientError> {
    match tok.next_token()? {
        Some(Token::QuotedString(s)) | Some(Token::Atom(s)) => Ok(s),
        Some(Token::Literal(b)) => Ok(String::from_utf8_lossy(&b).into_owned()),
        other => Err(ImapClientError::new(format!("expected mailbox name, got {:?}", other))),
    }
}

fn read_flag_list(tok: &mut Tokenizer<'_>) -> Result<Vec<String>, ImapClientError> {
    expect(tok, Token::ListOpen)?;
    let mut flags = Vec::new();
    loop {
        match tok.next_token()? {
            Some(Token::ListClose) | None => break,
            Some(Token::Atom(f)) => flags.push(f),
            _ => {}
        }
    }
    Ok(flags)
}

fn read_remaining_atoms(tok: &mut Tokenizer<'_>) -> Result<Vec<String>, ImapClientError> {
    let mut out = Vec::new();
    loop {
        match tok.next_token()? {
            None => break,
            Some(Token::Atom(a)) => out.push(a),
            Some(Token::QuotedString(s)) => out.push(s),
            _ => {}
        }
    }
    Ok(out)
}

fn read_list_like(tok: &mut Tokenizer<'_>) -> Result<(Vec<String>, Option<char>, String), ImapClientError> {
    let attrs = read_flag_list(tok)?;
    let delim = match tok.next_token()? {
        Some(Token::QuotedString(s)) => s.chars().next(),
        Some(Token::Nil) => None,
        other => return Err(ImapClientError::new(format!("expected delimiter, got {:?}", other))),
    };
    let name = read_mailbox_name(tok)?;
    Ok((attrs, delim, name))
}

fn parse_codes_and_text(line: &RawLine, tok: &mut Tokenizer<'_>) -> Result<(Vec<ResponseCode>, String), ImapClientError> {
    let mut codes = Vec::new();
    if tok.peek_token()? == Some(Token::BracketOpen) {
        tok.next_token()?; // consume '['
        let code = parse_one_response_code(tok)?;
        codes.push(code);
        expect(tok, Token::BracketClose)?;
    }
    let text = remaining_free_text(line);
    Ok((codes, text))
}

fn remaining_free_text(line: &RawLine) -> String {
    let s = line.as_str_lossy();
    if let Some(start) = s.find('[') {
        if let Some(end) = s[start..].find(']') {
            return s[start + end + 1..].trim_start().to_string();
        }
    }
    s.to_string()
}

fn parse_one_response_code(tok: &mut Tokenizer<'_>) -> Result<ResponseCode, ImapClientError> {
    let name = match tok.next_token()? {
        Some(Token::Atom(a)) => a,
        other => return Err(ImapClientError::new(format!("expected response code name, got {:?}", other))),
    };
    match name.to_ascii_uppercase().as_str() {
        "ALERT" => Ok(ResponseCode::Alert),
        "CAPABILITY" => Ok(ResponseCode::Capability(read_until_bracket_close(tok)?)),
        "UIDVALIDITY" => Ok(ResponseCode::UidValidity(read_number(tok)? as u32)),
        "UIDNEXT" => Ok(ResponseCode::UidNext(read_number(tok)? as u32)),
        "HIGHESTMODSEQ" => Ok(ResponseCode::HighestModSeq(read_number(tok)?)),
        "NOMODSEQ" => Ok(ResponseCode::NoModSeq),
        "PERMANENTFLAGS" => Ok(ResponseCode::PermanentFlags(read_flag_list(tok)?)),
        "READ-ONLY" => Ok(ResponseCode::ReadOnly),
        "READ-WRITE" => Ok(ResponseCode::ReadWrite),
        "TRYCREATE" => Ok(ResponseCode::TryCreate),
        "CLOSED" => Ok(ResponseCode::Closed),
        "COPYUID" => {
            let uid_validity = read_number(tok)? as u32;
            let source = read_atom(tok)?;
            let dest = read_atom(tok)?;
            Ok(ResponseCode::CopyUid { uid_validity, source, dest })
        }
        "APPENDUID" => {
            let uid_validity = read_number(tok)? as u32;
            let uid = read_number(tok)? as u32;
            Ok(ResponseCode::AppendUid { uid_validity, uid })
        }
        other => {
            let _ = read_until_bracket_close(tok);
            Ok(ResponseCode::Other(other.to_string()))
        }
    }
}

fn read_atom(tok: &mut Tokenizer<'_>) -> Result<String, ImapClientError> {
    match tok.next_token()? {
        Some(Token::Atom(a)) => Ok(a),
        Some(Token::Number(n)) => Ok(n.to_string()),
        other => Err(ImapClientError::new(format!("expected atom, got {:?}", other))),
    }
}

fn read_until_bracket_close(tok: &mut Tokenizer<'_>) -> Result<Vec<String>, ImapClientError> {
    let mut out = Vec::new();
    loop {
        match tok.next_token()? {
            Some(Token::BracketClose) | None => break,
            Some(Token::Atom(a)) => out.push(a),
            Some(Token::Number(n)) => out.push(n.to_string()),
            _ => {}
        }
    }
    Ok(out)
}

fn parse_fetch_items(tok: &mut Tokenizer<'_>) -> Result<Vec<FetchItem>, ImapClientError> {
    expect(tok, Token::ListOpen)?;
    let mut items = Vec::new();
    loop {
        let name = match tok.next_token()? {
            Some(Token::ListClose) | None => break,
            Some(Token::Atom(a)) => a,
            other => return Err(ImapClientError::new(format!("expected FETCH item name, got {:?}", other))),
        };
        let upper = name.to_ascii_uppercase();
        if upper == "FLAGS" {
            items.push(FetchItem::Flags(read_flag_list(tok)?));
        } else if upper == "UID" {
            items.push(FetchItem::Uid(read_number(tok)? as u32));
        } else if upper == "RFC822.SIZE" {
            items.push(FetchItem::Rfc822Size(read_number(tok)? as u32));
        } else if upper == "INTERNALDATE" {
            match tok.next_token()? {
                Some(Token::QuotedString(s)) => items.push(FetchItem::InternalDate(s)),
                other => return Err(ImapClientError::new(format!("expected date string, got {:?}", other))),
            }
        } else if upper == "MODSEQ" {
            expect(tok, Token::ListOpen)?;
            let v = read_number(tok)?;
            expect(tok, Token::ListClose)?;
            items.push(FetchItem::ModSeq(v));
        } else if upper == "ENVELOPE" {
            items.push(FetchItem::Envelope(read_balanced_list(tok)?));
        } else if upper == "BODYSTRUCTURE" {
            items.push(FetchItem::BodyStructure(read_balanced_list(tok)?));
        } else if upper == "BODY" && tok.peek_token()? == Some(Token::ListOpen) {
            // Bare BODY fetch-att (non-extensible BODYSTRUCTURE form): same parenthesized shape.
            items.push(FetchItem::BodyStructure(read_balanced_list(tok)?));
        } else if upper == "BODY" {
            let section = read_section(tok)?;
            let partial_origin = maybe_read_partial_origin(tok)?;
            let data = match tok.next_token()? {
                Some(Token::Literal(b)) => b,
                Some(Token::QuotedString(s)) => s.into_bytes(),
                Some(Token::Nil) | None => Vec::new(),
                other => return Err(ImapClientError::new(format!("expected BODY payload, got {:?}", other))),
            };
            items.push(FetchItem::Body { section, partial_origin, data });
        } else {
            items.push(FetchItem::Other(name, read_single_value(tok)?));
        }
    }
    Ok(items)
}

/// Reads a `[section]` suffix (e.g. `[]`, `[HEADER]`, `[1.2.TEXT]`, `[HEADER.FIELDS (TO FROM)]`)
/// into its bracketed text form, e.g. `[HEADER.FIELDS (TO FROM)]`.
/// Reads a `[section-spec]` and returns its contents without the enclosing brackets, e.g.
/// `TEXT`, `HEADER.FIELDS (TO FROM)`, or the empty string for a bare `[]`.
fn read_section(tok: &mut Tokenizer<'_>) -> Result<String, ImapClientError> {
    expect(tok, Token::BracketOpen)?;
    let mut section = String::new();
    loop {
        match tok.next_token()? {
            Some(Token::BracketClose) => break,
            Some(Token::ListOpen) => {
                if !section.is_empty() && !section.ends_with('(') {
                    section.push(' ');
                }
                section.push('(');
            }
            Some(Token::ListClose) => section.push(')'),
            Some(Token::Atom(a)) => {
                if !section.is_empty() && !section.ends_with('(') {
                    section.push(' ');
                }
                section.push_str(&a);
            }
            Some(Token::Number(n)) => {
                if section.is_empty() || section.ends_with('(') {
                    section.push_str(&n.to_string());
                } else {
                    section.push('.');
                    section.push_str(&n.to_string());
                }
            }
            Some(Token::QuotedString(s)) => section.push_str(&s),
            None => break,
            _ => {}
        }
    }
    Ok(section)
}

/// Reads an optional `<origin>` partial-fetch marker following a section, e.g. `<0>` in
/// `BODY[]<0> {n}`.
fn maybe_read_partial_origin(tok: &mut Tokenizer<'_>) -> Result<Option<u32>, ImapClientError> {
    // `<` and `>` are not special to the tokenizer; they are part of an atom like "<0>". Detect
    // and strip them here rather than teaching the tokenizer a grammar construct used nowhere else.
    if let Some(Token::Atom(a)) = tok.peek_token()? {
        if a.starts_with('<') && a.ends_with('>') {
            tok.next_token()?;
            let digits = &a[1..a.len() - 1];
            return Ok(digits.parse().ok());
        }
    }
    Ok(None)
}

fn read_balanced_list(tok: &mut Tokenizer<'_>) -> Result<Vec<Token>, ImapClientError> {
    let mut depth = 0i32;
    let mut out = Vec::new();
    loop {
        match tok.next_token()? {
            None => break,
            Some(Token::ListOpen) => {
                depth += 1;
                out.push(Token::ListOpen);
            }
            Some(Token::ListClose) => {
                out.push(Token::ListClose);
                depth -= 1;
                if depth <= 0 {
                    break;
                }
            }
            Some(t) => out.push(t),
        }
    }
    Ok(out)
}

fn read_single_value(tok: &mut Tokenizer<'_>) -> Result<Vec<Token>, ImapClientError> {
    match tok.next_token()? {
        Some(Token::ListOpen) => {
            let mut v = vec![Token::ListOpen];
            v.extend(read_balanced_list(tok)?);
            Ok(v)
        }
        Some(t) => Ok(vec![t]),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(s: &str) -> RawLine {
        RawLine { text: s.as_bytes().to_vec(), literals: Vec::new() }
    }

    #[test]
    fn parses_tagged_ok() {
        let line = raw("a1 OK LOGIN completed");
        let resp = parse_line(&line).unwrap();
        match resp {
            Response::Tagged { tag, status, text, .. } => {
                assert_eq!(tag, "a1");
                assert_eq!(status, Status::Ok);
                assert_eq!(text, "LOGIN completed");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_exists_recent() {
        let line = raw("* 23 EXISTS");
        assert_eq!(parse_line(&line).unwrap(), Response::Data(DataResponse::Exists(23)));
        let line = raw("* 5 RECENT");
        assert_eq!(parse_line(&line).unwrap(), Response::Data(DataResponse::Recent(5)));
    }

    #[test]
    fn parses_capability_untagged() {
        let line = raw("* CAPABILITY IMAP4rev1 STARTTLS AUTH=PLAIN");
        match parse_line(&line).unwrap() {
            Response::Data(DataResponse::Capability(caps)) => {
                assert_eq!(caps, vec!["IMAP4rev1", "STARTTLS", "AUTH=PLAIN"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_search_untagged() {
        let line = raw("* SEARCH 1 2 3");
        assert_eq!(parse_line(&line).unwrap(), Response::Data(DataResponse::Search(vec![1, 2, 3])));
    }

    #[test]
    fn parses_fetch_flags_and_uid() {
        let line = raw(r#"* 1 FETCH (FLAGS (\Seen \Answered) UID 42)"#);
        match parse_line(&line).unwrap() {
            Response::Data(DataResponse::Fetch { seq, items }) => {
                assert_eq!(seq, 1);
                assert!(items.contains(&FetchItem::Uid(42)));
                assert!(items.iter().any(|i| matches!(i, FetchItem::Flags(f) if f.contains(&r"\Seen".to_string()))));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_continuation() {
        let line = raw("+ YWxhZGRpbjpvcGVuc2VzYW1l");
        match parse_line(&line).unwrap() {
            Response::Continuation { text } => assert_eq!(text, "YWxhZGRpbjpvcGVuc2VzYW1l"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_list_with_literal_mailbox_name() {
        let mut text = br#"* LIST (\HasNoChildren) "/" "#.to_vec();
        text.push(0x00);
        let line = RawLine { text, literals: vec![b"INBOX".to_vec()] };
        match parse_line(&line).unwrap() {
            Response::Data(DataResponse::List { attributes, delimiter, name }) => {
                assert_eq!(attributes, vec![r"\HasNoChildren".to_string()]);
                assert_eq!(delimiter, Some('/'));
                assert_eq!(name, "INBOX");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_fetch_body_section_with_partial_and_literal() {
        let mut text = b"* 1 FETCH (BODY[HEADER.FIELDS (TO FROM)]<0> ".to_vec();
        text.push(0x00);
        text.push(b')');
        let line = RawLine { text, literals: vec![b"To: a\r\n".to_vec()] };
        match parse_line(&line).unwrap() {
            Response::Data(DataResponse::Fetch { items, .. }) => {
                let body = items.iter().find_map(|i| match i {
                    FetchItem::Body { section, partial_origin, data } => Some((section.clone(), *partial_origin, data.clone())),
                    _ => None,
                });
                let (section, origin, data) = body.expect("body item");
                assert_eq!(section, "HEADER.FIELDS (TO FROM)");
                assert_eq!(origin, Some(0));
                assert_eq!(data, b"To: a\r\n".to_vec());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_response_code_and_trailing_text() {
        let line = raw("a1 OK [READ-WRITE] SELECT completed");
        match parse_line(&line).unwrap() {
            Response::Tagged { codes, text, .. } => {
                assert_eq!(codes, vec![ResponseCode::ReadWrite]);
                assert_eq!(text, "SELECT completed");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_copyuid_response_code() {
        let line = raw("a1 OK [COPYUID 123456 1:3 5:7] COPY completed");
        match parse_line(&line).unwrap() {
            Response::Tagged { codes, .. } => {
                assert_eq!(
                    codes,
                    vec![ResponseCode::CopyUid { uid_validity: 123456, source: "1:3".to_string(), dest: "5:7".to_string() }]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
