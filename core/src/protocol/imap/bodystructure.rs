/*
 * bodystructure.rs
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

//! Recursive parser for the `BODYSTRUCTURE`/`BODY` FETCH data item (RFC 3501 §7.4.2), consuming
//! the flat `Vec<Token>` captured by [`response::parse_fetch_items`](super::response).

use super::tokenizer::Token;
use super::ImapClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyParams(pub Vec<(String, String)>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyDisposition {
    pub kind: String,
    pub params: BodyParams,
}

/// One MIME body part, recursively nested for `multipart/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyStructure {
    Multipart {
        parts: Vec<BodyStructure>,
        subtype: String,
        params: Option<BodyParams>,
        disposition: Option<BodyDisposition>,
        language: Vec<String>,
        location: Option<String>,
    },
    Single {
        media_type: String,
        media_subtype: String,
        params: BodyParams,
        content_id: Option<String>,
        description: Option<String>,
        encoding: String,
        size: u32,
        /// For `message/rfc822`: nested envelope + body + line count.
        nested_message: Option<Box<(Vec<Token>, BodyStructure, u32)>>,
        /// For `text/*`: line count.
        line_count: Option<u32>,
        disposition: Option<BodyDisposition>,
        language: Vec<String>,
        location: Option<String>,
    },
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect_string_or_nil(&mut self) -> Result<Option<String>, ImapClientError> {
        match self.next() {
            Some(Token::QuotedString(s)) | Some(Token::Atom(s)) => Ok(Some(s.clone())),
            Some(Token::Literal(b)) => Ok(Some(String::from_utf8_lossy(b).into_owned())),
            Some(Token::Nil) => Ok(None),
            other => Err(ImapClientError::new(format!("expected string or NIL, got {:?}", other))),
        }
    }

    fn expect_number(&mut self) -> Result<u32, ImapClientError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(*n as u32),
            other => Err(ImapClientError::new(format!("expected number, got {:?}", other))),
        }
    }

    fn expect(&mut self, t: &Token) -> Result<(), ImapClientError> {
        match self.next() {
            Some(tok) if tok == t => Ok(()),
            other => Err(ImapClientError::new(format!("expected {:?}, got {:?}", t, other))),
        }
    }
}

/// Parse the top-level BODY/BODYSTRUCTURE token list, which is wrapped in one outer
/// parenthesized list: `(...)`.
pub fn parse(tokens: &[Token]) -> Result<BodyStructure, ImapClientError> {
    let mut c = Cursor::new(tokens);
    c.expect(&Token::ListOpen)?;
    let result = parse_body(&mut c)?;
    c.expect(&Token::ListClose)?;
    Ok(result)
}

fn parse_body(c: &mut Cursor<'_>) -> Result<BodyStructure, ImapClientError> {
    // A multipart body's first element is itself a list (the first child part); a single-part
    // body's first element is the media type string.
    if c.peek() == Some(&Token::ListOpen) {
        parse_multipart(c)
    } else {
        parse_single_part(c)
    }
}

fn parse_multipart(c: &mut Cursor<'_>) -> Result<BodyStructure, ImapClientError> {
    let mut parts = Vec::new();
    while c.peek() == Some(&Token::ListOpen) {
        c.expect(&Token::ListOpen)?;
        parts.push(parse_body(c)?);
        c.expect(&Token::ListClose)?;
    }
    let subtype = c.expect_string_or_nil()?.unwrap_or_default();
    let params = parse_params(c)?;
    let disposition = parse_disposition(c)?;
    let language = parse_language(c)?;
    let location = c.expect_string_or_nil()?;
    Ok(BodyStructure::Multipart { parts, subtype, params, disposition, language, location })
}

fn parse_single_part(c: &mut Cursor<'_>) -> Result<BodyStructure, ImapClientError> {
    let media_type = c.expect_string_or_nil()?.unwrap_or_default();
    let media_subtype = c.expect_string_or_nil()?.unwrap_or_default();
    let params = parse_params(c)?.unwrap_or(BodyParams(Vec::new()));
    let content_id = c.expect_string_or_nil()?;
    let description = c.expect_string_or_nil()?;
    let encoding = c.expect_string_or_nil()?.unwrap_or_default();
    let size = c.expect_number()?;

    let is_text = media_type.eq_ignore_ascii_case("text");
    let is_message_rfc822 = media_type.eq_ignore_ascii_case("message") && media_subtype.eq_ignore_ascii_case("rfc822");

    let mut nested_message = None;
    let mut line_count = None;
    if is_message_rfc822 {
        c.expect(&Token::ListOpen)?;
        let envelope_start = c.pos;
        skip_balanced_list(c)?;
        let envelope_tokens = c.tokens[envelope_start..c.pos].to_vec();
        let body = parse_body(c)?;
        let lines = c.expect_number()?;
        c.expect(&Token::ListClose)?;
        nested_message = Some(Box::new((envelope_tokens, body, lines)));
    } else if is_text {
        line_count = Some(c.expect_number()?);
    }

    // Extension data (RFC 3501 §7.4.2 body extension): MD5, disposition, language, location.
    // All optional; stop as soon as we hit the closing paren for this part.
    let mut disposition = None;
    let mut language = Vec::new();
    let mut location = None;
    if c.peek() != Some(&Token::ListClose) {
        let _md5 = c.expect_string_or_nil()?;
        if c.peek() != Some(&Token::ListClose) {
            disposition = parse_disposition(c)?;
            if c.peek() != Some(&Token::ListClose) {
                language = parse_language(c)?;
                if c.peek() != Some(&Token::ListClose) {
                    location = c.expect_string_or_nil()?;
                }
            }
        }
    }

    Ok(BodyStructure::Single {
        media_type,
        media_subtype,
        params,
        content_id,
        description,
        encoding,
        size,
        nested_message,
        line_count,
        disposition,
        language,
        location,
    })
}

fn parse_params(c: &mut Cursor<'_>) -> Result<Option<BodyParams>, ImapClientError> {
    match c.peek() {
        Some(Token::Nil) => {
            c.next();
            Ok(None)
        }
        Some(Token::ListOpen) => {
            c.next();
            let mut pairs = Vec::new();
            while c.peek() != Some(&Token::ListClose) {
                let key = c.expect_string_or_nil()?.unwrap_or_default();
                let value = c.expect_string_or_nil()?.unwrap_or_default();
                pairs.push((key, value));
            }
            c.expect(&Token::ListClose)?;
            Ok(Some(BodyParams(pairs)))
        }
        other => Err(ImapClientError::new(format!("expected param list or NIL, got {:?}", other))),
    }
}

fn parse_disposition(c: &mut Cursor<'_>) -> Result<Option<BodyDisposition>, ImapClientError> {
    match c.peek() {
        Some(Token::Nil) => {
            c.next();
            Ok(None)
        }
        Some(Token::ListOpen) => {
            c.next();
            let kind = c.expect_string_or_nil()?.unwrap_or_default();
            let params = parse_params(c)?.unwrap_or(BodyParams(Vec::new()));
            c.expect(&Token::ListClose)?;
            Ok(Some(BodyDisposition { kind, params }))
        }
        other => Err(ImapClientError::new(format!("expected disposition list or NIL, got {:?}", other))),
    }
}

fn parse_language(c: &mut Cursor<'_>) -> Result<Vec<String>, ImapClientError> {
    match c.peek() {
        Some(Token::Nil) => {
            c.next();
            Ok(Vec::new())
        }
        Some(Token::ListOpen) => {
            c.next();
            let mut langs = Vec::new();
            while c.peek() != Some(&Token::ListClose) {
                if let Some(s) = c.expect_string_or_nil()? {
                    langs.push(s);
                }
            }
            c.expect(&Token::ListClose)?;
            Ok(langs)
        }
        Some(Token::QuotedString(s)) | Some(Token::Atom(s)) => {
            let s = s.clone();
            c.next();
            Ok(vec![s])
        }
        other => Err(ImapClientError::new(format!("expected language, got {:?}", other))),
    }
}

fn skip_balanced_list(c: &mut Cursor<'_>) -> Result<(), ImapClientError> {
    let mut depth = 1i32;
    while depth > 0 {
        match c.next() {
            Some(Token::ListOpen) => depth += 1,
            Some(Token::ListClose) => depth -= 1,
            Some(_) => {}
            None => return Err(ImapClientError::new("unbalanced envelope list in message/rfc822 body")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::imap::framer::RawLine;
    use crate::protocol::imap::tokenizer::Tokenizer;

    fn tokens_for(text: &str, literals: Vec<&str>) -> Vec<Token> {
        let line = RawLine { text: text.as_bytes().to_vec(), literals: literals.into_iter().map(|s| s.as_bytes().to_vec()).collect() };
        Tokenizer::new(&line).collect_all().unwrap()
    }

    #[test]
    fn parses_simple_text_plain() {
        let toks = tokens_for(r#"("TEXT" "PLAIN" ("CHARSET" "UTF-8") NIL NIL "7BIT" 1234 42)"#, vec![]);
        match parse(&toks).unwrap() {
            BodyStructure::Single { media_type, media_subtype, encoding, size, line_count, .. } => {
                assert_eq!(media_type, "TEXT");
                assert_eq!(media_subtype, "PLAIN");
                assert_eq!(encoding, "7BIT");
                assert_eq!(size, 1234);
                assert_eq!(line_count, Some(42));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_multipart_mixed_with_two_children() {
        let toks = tokens_for(
            r#"(("TEXT" "PLAIN" NIL NIL NIL "7BIT" 100 5)("APPLICATION" "PDF" NIL NIL NIL "BASE64" 2000) "MIXED")"#,
            vec![],
        );
        match parse(&toks).unwrap() {
            BodyStructure::Multipart { parts, subtype, .. } => {
                assert_eq!(subtype, "MIXED");
                assert_eq!(parts.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_with_disposition_and_language() {
        let toks = tokens_for(
            r#"("TEXT" "PLAIN" NIL NIL NIL "7BIT" 10 1 ("ATTACHMENT" ("FILENAME" "a.txt")) ("EN") NIL)"#,
            vec![],
        );
        match parse(&toks).unwrap() {
            BodyStructure::Single { disposition, language, .. } => {
                let d = disposition.expect("disposition");
                assert_eq!(d.kind, "ATTACHMENT");
                assert_eq!(d.params.0, vec![("FILENAME".to_string(), "a.txt".to_string())]);
                assert_eq!(language, vec!["EN".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
