/*
 * tokenizer.rs
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

//! Tokenizes the text of a [`RawLine`](super::framer::RawLine) into IMAP tokens: atoms, numbers,
//! quoted strings, literals (already inlined by the framer), NIL, and parenthesized/bracketed
//! lists. This is a flat token stream; `response.rs` groups tokens into the actual response
//! grammar (tagged/untagged status, response codes, FETCH data items, etc).

use super::ImapClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Atom(String),
    Number(u64),
    QuotedString(String),
    Literal(Vec<u8>),
    Nil,
    ListOpen,
    ListClose,
    BracketOpen,
    BracketClose,
}

pub struct Tokenizer<'a> {
    text: &'a [u8],
    literals: std::slice::Iter<'a, Vec<u8>>,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(line: &'a super::framer::RawLine) -> Self {
        Self { text: &line.text, literals: line.literals.iter(), pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.get(self.pos).copied()
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, ImapClientError> {
        self.skip_spaces();
        let Some(c) = self.peek() else { return Ok(None) };
        match c {
            b'(' => {
                self.pos += 1;
                Ok(Some(Token::ListOpen))
            }
            b')' => {
                self.pos += 1;
                Ok(Some(Token::ListClose))
            }
            b'[' => {
                self.pos += 1;
                Ok(Some(Token::BracketOpen))
            }
            b']' => {
                self.pos += 1;
                Ok(Some(Token::BracketClose))
            }
            b'"' => self.read_quoted(),
            0x00 => {
                self.pos += 1;
                let bytes = self
                    .literals
                    .next()
                    .ok_or_else(|| ImapClientError::new("literal placeholder without matching literal payload"))?
                    .clone();
                Ok(Some(Token::Literal(bytes)))
            }
            _ => self.read_atom_like(),
        }
    }

    fn read_quoted(&mut self) -> Result<Option<Token>, ImapClientError> {
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(ImapClientError::new("unterminated quoted string")),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b) => {
                            out.push(b as char);
                            self.pos += 1;
                        }
                        None => return Err(ImapClientError::new("unterminated quoted string escape")),
                    }
                }
                Some(b) => {
                    out.push(b as char);
                    self.pos += 1;
                }
            }
        }
        Ok(Some(Token::QuotedString(out)))
    }

    fn read_atom_like(&mut self) -> Result<Option<Token>, ImapClientError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b'(' | b')' | b'[' | b']' | b'"' | 0x00) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(ImapClientError::new("unexpected byte in response"));
        }
        let raw = &self.text[start..self.pos];
        let s = String::from_utf8_lossy(raw).into_owned();
        if s.eq_ignore_ascii_case("NIL") {
            return Ok(Some(Token::Nil));
        }
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = s.parse::<u64>() {
                return Ok(Some(Token::Number(n)));
            }
        }
        Ok(Some(Token::Atom(s)))
    }

    /// Collect all remaining tokens.
    pub fn collect_all(mut self) -> Result<Vec<Token>, ImapClientError> {
        let mut out = Vec::new();
        while let Some(tok) = self.next_token()? {
            out.push(tok);
        }
        Ok(out)
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&mut self) -> Result<Option<Token>, ImapClientError> {
        let saved_pos = self.pos;
        let saved_literals = self.literals.clone();
        let next = self.next_token()?;
        self.pos = saved_pos;
        self.literals = saved_literals;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::super::framer::RawLine;
    use super::*;

    fn line(text: &str, literals: Vec<&str>) -> RawLine {
        RawLine { text: text.as_bytes().to_vec(), literals: literals.into_iter().map(|s| s.as_bytes().to_vec()).collect() }
    }

    #[test]
    fn tokenizes_flags_list() {
        let l = line(r#"* 1 FETCH (FLAGS (\Seen \Answered) UID 5)"#, vec![]);
        let toks = Tokenizer::new(&l).collect_all().unwrap();
        assert!(toks.contains(&Token::Atom("FLAGS".to_string())));
        assert!(toks.contains(&Token::Number(5)));
        assert!(toks.contains(&Token::Atom(r"\Seen".to_string())));
    }

    #[test]
    fn tokenizes_quoted_string_with_escape() {
        let l = line(r#""hello \"world\"""#, vec![]);
        let toks = Tokenizer::new(&l).collect_all().unwrap();
        assert_eq!(toks, vec![Token::QuotedString(r#"hello "world""#.to_string())]);
    }

    #[test]
    fn tokenizes_nil() {
        let l = line("(NIL NIL)", vec![]);
        let toks = Tokenizer::new(&l).collect_all().unwrap();
        assert_eq!(toks, vec![Token::ListOpen, Token::Nil, Token::Nil, Token::ListClose]);
    }

    #[test]
    fn tokenizes_literal_placeholder_against_literal_payload() {
        // BODY[] is tokenized as Atom + bracket pair; response.rs reassembles section specifiers.
        let l = line("(BODY[] \x00)", vec!["hello"]);
        let toks = Tokenizer::new(&l).collect_all().unwrap();
        assert_eq!(
            toks,
            vec![
                Token::ListOpen,
                Token::Atom("BODY".to_string()),
                Token::BracketOpen,
                Token::BracketClose,
                Token::Literal(b"hello".to_vec()),
                Token::ListClose
            ]
        );
    }
}
