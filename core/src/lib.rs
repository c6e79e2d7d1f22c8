/*
 * lib.rs
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

//! Core backend for Tagliacarte's mail protocol stack: IMAP4rev1, SMTP/ESMTP, POP3, and the SASL
//! negotiator shared between them, plus MIME/RFC 5322 parsing, the Store/Folder/Transport
//! abstractions the three wire protocols implement, and the credential/config layer under
//! `config`. The byte-stream transport (TLS, STARTTLS upgrade) lives in `net`; the protocols are
//! generic over `AsyncRead + AsyncWrite + Unpin` and do not require it.

pub mod config;
pub mod message_id;
pub mod mime;
pub mod net;
pub mod protocol;
pub mod sasl;
pub mod store;
pub mod uri;
