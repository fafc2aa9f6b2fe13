/*
 * message.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Mailsweep, a bulk mailbox retrieval tool.
 *
 * Mailsweep is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Mailsweep is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Mailsweep.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Mailbox names, message ids and fetched messages.

use std::fmt;

use chrono::{DateTime, Utc};
use mailparse::{MailHeaderMap, MailParseError, ParsedMail};

/// Mailbox (folder) name as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mailbox(String);

impl Mailbox {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Mailbox {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Mailbox {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Server-assigned message id. Only meaningful together with the mailbox it was listed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<u32> for MessageId {
    fn from(n: u32) -> Self {
        Self(n.to_string())
    }
}

/// One fetched message: RFC 822 bytes plus where it came from.
/// Never modified after the fetch that produced it.
#[derive(Debug, Clone)]
pub struct RawMessage {
    mailbox: Mailbox,
    id: MessageId,
    bytes: Vec<u8>,
}

impl RawMessage {
    pub fn new(mailbox: Mailbox, id: MessageId, bytes: Vec<u8>) -> Self {
        Self { mailbox, id, bytes }
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Parse headers and MIME structure. Borrows the message bytes.
    pub fn parsed(&self) -> Result<ParsedMail<'_>, MailParseError> {
        mailparse::parse_mail(&self.bytes)
    }

    /// Sender address from the From header, lowercased, without display name.
    pub fn sender(&self) -> Option<String> {
        let parsed = self.parsed().ok()?;
        let from = parsed.headers.get_first_value("From")?;
        Some(normalize_address(&from))
    }

    pub fn subject(&self) -> Option<String> {
        let parsed = self.parsed().ok()?;
        parsed.headers.get_first_value("Subject")
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        let parsed = self.parsed().ok()?;
        let value = parsed.headers.get_first_value("Date")?;
        let ts = mailparse::dateparse(&value).ok()?;
        DateTime::<Utc>::from_timestamp(ts, 0)
    }

    /// First non-empty text/plain part, depth first.
    pub fn plain_body(&self) -> Option<String> {
        let parsed = self.parsed().ok()?;
        first_plain_part(&parsed)
    }
}

fn first_plain_part(part: &ParsedMail<'_>) -> Option<String> {
    if part.subparts.is_empty() {
        if !part.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
            return None;
        }
        let body = part.get_body().ok()?;
        return if body.trim().is_empty() { None } else { Some(body) };
    }
    part.subparts.iter().find_map(first_plain_part)
}

/// Lowercase and keep only the address inside angle brackets, if present.
pub fn normalize_address(from: &str) -> String {
    let lower = from.to_lowercase();
    if let Some(open) = lower.find('<') {
        if let Some(len) = lower[open + 1..].find('>') {
            return lower[open + 1..open + 1 + len].trim().to_string();
        }
    }
    lower.trim().to_string()
}
