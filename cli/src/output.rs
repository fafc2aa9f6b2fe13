/*
 * output.rs
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

//! Writing scraped messages: mboxrd, or a JSON array of records.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use mailsweep_core::RawMessage;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// mboxrd, one "From " separated entry per message
    #[default]
    Mbox,
    /// JSON array with base64 message bodies
    Json,
}

/// Sender used in the mbox separator when the From header is missing or unusable.
const UNKNOWN_SENDER: &str = "MAILER-DAEMON";

#[derive(Debug, Serialize)]
pub struct MessageRecord {
    pub mailbox: String,
    pub id: String,
    pub sender: Option<String>,
    pub date: Option<String>,
    pub subject: Option<String>,
    pub raw: String,
}

impl From<&RawMessage> for MessageRecord {
    fn from(m: &RawMessage) -> Self {
        Self {
            mailbox: m.mailbox().to_string(),
            id: m.id().to_string(),
            sender: m.sender(),
            date: m.date().map(|d| d.to_rfc3339()),
            subject: m.subject(),
            raw: BASE64.encode(m.bytes()),
        }
    }
}

/// Create (or truncate) `path` and write `messages` to it.
pub fn write_messages(path: &Path, format: OutputFormat, messages: &[RawMessage]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    match format {
        OutputFormat::Mbox => write_mbox(&mut out, messages),
        OutputFormat::Json => write_json(&mut out, messages),
    }
    .and_then(|()| out.flush())
    .with_context(|| format!("cannot write {}", path.display()))
}

pub fn write_mbox<W: Write>(out: &mut W, messages: &[RawMessage]) -> io::Result<()> {
    for message in messages {
        let sender = message
            .sender()
            .filter(|s| !s.is_empty() && !s.contains(char::is_whitespace))
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
        let date = message.date().unwrap_or_default();
        writeln!(out, "From {} {}", sender, asctime(&date))?;
        let bytes = message.bytes();
        for line in bytes.split_inclusive(|&b| b == b'\n') {
            if is_from_line(line) {
                out.write_all(b">")?;
            }
            match line.strip_suffix(b"\r\n") {
                Some(content) => {
                    out.write_all(content)?;
                    out.write_all(b"\n")?;
                }
                None => out.write_all(line)?,
            }
        }
        if !bytes.is_empty() && !bytes.ends_with(b"\n") {
            out.write_all(b"\n")?;
        }
        out.write_all(b"\n")?;
    }
    Ok(())
}

pub fn write_json<W: Write>(out: &mut W, messages: &[RawMessage]) -> io::Result<()> {
    let records: Vec<MessageRecord> = messages.iter().map(MessageRecord::from).collect();
    serde_json::to_writer_pretty(&mut *out, &records)?;
    out.write_all(b"\n")
}

fn asctime(date: &DateTime<Utc>) -> String {
    date.format("%a %b %e %H:%M:%S %Y").to_string()
}

/// `From `, optionally preceded by any number of `>`.
fn is_from_line(line: &[u8]) -> bool {
    let unquoted = line.iter().position(|&b| b != b'>').map_or(&[][..], |i| &line[i..]);
    unquoted.starts_with(b"From ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailsweep_core::{Mailbox, MessageId};

    fn message(id: u32, raw: &str) -> RawMessage {
        RawMessage::new(Mailbox::from("INBOX"), MessageId::from(id), raw.as_bytes().to_vec())
    }

    fn mbox(messages: &[RawMessage]) -> String {
        let mut out = Vec::new();
        write_mbox(&mut out, messages).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn from_lines_detected_through_quoting() {
        assert!(is_from_line(b"From me\n"));
        assert!(is_from_line(b">From me\n"));
        assert!(is_from_line(b">>From me\n"));
        assert!(!is_from_line(b"From: me\n"));
        assert!(!is_from_line(b" From me\n"));
        assert!(!is_from_line(b">>>"));
    }

    #[test]
    fn mbox_separator_and_quoting() {
        let raw = "From: Alice <Alice@Example.com>\r\nDate: Mon, 6 Jan 2025 09:00:05 +0000\r\nSubject: hi\r\n\r\nFrom here\r\n>From there\r\nbye\r\n";
        let text = mbox(&[message(1, raw)]);
        assert_eq!(
            text,
            "From alice@example.com Mon Jan  6 09:00:05 2025\n\
             From: Alice <Alice@Example.com>\n\
             Date: Mon, 6 Jan 2025 09:00:05 +0000\n\
             Subject: hi\n\
             \n\
             >From here\n\
             >>From there\n\
             bye\n\
             \n"
        );
    }

    #[test]
    fn mbox_without_headers_uses_placeholder_sender() {
        let text = mbox(&[message(1, "no headers here")]);
        assert!(text.starts_with("From MAILER-DAEMON Thu Jan  1 00:00:00 1970\n"));
        assert!(text.ends_with("no headers here\n\n"));
    }

    #[test]
    fn mbox_keeps_message_order() {
        let a = message(1, "Subject: a\r\n\r\nfirst\r\n");
        let b = message(2, "Subject: b\r\n\r\nsecond\r\n");
        let text = mbox(&[a, b]);
        let first = text.find("first").unwrap();
        let second = text.find("second").unwrap();
        assert!(first < second);
        assert_eq!(text.matches("\nFrom ").count() + usize::from(text.starts_with("From ")), 2);
    }

    #[test]
    fn json_records() {
        let raw = "From: Bob <bob@example.com>\r\nSubject: report\r\nDate: Tue, 7 Jan 2025 10:00:00 +0000\r\n\r\nbody\r\n";
        let mut out = Vec::new();
        write_json(&mut out, &[message(7, raw)]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let record = &value.as_array().unwrap()[0];
        assert_eq!(record["mailbox"], "INBOX");
        assert_eq!(record["id"], "7");
        assert_eq!(record["sender"], "bob@example.com");
        assert_eq!(record["subject"], "report");
        assert_eq!(record["date"], "2025-01-07T10:00:00+00:00");
        let decoded = BASE64.decode(record["raw"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, raw.as_bytes());
    }

    #[test]
    fn write_messages_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mbox");
        write_messages(&path, OutputFormat::Mbox, &[message(1, "Subject: x\r\n\r\ny\r\n")]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("From MAILER-DAEMON "));
        assert!(text.contains("Subject: x\n"));
    }

    #[test]
    fn write_messages_reports_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.json");
        let err = write_messages(&path, OutputFormat::Json, &[]).unwrap_err();
        assert!(err.to_string().contains("cannot create"));
    }
}
