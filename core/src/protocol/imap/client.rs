/*
 * client.rs
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

//! IMAP wire layer: tagged commands, untagged responses with literals, LIST and SEARCH parsing.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Failure of one IMAP exchange, before it is given scrape context.
#[derive(Debug, Error)]
pub enum ImapClientError {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Tagged NO or BAD; carries the raw status line.
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Protocol(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImapStatus {
    Ok,
    No,
    Bad,
}

/// One status-bearing line (untagged `*` or tagged `A0001`).
#[derive(Debug, Clone)]
pub struct ImapLine {
    pub raw: String,
    pub tag: Option<String>,
    pub untagged: bool,
    pub status: Option<ImapStatus>,
}

impl ImapLine {
    pub fn is_ok(&self) -> bool {
        self.status == Some(ImapStatus::Ok)
    }
}

fn parse_status(rest: &str) -> Option<ImapStatus> {
    let word = rest.split_whitespace().next()?;
    if word.eq_ignore_ascii_case("OK") {
        Some(ImapStatus::Ok)
    } else if word.eq_ignore_ascii_case("NO") {
        Some(ImapStatus::No)
    } else if word.eq_ignore_ascii_case("BAD") {
        Some(ImapStatus::Bad)
    } else {
        None
    }
}

/// Parse "* OK ..." or "A001 OK ...". Continuation lines ("+ ...") are untagged without status.
pub fn parse_line(s: &str) -> ImapLine {
    let raw = s.to_string();
    if let Some(rest) = s.strip_prefix('*') {
        return ImapLine {
            raw,
            tag: None,
            untagged: true,
            status: parse_status(rest.trim_start()),
        };
    }
    if s.starts_with('+') {
        return ImapLine {
            raw,
            tag: None,
            untagged: true,
            status: None,
        };
    }
    let mut sp = s.splitn(2, ' ');
    let tag = sp.next().unwrap_or("").to_string();
    let rest = sp.next().unwrap_or("");
    ImapLine {
        raw,
        tag: Some(tag).filter(|t| !t.is_empty()),
        untagged: false,
        status: parse_status(rest),
    }
}

/// Size of a trailing `{N}` literal marker, if the line ends with one.
pub fn literal_size(line: &str) -> Option<usize> {
    let open = line.rfind('{')?;
    let rest = line[open + 1..].strip_suffix('}')?;
    rest.trim().trim_end_matches('+').parse().ok()
}

/// One logical response: the line text (continuations after each literal appended) and its literals.
#[derive(Debug, Clone)]
pub struct ImapResponse {
    pub line: ImapLine,
    pub literals: Vec<Vec<u8>>,
}

async fn read_raw_line<S>(stream: &mut S, buf: &mut Vec<u8>) -> io::Result<String>
where
    S: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = stream.read_until(b'\n', buf).await?;
    if n == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"));
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(buf).into_owned())
}

/// Largest literal accepted from the server.
pub const MAX_LITERAL_SIZE: usize = 256 * 1024 * 1024;

const LITERAL_CHUNK_SIZE: usize = 64 * 1024;

/// Read an `n` byte literal in chunks, so the buffer only grows as data arrives.
async fn read_literal<S>(stream: &mut S, n: usize) -> io::Result<Vec<u8>>
where
    S: AsyncBufRead + Unpin,
{
    if n > MAX_LITERAL_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("literal of {} bytes exceeds limit of {}", n, MAX_LITERAL_SIZE),
        ));
    }
    let mut literal = Vec::with_capacity(n.min(LITERAL_CHUNK_SIZE));
    let mut chunk = vec![0u8; n.min(LITERAL_CHUNK_SIZE)];
    while literal.len() < n {
        let want = chunk.len().min(n - literal.len());
        let got = stream.read(&mut chunk[..want]).await?;
        if got == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed in literal"));
        }
        literal.extend_from_slice(&chunk[..got]);
    }
    Ok(literal)
}

/// Read one response; any `{N}` literal is read in full and the line continues after it.
/// Only the segment read last can announce another literal.
pub async fn read_response<S>(stream: &mut S, buf: &mut Vec<u8>) -> io::Result<ImapResponse>
where
    S: AsyncBufRead + Unpin,
{
    let mut text = read_raw_line(stream, buf).await?;
    let mut literals = Vec::new();
    let mut pending = literal_size(&text);
    while let Some(n) = pending {
        literals.push(read_literal(stream, n).await?);
        let segment = read_raw_line(stream, buf).await?;
        pending = literal_size(&segment);
        text.push_str(&segment);
    }
    Ok(ImapResponse {
        line: parse_line(&text),
        literals,
    })
}

/// Write a line then CRLF.
pub async fn write_line<S>(stream: &mut S, line: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(line).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await?;
    Ok(())
}

/// Send a tagged command and read until its tagged completion.
/// Returns the untagged responses and the final tagged line; the caller checks the status.
pub async fn send_command<S>(
    stream: &mut S,
    read_buf: &mut Vec<u8>,
    command: &str,
) -> Result<(Vec<ImapResponse>, ImapLine), ImapClientError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let tag = next_tag();
    let verb = command.split(' ').next().unwrap_or(command);
    if verb.eq_ignore_ascii_case("LOGIN") {
        tracing::debug!(%tag, "> LOGIN ***");
    } else {
        tracing::debug!(%tag, "> {}", command);
    }
    let full = format!("{} {}", tag, command);
    write_line(stream, full.as_bytes()).await?;

    let mut untagged = Vec::new();
    loop {
        let resp = read_response(stream, read_buf).await?;
        if !resp.line.untagged && resp.line.tag.as_deref() == Some(tag.as_str()) {
            return Ok((untagged, resp.line));
        }
        untagged.push(resp);
    }
}

/// Like `send_command`, but a NO or BAD completion becomes `Rejected`.
pub async fn send_command_ok<S>(
    stream: &mut S,
    read_buf: &mut Vec<u8>,
    command: &str,
) -> Result<Vec<ImapResponse>, ImapClientError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let (untagged, final_line) = send_command(stream, read_buf, command).await?;
    if final_line.is_ok() {
        Ok(untagged)
    } else {
        Err(ImapClientError::Rejected(final_line.raw))
    }
}

/// Generate next tag (A0001, A0002, ...).
fn next_tag() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed) % 9999 + 1;
    format!("A{:04}", n)
}

pub fn quote_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Read the server greeting. PREAUTH is accepted as well as OK.
pub async fn read_greeting<S>(stream: &mut S, read_buf: &mut Vec<u8>) -> Result<String, ImapClientError>
where
    S: AsyncBufRead + Unpin,
{
    let resp = read_response(stream, read_buf).await?;
    let raw = resp.line.raw;
    if !raw.starts_with("* OK") && !raw.starts_with("* PREAUTH") {
        return Err(ImapClientError::Protocol(format!("expected * OK greeting, got: {}", raw)));
    }
    Ok(raw)
}

/// Capability words from "* CAPABILITY ..." or a "[CAPABILITY ...]" response code.
pub fn parse_capabilities(line: &str) -> Vec<String> {
    let s = line
        .strip_prefix("* CAPABILITY ")
        .or_else(|| {
            line.find("[CAPABILITY ")
                .map(|i| &line[i + 12..])
                .and_then(|t| t.split(']').next())
        })
        .unwrap_or("");
    s.split_whitespace().map(|w| w.to_uppercase()).collect()
}

pub fn has_capability(capabilities: &[String], name: &str) -> bool {
    capabilities.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// Parsed LIST response entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub attributes: Vec<String>,
    pub delimiter: Option<char>,
    pub name: String,
}

impl ListEntry {
    pub fn is_selectable(&self) -> bool {
        !self.attributes.iter().any(|a| a.eq_ignore_ascii_case("\\Noselect"))
    }
}

pub fn parse_list_line(line: &str) -> Option<ListEntry> {
    let rest = line.strip_prefix("* LIST ")?.trim_start();
    let (attributes, rest) = parse_list_attrs(rest)?;
    let is_nil = rest.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("NIL"));
    let (delimiter, rest) = if is_nil {
        (None, &rest[3..])
    } else if let Some(quoted) = rest.strip_prefix('"') {
        let (d, tail) = if let Some(escaped) = quoted.strip_prefix('\\') {
            (escaped.chars().next(), escaped.get(1..)?)
        } else {
            (quoted.chars().next(), quoted.get(1..)?)
        };
        (d, tail.strip_prefix('"')?)
    } else {
        return None;
    };
    let rest = rest.trim_start();
    let name = if let Some(quoted) = rest.strip_prefix('"') {
        let mut name = String::new();
        let mut chars = quoted.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => name.push(chars.next()?),
                '"' => break,
                c => name.push(c),
            }
        }
        name
    } else {
        rest.split_whitespace().next()?.to_string()
    };
    Some(ListEntry {
        attributes,
        delimiter,
        name,
    })
}

fn parse_list_attrs(s: &str) -> Option<(Vec<String>, &str)> {
    let s = s.strip_prefix('(')?;
    let end = s.find(')')?;
    let attrs = s[..end].split_whitespace().map(|w| w.to_string()).collect();
    Some((attrs, s[end + 1..].trim_start()))
}

/// LIST entry from a whole response. A mailbox name sent as a literal is taken from the literal.
pub fn parse_list_response(response: &ImapResponse) -> Option<ListEntry> {
    let mut entry = parse_list_line(&response.line.raw)?;
    let name_is_literal = entry.name.starts_with('{') && literal_size(&entry.name).is_some();
    if name_is_literal {
        let literal = response.literals.last()?;
        entry.name = String::from_utf8_lossy(literal).into_owned();
    }
    Some(entry)
}

/// Numbers from "* SEARCH 1 2 3". An empty result is "* SEARCH".
pub fn parse_search_line(line: &str) -> Option<Vec<String>> {
    let rest = line.strip_prefix("* SEARCH")?;
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some(rest.split_whitespace().map(|s| s.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn parse_tagged_and_untagged() {
        let line = parse_line("A0001 OK LOGIN completed");
        assert_eq!(line.tag.as_deref(), Some("A0001"));
        assert!(line.is_ok());
        assert!(!line.untagged);

        let line = parse_line("* NO [ALERT] quota");
        assert!(line.untagged);
        assert_eq!(line.status, Some(ImapStatus::No));

        let line = parse_line("A0002 BAD unknown command");
        assert_eq!(line.status, Some(ImapStatus::Bad));

        let line = parse_line("+ go ahead");
        assert!(line.untagged);
        assert!(line.status.is_none());
    }

    #[test]
    fn literal_marker() {
        assert_eq!(literal_size("* 1 FETCH (RFC822 {342}"), Some(342));
        assert_eq!(literal_size("A1 LOGIN {5+}"), Some(5));
        assert_eq!(literal_size("* 1 FETCH (FLAGS (\\Seen))"), None);
    }

    #[test]
    fn list_lines() {
        let e = parse_list_line(r#"* LIST (\HasNoChildren) "/" "INBOX""#).unwrap();
        assert_eq!(e.name, "INBOX");
        assert_eq!(e.delimiter, Some('/'));
        assert!(e.is_selectable());

        let e = parse_list_line(r#"* LIST (\HasChildren \Noselect) "/" "[Gmail]""#).unwrap();
        assert_eq!(e.name, "[Gmail]");
        assert!(!e.is_selectable());

        let e = parse_list_line(r#"* LIST () NIL Archive"#).unwrap();
        assert_eq!(e.name, "Archive");
        assert_eq!(e.delimiter, None);

        let e = parse_list_line(r#"* LIST () "\\" "Work \"2024\"""#).unwrap();
        assert_eq!(e.delimiter, Some('\\'));
        assert_eq!(e.name, "Work \"2024\"");

        assert!(parse_list_line("* LSUB () \"/\" INBOX").is_none());
    }

    #[test]
    fn search_lines() {
        assert_eq!(parse_search_line("* SEARCH 1 2 3"), Some(vec!["1".into(), "2".into(), "3".into()]));
        assert_eq!(parse_search_line("* SEARCH"), Some(vec![]));
        assert_eq!(parse_search_line("* SEARCHRES 1"), None);
    }

    #[test]
    fn capabilities() {
        let caps = parse_capabilities("* OK [CAPABILITY IMAP4rev1 STARTTLS AUTH=PLAIN] ready");
        assert_eq!(caps, vec!["IMAP4REV1", "STARTTLS", "AUTH=PLAIN"]);
        assert!(has_capability(&caps, "starttls"));
        assert!(parse_capabilities("* OK ready").is_empty());
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_string(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[tokio::test]
    async fn response_with_literal() {
        let data = b"* 1 FETCH (RFC822 {5}\r\nhello)\r\nA0001 OK done\r\n";
        let mut reader = BufReader::new(&data[..]);
        let mut buf = Vec::new();
        let resp = read_response(&mut reader, &mut buf).await.unwrap();
        assert!(resp.line.untagged);
        assert_eq!(resp.literals, vec![b"hello".to_vec()]);
        assert_eq!(resp.line.raw, "* 1 FETCH (RFC822 {5})");
        let resp = read_response(&mut reader, &mut buf).await.unwrap();
        assert!(resp.line.is_ok());
        assert!(read_response(&mut reader, &mut buf).await.is_err());
    }

    #[tokio::test]
    async fn literal_followed_by_empty_line() {
        let data = b"* LIST () \"/\" {4}\r\nWork\r\nA0001 OK LIST done\r\n";
        let mut reader = BufReader::new(&data[..]);
        let mut buf = Vec::new();
        let resp = read_response(&mut reader, &mut buf).await.unwrap();
        assert_eq!(resp.line.raw, "* LIST () \"/\" {4}");
        assert_eq!(resp.literals, vec![b"Work".to_vec()]);
        let entry = parse_list_response(&resp).unwrap();
        assert_eq!(entry.name, "Work");
        assert_eq!(entry.delimiter, Some('/'));

        let resp = read_response(&mut reader, &mut buf).await.unwrap();
        assert_eq!(resp.line.tag.as_deref(), Some("A0001"));
        assert!(resp.line.is_ok());
    }

    #[tokio::test]
    async fn several_literals_in_one_response() {
        let data = b"* 1 FETCH (BODY[HEADER] {3}\r\nabc BODY[TEXT] {2}\r\nxy)\r\nA0002 OK done\r\n";
        let mut reader = BufReader::new(&data[..]);
        let mut buf = Vec::new();
        let resp = read_response(&mut reader, &mut buf).await.unwrap();
        assert_eq!(resp.literals, vec![b"abc".to_vec(), b"xy".to_vec()]);
        assert_eq!(resp.line.raw, "* 1 FETCH (BODY[HEADER] {3} BODY[TEXT] {2})");
        let resp = read_response(&mut reader, &mut buf).await.unwrap();
        assert!(resp.line.is_ok());
    }

    #[tokio::test]
    async fn literal_containing_a_marker_is_not_reread() {
        let data = b"* 1 FETCH (RFC822 {5}\r\n{99}\r\n)\r\nA0003 OK done\r\n";
        let mut reader = BufReader::new(&data[..]);
        let mut buf = Vec::new();
        let resp = read_response(&mut reader, &mut buf).await.unwrap();
        assert_eq!(resp.literals, vec![b"{99}\r".to_vec()]);
        let resp = read_response(&mut reader, &mut buf).await.unwrap();
        assert_eq!(resp.line.raw, ")");
    }

    #[tokio::test]
    async fn oversized_literal_is_refused() {
        let data = b"* 1 FETCH (RFC822 {18446744073709551615}\r\nhello)\r\n";
        let mut reader = BufReader::new(&data[..]);
        let mut buf = Vec::new();
        let err = read_response(&mut reader, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn truncated_literal_is_eof() {
        let data = b"* 1 FETCH (RFC822 {10}\r\nhello";
        let mut reader = BufReader::new(&data[..]);
        let mut buf = Vec::new();
        let err = read_response(&mut reader, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn list_response_without_literal_uses_line() {
        let resp = ImapResponse {
            line: parse_line(r#"* LIST (\HasNoChildren) "/" "INBOX""#),
            literals: Vec::new(),
        };
        assert_eq!(parse_list_response(&resp).unwrap().name, "INBOX");
    }
}
