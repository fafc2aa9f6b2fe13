/*
 * mod.rs
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

//! IMAP4rev1 session: LOGIN, LIST, SELECT, SEARCH ALL, FETCH RFC822, LOGOUT.
//! One session owns one connection; the pool hands it to one worker at a time.

mod client;

pub use client::{
    parse_line, parse_list_line, parse_list_response, parse_search_line, ImapClientError, ImapLine,
    ImapResponse, ImapStatus, ListEntry, MAX_LITERAL_SIZE,
};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};

use crate::error::{Result, ScrapeError};
use crate::message::{Mailbox, MessageId, RawMessage};
use crate::net::Transport;
use crate::session::{is_reserved, MailSession, SessionConnector, SessionId};
use client::{
    has_capability, parse_capabilities, quote_string, read_greeting, send_command,
    send_command_ok,
};

pub const IMAPS_PORT: u16 = 993;
pub const IMAP_PORT: u16 = 143;

/// Provider namespace excluded from the default mailbox set.
pub const DEFAULT_RESERVED_MARKER: &str = "[Gmail]";

/// How the connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// TLS from the first byte (IMAPS).
    #[default]
    Implicit,
    /// Plain connect, then STARTTLS; fails if the server does not offer it.
    StartTls,
    /// No TLS. For local test servers only.
    Plain,
}

/// Connection parameters shared by every session of a pool.
#[derive(Clone)]
pub struct ImapConnector {
    host: String,
    port: u16,
    security: Security,
    user: String,
    password: String,
    reserved_marker: String,
}

impl std::fmt::Debug for ImapConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl ImapConnector {
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: IMAPS_PORT,
            security: Security::Implicit,
            user: user.into(),
            password: password.into(),
            reserved_marker: DEFAULT_RESERVED_MARKER.to_string(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    pub fn reserved_marker(mut self, marker: impl Into<String>) -> Self {
        self.reserved_marker = marker.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn connect_starttls(&self, id: SessionId) -> Result<ImapSession<Transport>> {
        let io_err = |e| ScrapeError::connection(&self.host, e);
        let plain = Transport::connect_plain(&self.host, self.port).await.map_err(io_err)?;
        let mut stream = BufStream::new(plain);
        let mut read_buf = Vec::with_capacity(4096);
        read_greeting(&mut stream, &mut read_buf)
            .await
            .map_err(|e| setup_error(&self.host, e))?;
        let caps = capabilities(&mut stream, &mut read_buf, None)
            .await
            .map_err(|e| setup_error(&self.host, e))?;
        if !has_capability(&caps, "STARTTLS") {
            return Err(ScrapeError::Protocol(format!("{} does not offer STARTTLS", self.host)));
        }
        send_command_ok(&mut stream, &mut read_buf, "STARTTLS")
            .await
            .map_err(|e| setup_error(&self.host, e))?;
        let tls = stream.into_inner().upgrade_to_tls(&self.host).await.map_err(io_err)?;
        let mut stream = BufStream::new(tls);
        let caps = capabilities(&mut stream, &mut read_buf, None)
            .await
            .map_err(|e| setup_error(&self.host, e))?;
        ImapSession::authenticate(id, stream, read_buf, caps, self).await
    }
}

#[async_trait]
impl SessionConnector for ImapConnector {
    type Session = ImapSession<Transport>;

    async fn connect(&self, id: SessionId) -> Result<Self::Session> {
        tracing::debug!(session = id, host = %self.host, port = self.port, security = ?self.security, "connecting");
        let transport = match self.security {
            Security::Implicit => Transport::connect_implicit_tls(&self.host, self.port).await,
            Security::Plain => Transport::connect_plain(&self.host, self.port).await,
            Security::StartTls => return self.connect_starttls(id).await,
        };
        let transport = transport.map_err(|e| ScrapeError::connection(&self.host, e))?;
        tracing::debug!(session = id, tls = transport.is_tls(), "connected");
        ImapSession::establish(id, transport, self).await
    }
}

fn setup_error(host: &str, e: ImapClientError) -> ScrapeError {
    match e {
        ImapClientError::Io(source) => ScrapeError::connection(host, source),
        ImapClientError::Rejected(raw) | ImapClientError::Protocol(raw) => ScrapeError::Protocol(raw),
    }
}

/// Capabilities from the greeting's response code, or by asking.
async fn capabilities<S>(
    stream: &mut BufStream<S>,
    read_buf: &mut Vec<u8>,
    greeting: Option<&str>,
) -> std::result::Result<Vec<String>, ImapClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(line) = greeting {
        let caps = parse_capabilities(line);
        if !caps.is_empty() {
            return Ok(caps);
        }
    }
    let untagged = send_command_ok(stream, read_buf, "CAPABILITY").await?;
    Ok(untagged
        .iter()
        .find(|r| r.line.raw.starts_with("* CAPABILITY "))
        .map(|r| parse_capabilities(&r.line.raw))
        .unwrap_or_default())
}

/// Authenticated IMAP session over any byte stream.
pub struct ImapSession<S = Transport> {
    id: SessionId,
    stream: BufStream<S>,
    read_buf: Vec<u8>,
    host: String,
    capabilities: Vec<String>,
    selected: Option<Mailbox>,
    reserved_marker: String,
}

impl<S> ImapSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Read the greeting on a freshly opened stream and log in.
    pub async fn establish(id: SessionId, stream: S, connector: &ImapConnector) -> Result<Self> {
        let mut stream = BufStream::new(stream);
        let mut read_buf = Vec::with_capacity(4096);
        let greeting = read_greeting(&mut stream, &mut read_buf)
            .await
            .map_err(|e| setup_error(&connector.host, e))?;
        let caps = capabilities(&mut stream, &mut read_buf, Some(&greeting))
            .await
            .map_err(|e| setup_error(&connector.host, e))?;
        Self::authenticate(id, stream, read_buf, caps, connector).await
    }

    async fn authenticate(
        id: SessionId,
        mut stream: BufStream<S>,
        mut read_buf: Vec<u8>,
        capabilities: Vec<String>,
        connector: &ImapConnector,
    ) -> Result<Self> {
        let cmd = format!("LOGIN {} {}", quote_string(&connector.user), quote_string(&connector.password));
        let (_, final_line) = send_command(&mut stream, &mut read_buf, &cmd)
            .await
            .map_err(|e| setup_error(&connector.host, e))?;
        if !final_line.is_ok() {
            return Err(ScrapeError::Authentication {
                user: connector.user.clone(),
                reason: final_line.raw,
            });
        }
        tracing::debug!(session = id, host = %connector.host, "logged in");
        Ok(Self {
            id,
            stream,
            read_buf,
            host: connector.host.clone(),
            capabilities,
            selected: None,
            reserved_marker: connector.reserved_marker.clone(),
        })
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn selected(&self) -> Option<&Mailbox> {
        self.selected.as_ref()
    }

    fn error(&self, mailbox: &Mailbox, e: ImapClientError) -> ScrapeError {
        match e {
            ImapClientError::Io(source) => ScrapeError::connection(&self.host, source),
            ImapClientError::Rejected(raw) => ScrapeError::fetch(mailbox.as_str(), raw),
            ImapClientError::Protocol(msg) => ScrapeError::Protocol(msg),
        }
    }

    /// LIST "" "*" with every entry the server reports.
    pub async fn list_entries(&mut self) -> Result<Vec<ListEntry>> {
        let untagged = send_command_ok(&mut self.stream, &mut self.read_buf, r#"LIST "" "*""#)
            .await
            .map_err(|e| match e {
                ImapClientError::Io(source) => ScrapeError::connection(&self.host, source),
                other => ScrapeError::Protocol(other.to_string()),
            })?;
        Ok(untagged
            .iter()
            .filter_map(parse_list_response)
            .collect())
    }

    async fn ensure_selected(&mut self, mailbox: &Mailbox) -> Result<()> {
        if self.selected.as_ref() == Some(mailbox) {
            return Ok(());
        }
        self.selected = None;
        let cmd = format!("SELECT {}", quote_string(mailbox.as_str()));
        send_command_ok(&mut self.stream, &mut self.read_buf, &cmd)
            .await
            .map_err(|e| self.error(mailbox, e))?;
        self.selected = Some(mailbox.clone());
        Ok(())
    }
}

#[async_trait]
impl<S> MailSession for ImapSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn id(&self) -> SessionId {
        self.id
    }

    async fn list_mailboxes(&mut self) -> Result<Vec<Mailbox>> {
        let entries = self.list_entries().await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.is_selectable() && !is_reserved(&e.name, &self.reserved_marker))
            .map(|e| Mailbox::new(e.name))
            .collect())
    }

    async fn list_message_ids(&mut self, mailbox: &Mailbox) -> Result<(Mailbox, Vec<MessageId>)> {
        self.ensure_selected(mailbox).await?;
        let untagged = send_command_ok(&mut self.stream, &mut self.read_buf, "SEARCH ALL")
            .await
            .map_err(|e| self.error(mailbox, e))?;
        let ids = untagged
            .iter()
            .filter_map(|r| parse_search_line(&r.line.raw))
            .flatten()
            .map(MessageId::new)
            .collect();
        Ok((mailbox.clone(), ids))
    }

    async fn fetch_message(&mut self, mailbox: &Mailbox, id: &MessageId) -> Result<RawMessage> {
        if id.as_str().is_empty() || !id.as_str().bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScrapeError::fetch(mailbox.as_str(), format!("invalid message id {:?}", id.as_str())));
        }
        self.ensure_selected(mailbox).await?;
        let cmd = format!("FETCH {} (RFC822)", id);
        let untagged = send_command_ok(&mut self.stream, &mut self.read_buf, &cmd)
            .await
            .map_err(|e| self.error(mailbox, e))?;
        let body = untagged
            .into_iter()
            .filter(|r| r.line.raw.contains(" FETCH ("))
            .find_map(|r| r.literals.into_iter().next())
            .ok_or_else(|| ScrapeError::fetch(mailbox.as_str(), format!("FETCH {} returned no message body", id)))?;
        Ok(RawMessage::new(mailbox.clone(), id.clone(), body))
    }

    async fn logout(&mut self) -> Result<()> {
        let result = send_command(&mut self.stream, &mut self.read_buf, "LOGOUT").await;
        self.selected = None;
        let _ = self.stream.shutdown().await;
        match result {
            Ok(_) => Ok(()),
            Err(ImapClientError::Io(source)) => Err(ScrapeError::connection(&self.host, source)),
            Err(e) => Err(ScrapeError::Protocol(e.to_string())),
        }
    }
}
