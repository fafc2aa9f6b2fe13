/*
 * session.rs
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

//! Session capability set: what the pool and workers need from one authenticated connection.
//!
//! A session is stateful (selected mailbox, pending tags) and must only ever be driven
//! by one caller at a time, hence `&mut self` everywhere. Implementations: `ImapSession`
//! over the network and `testing::FakeSession` in memory.

use async_trait::async_trait;

use crate::error::Result;
use crate::message::{Mailbox, MessageId, RawMessage};

/// Diagnostic identity of a pooled session, 0..N-1.
pub type SessionId = usize;

#[async_trait]
pub trait MailSession: Send + 'static {
    fn id(&self) -> SessionId;

    /// Mailboxes to scrape by default; reserved provider folders are left out.
    async fn list_mailboxes(&mut self) -> Result<Vec<Mailbox>>;

    /// Ids of every message in `mailbox`, in server order. The mailbox is echoed back.
    async fn list_message_ids(&mut self, mailbox: &Mailbox) -> Result<(Mailbox, Vec<MessageId>)>;

    /// Full message by id. Selects `mailbox` first if it is not already selected.
    async fn fetch_message(&mut self, mailbox: &Mailbox, id: &MessageId) -> Result<RawMessage>;

    async fn logout(&mut self) -> Result<()>;
}

/// Creates authenticated sessions, one per pool slot.
#[async_trait]
pub trait SessionConnector: Send + Sync + 'static {
    type Session: MailSession;

    /// Connect and log in. Rejected credentials are `Authentication`, transport failures `Connection`.
    async fn connect(&self, id: SessionId) -> Result<Self::Session>;
}

/// True if a raw mailbox name belongs to the provider's reserved namespace (e.g. "[Gmail]/Trash").
pub fn is_reserved(name: &str, marker: &str) -> bool {
    !marker.is_empty() && name.contains(marker)
}
