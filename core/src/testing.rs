/*
 * testing.rs
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

//! Deterministic in-memory sessions for tests.
//!
//! A `FakeServer` holds scripted mailboxes and failure injections and is shared (cheap
//! clone) between the test and every `FakeSession` a `FakeConnector` creates. It also
//! counts concurrent calls, so tests can check that no more sessions are busy than the
//! pool holds and that no session is ever driven by two callers at once.
//!
//! ```ignore
//! let server = FakeServer::new().mailbox("INBOX", [1, 2]).mailbox("Sent", [3]);
//! let scraper = Scraper::new(FakeConnector::new(server.clone()), ScrapeConfig::default().with_pool_size(2));
//! let messages = scraper.scrape(None).await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, ScrapeError};
use crate::message::{Mailbox, MessageId, RawMessage};
use crate::protocol::imap::DEFAULT_RESERVED_MARKER;
use crate::session::{is_reserved, MailSession, SessionConnector, SessionId};

#[derive(Default)]
struct ServerState {
    /// Mailbox name and its messages (id, RFC 822 bytes), in listing order.
    mailboxes: Vec<(String, Vec<(String, Vec<u8>)>)>,
    failing_fetch: HashSet<(String, String)>,
    failing_search: HashSet<String>,
    slow: HashMap<(String, String), Duration>,
    delay: Duration,
    busy: HashSet<SessionId>,
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    max_active: AtomicUsize,
    overlaps: AtomicUsize,
    calls: AtomicUsize,
    logouts: AtomicUsize,
}

/// Scripted mail account shared by every fake session.
#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
    counters: Arc<Counters>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a mailbox with generated messages for `ids`.
    pub fn mailbox(self, name: &str, ids: impl IntoIterator<Item = u32>) -> Self {
        let messages = ids
            .into_iter()
            .map(|id| (id.to_string(), generated_message(name, id)))
            .collect();
        self.state().mailboxes.push((name.to_string(), messages));
        self
    }

    /// Add (or replace) one message with explicit content. Creates the mailbox if needed.
    pub fn message(self, mailbox: &str, id: &str, raw: &str) -> Self {
        {
            let mut state = self.state();
            let index = match state.mailboxes.iter().position(|(n, _)| n == mailbox) {
                Some(i) => i,
                None => {
                    state.mailboxes.push((mailbox.to_string(), Vec::new()));
                    state.mailboxes.len() - 1
                }
            };
            let messages = &mut state.mailboxes[index].1;
            match messages.iter_mut().find(|(i, _)| i == id) {
                Some(entry) => entry.1 = raw.as_bytes().to_vec(),
                None => messages.push((id.to_string(), raw.as_bytes().to_vec())),
            }
        }
        self
    }

    pub fn fail_fetch(self, mailbox: &str, id: u32) -> Self {
        self.state().failing_fetch.insert((mailbox.to_string(), id.to_string()));
        self
    }

    pub fn fail_search(self, mailbox: &str) -> Self {
        self.state().failing_search.insert(mailbox.to_string());
        self
    }

    /// Delay applied to every call.
    pub fn delay(self, delay: Duration) -> Self {
        self.state().delay = delay;
        self
    }

    /// Extra delay for fetching one message.
    pub fn slow(self, mailbox: &str, id: u32, delay: Duration) -> Self {
        self.state().slow.insert((mailbox.to_string(), id.to_string()), delay);
        self
    }

    /// Highest number of sessions that were inside a call at the same time.
    pub fn max_active(&self) -> usize {
        self.counters.max_active.load(Ordering::SeqCst)
    }

    /// Calls that started on a session already inside another call. Should stay 0.
    pub fn overlaps(&self) -> usize {
        self.counters.overlaps.load(Ordering::SeqCst)
    }

    /// Mailbox, search and fetch calls made so far.
    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.counters.logouts.load(Ordering::SeqCst)
    }

    async fn enter(&self, session: SessionId, extra: Duration) -> CallGuard {
        let counters = &self.counters;
        counters.calls.fetch_add(1, Ordering::SeqCst);
        let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_active.fetch_max(active, Ordering::SeqCst);
        let delay = {
            let mut state = self.state();
            if !state.busy.insert(session) {
                counters.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            state.delay + extra
        };
        let guard = CallGuard {
            server: self.clone(),
            session,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        guard
    }
}

/// Marks the end of a call when dropped.
struct CallGuard {
    server: FakeServer,
    session: SessionId,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.server.state().busy.remove(&self.session);
        self.server.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn generated_message(mailbox: &str, id: u32) -> Vec<u8> {
    format!(
        "From: Sender {id} <sender{id}@example.com>\r\nSubject: {mailbox} #{id}\r\nDate: Mon, 6 Jan 2025 09:00:{sec:02} +0000\r\n\r\nMessage {id} in {mailbox}.\r\n",
        sec = id % 60
    )
    .into_bytes()
}

/// Connector for fake sessions, with optional connect and login failures.
#[derive(Clone)]
pub struct FakeConnector {
    server: FakeServer,
    reject_login: bool,
    fail_connect: Option<SessionId>,
    reserved_marker: String,
}

impl FakeConnector {
    pub fn new(server: FakeServer) -> Self {
        Self {
            server,
            reject_login: false,
            fail_connect: None,
            reserved_marker: DEFAULT_RESERVED_MARKER.to_string(),
        }
    }

    /// Every login is rejected.
    pub fn reject_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Connecting session `id` fails with a transport error.
    pub fn fail_connect(mut self, id: SessionId) -> Self {
        self.fail_connect = Some(id);
        self
    }

    pub fn reserved_marker(mut self, marker: &str) -> Self {
        self.reserved_marker = marker.to_string();
        self
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, id: SessionId) -> Result<FakeSession> {
        if self.fail_connect == Some(id) {
            return Err(ScrapeError::connection(
                "fake.invalid",
                io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            ));
        }
        if self.reject_login {
            return Err(ScrapeError::Authentication {
                user: "fake".into(),
                reason: "NO [AUTHENTICATIONFAILED] Invalid credentials".into(),
            });
        }
        Ok(FakeSession {
            id,
            server: self.server.clone(),
            selected: None,
            reserved_marker: self.reserved_marker.clone(),
        })
    }
}

pub struct FakeSession {
    id: SessionId,
    server: FakeServer,
    selected: Option<Mailbox>,
    reserved_marker: String,
}

impl FakeSession {
    fn select(&mut self, mailbox: &Mailbox) -> Result<()> {
        let exists = self
            .server
            .state()
            .mailboxes
            .iter()
            .any(|(name, _)| name == mailbox.as_str());
        if !exists {
            self.selected = None;
            return Err(ScrapeError::fetch(mailbox.as_str(), "NO Mailbox doesn't exist"));
        }
        self.selected = Some(mailbox.clone());
        Ok(())
    }

    pub fn selected(&self) -> Option<&Mailbox> {
        self.selected.as_ref()
    }
}

#[async_trait]
impl MailSession for FakeSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn list_mailboxes(&mut self) -> Result<Vec<Mailbox>> {
        let _call = self.server.enter(self.id, Duration::ZERO).await;
        let state = self.server.state();
        Ok(state
            .mailboxes
            .iter()
            .filter(|(name, _)| !is_reserved(name, &self.reserved_marker))
            .map(|(name, _)| Mailbox::new(name.clone()))
            .collect())
    }

    async fn list_message_ids(&mut self, mailbox: &Mailbox) -> Result<(Mailbox, Vec<MessageId>)> {
        let _call = self.server.enter(self.id, Duration::ZERO).await;
        self.select(mailbox)?;
        let state = self.server.state();
        if state.failing_search.contains(mailbox.as_str()) {
            return Err(ScrapeError::fetch(mailbox.as_str(), "NO SEARCH failed"));
        }
        let ids = state
            .mailboxes
            .iter()
            .find(|(name, _)| name == mailbox.as_str())
            .map(|(_, messages)| messages.iter().map(|(id, _)| MessageId::new(id.clone())).collect())
            .unwrap_or_default();
        Ok((mailbox.clone(), ids))
    }

    async fn fetch_message(&mut self, mailbox: &Mailbox, id: &MessageId) -> Result<RawMessage> {
        let key = (mailbox.to_string(), id.to_string());
        let extra = self.server.state().slow.get(&key).copied().unwrap_or_default();
        let _call = self.server.enter(self.id, extra).await;
        if self.selected.as_ref() != Some(mailbox) {
            self.select(mailbox)?;
        }
        let state = self.server.state();
        if state.failing_fetch.contains(&key) {
            return Err(ScrapeError::fetch(mailbox.as_str(), format!("NO FETCH {} failed", id)));
        }
        let bytes = state
            .mailboxes
            .iter()
            .find(|(name, _)| name == mailbox.as_str())
            .and_then(|(_, messages)| messages.iter().find(|(i, _)| i == id.as_str()))
            .map(|(_, raw)| raw.clone())
            .ok_or_else(|| ScrapeError::fetch(mailbox.as_str(), format!("no message {}", id)))?;
        Ok(RawMessage::new(mailbox.clone(), id.clone(), bytes))
    }

    async fn logout(&mut self) -> Result<()> {
        self.server.counters.logouts.fetch_add(1, Ordering::SeqCst);
        self.selected = None;
        Ok(())
    }
}
