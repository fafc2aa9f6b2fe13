/*
 * scrape.rs
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

//! Two-phase scrape: list message ids per mailbox, then fetch every message.
//!
//! Both phases go through the same `WorkerPool`, so the mailbox order given (or listed)
//! carries through to the id pairs and from there to the returned messages. Any failure
//! aborts the scrape with that error; messages fetched so far are discarded.

use std::sync::Arc;

use crate::config::ScrapeConfig;
use crate::error::Result;
use crate::message::{Mailbox, MessageId, RawMessage};
use crate::pool::SessionPool;
use crate::protocol::imap::ImapConnector;
use crate::session::{MailSession, SessionConnector};
use crate::worker::{Task, TaskOutput, WorkerPool};

/// Drives one account's scrape over a fresh session pool per call.
pub struct Scraper<C: SessionConnector> {
    connector: C,
    config: ScrapeConfig,
}

impl<C: SessionConnector> Scraper<C> {
    pub fn new(connector: C, config: ScrapeConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Fetch every message of `mailboxes`, or of the account's default mailboxes when None.
    /// Messages are ordered by mailbox, then by the server's id order within each mailbox.
    pub async fn scrape(&self, mailboxes: Option<Vec<Mailbox>>) -> Result<Vec<RawMessage>> {
        self.config.validate()?;
        let pool = Arc::new(SessionPool::connect(self.config.pool_size(), &self.connector).await?);
        let result = self.run(&pool, mailboxes).await;
        pool.close().await;
        match &result {
            Ok(messages) => tracing::info!(messages = messages.len(), "scrape complete"),
            Err(e) => tracing::error!(error = %e, "scrape failed"),
        }
        result
    }

    async fn run(
        &self,
        pool: &Arc<SessionPool<C::Session>>,
        mailboxes: Option<Vec<Mailbox>>,
    ) -> Result<Vec<RawMessage>> {
        let workers = match self.config.workers() {
            Some(w) => WorkerPool::with_workers(Arc::clone(pool), w)?,
            None => WorkerPool::new(Arc::clone(pool)),
        }
        .telemetry(Arc::clone(self.config.telemetry()));

        let mailboxes = match mailboxes {
            Some(m) => m,
            None => {
                let mut lease = pool.acquire()?;
                lease.list_mailboxes().await?
            }
        };
        tracing::info!(mailboxes = mailboxes.len(), workers = workers.workers(), "listing message ids");

        let tasks = mailboxes.into_iter().map(Task::ListMessageIds).collect();
        let listed = workers
            .run(tasks)
            .await?
            .into_iter()
            .map(TaskOutput::into_message_ids)
            .collect::<Result<Vec<_>>>()?;

        let pairs = flatten_message_ids(listed);
        tracing::info!(messages = pairs.len(), "fetching messages");

        let tasks = pairs
            .into_iter()
            .map(|(mailbox, id)| Task::FetchMessage(mailbox, id))
            .collect();
        workers
            .run(tasks)
            .await?
            .into_iter()
            .map(TaskOutput::into_message)
            .collect()
    }
}

/// `[(m1, [a, b]), (m2, [c])]` becomes `[(m1, a), (m1, b), (m2, c)]`.
pub fn flatten_message_ids(listed: Vec<(Mailbox, Vec<MessageId>)>) -> Vec<(Mailbox, MessageId)> {
    listed
        .into_iter()
        .flat_map(|(mailbox, ids)| ids.into_iter().map(move |id| (mailbox.clone(), id)))
        .collect()
}

/// Scrape an IMAPS account with default settings.
pub async fn scrape(
    host: &str,
    user: &str,
    password: &str,
    mailboxes: Option<Vec<Mailbox>>,
) -> Result<Vec<RawMessage>> {
    Scraper::new(ImapConnector::new(host, user, password), ScrapeConfig::default())
        .scrape(mailboxes)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_keeps_mailbox_then_id_order() {
        let listed = vec![
            (Mailbox::from("INBOX"), vec![MessageId::from(1), MessageId::from(2)]),
            (Mailbox::from("Empty"), vec![]),
            (Mailbox::from("Sent"), vec![MessageId::from(3)]),
        ];
        let flat = flatten_message_ids(listed);
        assert_eq!(
            flat,
            vec![
                (Mailbox::from("INBOX"), MessageId::from(1)),
                (Mailbox::from("INBOX"), MessageId::from(2)),
                (Mailbox::from("Sent"), MessageId::from(3)),
            ]
        );
    }

    #[test]
    fn flatten_empty() {
        assert!(flatten_message_ids(Vec::new()).is_empty());
    }
}
