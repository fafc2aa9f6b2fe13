/*
 * error.rs
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

//! Scrape errors. Every failure reaches the caller of a scrape as one of these.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Server rejected the credentials.
    #[error("login rejected for {user}: {reason}")]
    Authentication { user: String, reason: String },

    /// TCP, TLS or stream failure talking to the server.
    #[error("connection to {host} failed")]
    Connection {
        host: String,
        #[source]
        source: io::Error,
    },

    /// SELECT, SEARCH or FETCH did not complete with OK.
    #[error("fetch from mailbox {mailbox} failed: {reason}")]
    Fetch { mailbox: String, reason: String },

    /// More concurrent leases requested than the pool holds.
    #[error("session pool exhausted (capacity {capacity})")]
    PoolExhausted { capacity: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Server sent something we could not make sense of.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A worker task panicked or was aborted.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl ScrapeError {
    pub fn fetch(mailbox: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            mailbox: mailbox.into(),
            reason: reason.into(),
        }
    }

    pub fn connection(host: impl Into<String>, source: io::Error) -> Self {
        Self::Connection {
            host: host.into(),
            source,
        }
    }

    /// True for failures that happen before any pool work can begin.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            ScrapeError::Authentication { .. } | ScrapeError::Connection { .. } | ScrapeError::Config(_)
        )
    }
}
