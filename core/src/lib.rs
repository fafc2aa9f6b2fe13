/*
 * lib.rs
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


//! Mailsweep core: concurrent bulk retrieval of every message in an IMAP account.
//!
//! A `Scraper` opens a fixed pool of authenticated sessions, lists message ids for each
//! mailbox, then fetches every message through a `WorkerPool` that leases one session
//! per task. Results come back in submission order.

pub mod config;
pub mod error;
pub mod message;
pub mod net;
pub mod pool;
pub mod protocol;
pub mod scrape;
pub mod session;
pub mod telemetry;
pub mod testing;
pub mod worker;

pub use config::ScrapeConfig;
pub use error::{Result, ScrapeError};
pub use message::{Mailbox, MessageId, RawMessage};
pub use pool::{SessionLease, SessionPool};
pub use protocol::imap::{ImapConnector, ImapSession, Security};
pub use scrape::{scrape, Scraper};
pub use session::{MailSession, SessionConnector, SessionId};
pub use telemetry::{Telemetry, TracingTelemetry};
pub use worker::{Task, TaskOutput, WorkerPool};
