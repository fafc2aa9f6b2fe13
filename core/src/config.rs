/*
 * config.rs
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

//! Scrape configuration, and account passwords in the system keychain
//! (one keyring entry per `user@host`, service "mailsweep").

use std::fmt;
use std::sync::Arc;

use keyring::Entry;

use crate::error::{Result, ScrapeError};
use crate::telemetry::{Telemetry, TracingTelemetry};

/// Sessions opened per scrape unless overridden.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Service name for keyring entries.
const KEYRING_SERVICE: &str = "mailsweep";

#[derive(Clone)]
pub struct ScrapeConfig {
    pool_size: usize,
    workers: Option<usize>,
    telemetry: Arc<dyn Telemetry>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            workers: None,
            telemetry: Arc::new(TracingTelemetry),
        }
    }
}

impl fmt::Debug for ScrapeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapeConfig")
            .field("pool_size", &self.pool_size)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl ScrapeConfig {
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Fixed worker count; must not exceed the pool size. Default is min(pool, 2 x cores).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn workers(&self) -> Option<usize> {
        self.workers
    }

    pub fn telemetry(&self) -> &Arc<dyn Telemetry> {
        &self.telemetry
    }

    /// Reject settings that could only fail later, before any connection is made.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(ScrapeError::Config("pool size must be at least 1".into()));
        }
        match self.workers {
            Some(0) => Err(ScrapeError::Config("worker count must be at least 1".into())),
            Some(w) if w > self.pool_size => Err(ScrapeError::PoolExhausted {
                capacity: self.pool_size,
            }),
            _ => Ok(()),
        }
    }
}

fn keyring_account(user: &str, host: &str) -> String {
    format!("{}@{}", user, host)
}

fn keychain_error(e: keyring::Error) -> ScrapeError {
    ScrapeError::Config(format!("keychain: {}", e))
}

/// Password stored for `user` on `host`, or None if there is no entry.
pub fn keychain_password(user: &str, host: &str) -> Result<Option<String>> {
    let entry = Entry::new(KEYRING_SERVICE, &keyring_account(user, host)).map_err(keychain_error)?;
    match entry.get_password() {
        Ok(p) => Ok(Some(p)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(keychain_error(e)),
    }
}

/// Store (or replace) the password for `user` on `host`.
pub fn set_keychain_password(user: &str, host: &str, password: &str) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, &keyring_account(user, host)).map_err(keychain_error)?;
    entry.set_password(password).map_err(keychain_error)
}
