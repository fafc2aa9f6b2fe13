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

//! Command-line front end: parse flags, resolve the password, scrape, write the file.

pub mod cli;
pub mod logging;
pub mod output;
pub mod password;

use std::time::Instant;

use anyhow::Context;
use mailsweep_core::Scraper;

use crate::cli::Cli;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let password = password::resolve_password(&cli)?;
    password::store_password(&cli)?;

    let started = Instant::now();
    let scraper = Scraper::new(cli.connector(&password), cli.config());
    let messages = scraper
        .scrape(cli.mailboxes())
        .await
        .with_context(|| format!("scraping {}@{}", cli.username, cli.host))?;

    output::write_messages(&cli.output_file, cli.format, &messages)?;
    tracing::info!(
        messages = messages.len(),
        output = %cli.output_file.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "wrote messages"
    );
    Ok(())
}
