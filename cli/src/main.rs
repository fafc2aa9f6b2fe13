/*
 * main.rs
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

use clap::Parser;
use mailsweep_cli::{cli::Cli, logging};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Err(err) = mailsweep_cli::run(cli).await {
        error!(error = %format!("{err:#}"), "mailsweep failed");
        std::process::exit(1);
    }
}
