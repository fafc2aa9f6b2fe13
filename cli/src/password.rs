/*
 * password.rs
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

//! Where the account password comes from: --password or MAILSWEEP_PASSWORD first,
//! then the system keychain if --keychain was given.

use anyhow::{bail, Result};

use crate::cli::Cli;

pub fn resolve_password(cli: &Cli) -> Result<String> {
    resolve(cli.password.as_deref(), cli.keychain, || {
        Ok(mailsweep_core::config::keychain_password(&cli.username, &cli.host)?)
    })
}

fn resolve<F>(given: Option<&str>, keychain: bool, lookup: F) -> Result<String>
where
    F: FnOnce() -> Result<Option<String>>,
{
    if let Some(password) = given {
        return Ok(password.to_string());
    }
    if keychain {
        if let Some(password) = lookup()? {
            tracing::debug!("password from keychain");
            return Ok(password);
        }
        bail!("no keychain entry; pass --password once with --store-keychain");
    }
    bail!("no password: use --password, set MAILSWEEP_PASSWORD, or pass --keychain")
}

/// Save the password given on the command line, if asked to.
pub fn store_password(cli: &Cli) -> Result<()> {
    if !cli.store_keychain {
        return Ok(());
    }
    let Some(password) = cli.password.as_deref() else {
        bail!("--store-keychain needs --password or MAILSWEEP_PASSWORD");
    };
    mailsweep_core::config::set_keychain_password(&cli.username, &cli.host, password)?;
    tracing::info!(user = %cli.username, host = %cli.host, "password stored in keychain");
    Ok(())
}
