/*
 * cli.rs
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

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use mailsweep_core::config::DEFAULT_POOL_SIZE;
use mailsweep_core::protocol::imap::{DEFAULT_RESERVED_MARKER, IMAPS_PORT, IMAP_PORT};
use mailsweep_core::{ImapConnector, Mailbox, ScrapeConfig, Security};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "mailsweep")]
#[command(about = "Download every message in an IMAP account to a single file")]
#[command(version)]
pub struct Cli {
    /// IMAP server host name
    pub host: String,

    /// Account user name
    pub username: String,

    /// Account password
    #[arg(long, env = "MAILSWEEP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Look the password up in the system keychain when not given
    #[arg(long)]
    pub keychain: bool,

    /// Save the given password in the system keychain
    #[arg(long)]
    pub store_keychain: bool,

    /// Server port (default 993, or 143 without implicit TLS)
    #[arg(long)]
    pub port: Option<u16>,

    /// How the connection is secured
    #[arg(long, value_enum, default_value = "implicit")]
    pub security: CliSecurity,

    /// Mailboxes to scrape (default: every selectable mailbox outside the reserved namespace)
    #[arg(short, long, num_args = 1.., value_name = "MAILBOX")]
    pub mailboxes: Vec<String>,

    /// Number of concurrent sessions to open
    #[arg(short, long, default_value_t = DEFAULT_POOL_SIZE)]
    pub connections: usize,

    /// Number of workers (default: min(connections, 2 x cores))
    #[arg(long)]
    pub workers: Option<usize>,

    /// Mailbox prefix excluded from the default mailbox set
    #[arg(long, default_value = DEFAULT_RESERVED_MARKER)]
    pub reserved_marker: String,

    /// Where to write the messages
    #[arg(short, long, value_name = "PATH", default_value = "mailsweep.mbox")]
    pub output_file: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "mbox")]
    pub format: OutputFormat,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Connection security (clap-compatible enum)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CliSecurity {
    /// TLS from connect (IMAPS)
    #[default]
    Implicit,
    /// Upgrade a plain connection with STARTTLS
    Starttls,
    /// No TLS
    Plain,
}

impl From<CliSecurity> for Security {
    fn from(s: CliSecurity) -> Self {
        match s {
            CliSecurity::Implicit => Security::Implicit,
            CliSecurity::Starttls => Security::StartTls,
            CliSecurity::Plain => Security::Plain,
        }
    }
}

impl Cli {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.security {
            CliSecurity::Implicit => IMAPS_PORT,
            CliSecurity::Starttls | CliSecurity::Plain => IMAP_PORT,
        })
    }

    /// None means "list the account's mailboxes".
    pub fn mailboxes(&self) -> Option<Vec<Mailbox>> {
        if self.mailboxes.is_empty() {
            None
        } else {
            Some(self.mailboxes.iter().map(|m| Mailbox::from(m.as_str())).collect())
        }
    }

    pub fn connector(&self, password: &str) -> ImapConnector {
        ImapConnector::new(&self.host, &self.username, password)
            .port(self.port())
            .security(self.security.into())
            .reserved_marker(&self.reserved_marker)
    }

    pub fn config(&self) -> ScrapeConfig {
        let config = ScrapeConfig::default().with_pool_size(self.connections);
        match self.workers {
            Some(w) => config.with_workers(w),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["mailsweep", "imap.example.com", "alice"]).unwrap();
        assert_eq!(cli.host, "imap.example.com");
        assert_eq!(cli.username, "alice");
        assert_eq!(cli.port(), IMAPS_PORT);
        assert_eq!(cli.security, CliSecurity::Implicit);
        assert_eq!(cli.connections, DEFAULT_POOL_SIZE);
        assert_eq!(cli.reserved_marker, "[Gmail]");
        assert_eq!(cli.output_file, PathBuf::from("mailsweep.mbox"));
        assert_eq!(cli.format, OutputFormat::Mbox);
        assert!(cli.mailboxes().is_none());
    }

    #[test]
    fn plain_security_defaults_to_143() {
        let cli = Cli::try_parse_from(["mailsweep", "h", "u", "--security", "starttls"]).unwrap();
        assert_eq!(cli.port(), IMAP_PORT);
        let cli = Cli::try_parse_from(["mailsweep", "h", "u", "--security", "plain", "--port", "1143"]).unwrap();
        assert_eq!(cli.port(), 1143);
    }

    #[test]
    fn mailboxes_and_sizes() {
        let cli = Cli::try_parse_from([
            "mailsweep", "h", "u", "-m", "INBOX", "Sent", "-c", "4", "--workers", "2", "-f", "json",
        ])
        .unwrap();
        assert_eq!(cli.mailboxes(), Some(vec![Mailbox::from("INBOX"), Mailbox::from("Sent")]));
        let config = cli.config();
        assert_eq!(config.pool_size(), 4);
        assert_eq!(config.workers(), Some(2));
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn connector_uses_flags() {
        let cli = Cli::try_parse_from(["mailsweep", "imap.example.com", "alice"]).unwrap();
        let connector = cli.connector("secret");
        assert_eq!(connector.host(), "imap.example.com");
        assert!(!format!("{:?}", connector).contains("secret"));
    }
}
