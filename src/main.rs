/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: main.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 09:41:06
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-04 18:11:47
 */

mod config;
mod imap_session;
mod pid_file;
mod reporter;
mod scanner;
mod traits;

use clap::Parser;
use config::{AppConfig, DEFAULT_CONFIG_FILE, GlobalConfig};
use imap_session::ImapConnector;
use log::{debug, error, info};
use pid_file::PidFile;
use reporter::SignalSpamReporter;
use scanner::scan_mailbox;
use std::io::Write;
use traits::{MailConnector, SpamReporter};

struct MultiWriter {
    writers: Vec<Box<dyn Write + Send + 'static>>,
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for w in &mut self.writers {
            let _ = w.write(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        for w in &mut self.writers {
            let _ = w.flush();
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,
}

// Falls back to info level on stderr when no configuration could be loaded
fn initialize_logger(config: Option<&GlobalConfig>) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();

    match config.and_then(|c| c.log_level.as_ref()) {
        Some(level) => {
            builder.parse_filters(level);
        }
        None => {
            builder.filter_level(log::LevelFilter::Info);
        }
    }

    let quiet = config.is_some_and(|c| c.quiet);

    if let Some(log_file) = config.and_then(|c| c.log_file.as_ref()) {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", log_file, e))?;

        if quiet {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        } else {
            let multi_writer = MultiWriter {
                writers: vec![Box::new(file), Box::new(std::io::stderr())],
            };
            builder.target(env_logger::Target::Pipe(Box::new(multi_writer)));
        }
    } else if quiet {
        builder.target(env_logger::Target::Pipe(Box::new(std::io::sink())));
    }

    builder.init();
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RunSummary {
    checked: usize,
    failed: usize,
}

/// Checks every enabled mailbox in turn. A failing account is logged and
/// never stops the others.
async fn run(
    connector: &dyn MailConnector,
    reporter: &dyn SpamReporter,
    config: &AppConfig,
    now: fn() -> i64,
) -> RunSummary {
    let mut summary = RunSummary::default();

    for (id, mailbox) in config.enabled_mailboxes() {
        info!("Check email account id={}", id);
        summary.checked += 1;

        let mailbox = match config.resolve_mailbox(id, mailbox) {
            Ok(mailbox) => mailbox,
            Err(e) => {
                error!("[{}] {}", id, e);
                summary.failed += 1;
                continue;
            }
        };

        match scan_mailbox(connector, reporter, &mailbox, now()).await {
            Ok(scan) => info!(
                "[{}] {} messages in {}: {} reported, {} deferred, {} failed",
                id, scan.messages, mailbox.junk, scan.reported, scan.deferred, scan.failed
            ),
            Err(e) => {
                error!("[{}] {}", id, e);
                summary.failed += 1;
            }
        }
    }

    summary
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loaded = AppConfig::load(&args.config);
    initialize_logger(loaded.as_ref().ok().map(|c| &c.config))?;

    let Some(pid_file) = PidFile::acquire(PidFile::default_path())? else {
        error!("Another instance of Signal Spam is running!");
        return Ok(());
    };
    debug!("Holding pid file {}", pid_file.path().display());

    match loaded {
        Ok(config) => match SignalSpamReporter::new(&config.config) {
            Ok(reporter) => {
                info!("Configuration loaded, start Signal Spam");
                let summary = run(&ImapConnector, &reporter, &config, unix_now).await;
                info!(
                    "Checked {} accounts, {} failed",
                    summary.checked, summary.failed
                );
            }
            Err(e) => error!("{}", e),
        },
        Err(e) => error!("{}", e),
    }

    info!("Stop Signal Spam");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountsConfig, MailboxConfig, ReportAccount, ServerConfig, UserAgentConfig};
    use crate::traits::{MockMailConnector, MockMailSession, MockSpamReporter};
    use std::collections::HashMap;

    fn fixed_now() -> i64 {
        1_770_973_200
    }

    fn mailbox(server: &str, enabled: bool) -> MailboxConfig {
        MailboxConfig {
            enabled,
            server: server.to_string(),
            username: format!("user@{}", server),
            password: "pass".to_string(),
            junk: "Junk".to_string(),
            signal_spam_account: "main".to_string(),
            delay: None,
        }
    }

    fn test_config(mailboxes: Vec<(&str, MailboxConfig)>) -> AppConfig {
        let mut servers = HashMap::new();
        for name in ["first", "second"] {
            servers.insert(
                name.to_string(),
                ServerConfig {
                    imap: format!("imap.{}.test", name),
                    port: 993,
                    ssl: true,
                },
            );
        }

        let mut signal_spam = HashMap::new();
        signal_spam.insert(
            "main".to_string(),
            ReportAccount {
                username: "reporter".to_string(),
                password: "secret".to_string(),
            },
        );

        AppConfig {
            config: GlobalConfig {
                signal_spam_url: "http://localhost/".to_string(),
                user_agent: UserAgentConfig {
                    agent: "test".to_string(),
                    timeout: 1.0,
                },
                log_file: None,
                log_level: None,
                quiet: true,
            },
            servers,
            accounts: AccountsConfig {
                signal_spam,
                mailbox: mailboxes
                    .into_iter()
                    .map(|(id, m)| (id.to_string(), m))
                    .collect(),
            },
        }
    }

    fn empty_session() -> MockMailSession {
        let mut session = MockMailSession::new();
        session.expect_select().times(1).returning(|_| Ok(0));
        session.expect_close().times(1).returning(|| Ok(()));
        session.expect_logout().times(1).returning(|| Ok(()));
        session
    }

    #[tokio::test]
    async fn test_failing_account_does_not_stop_run() {
        let config = test_config(vec![
            ("broken", mailbox("first", true)),
            ("working", mailbox("second", true)),
        ]);

        let mut connector = MockMailConnector::new();
        connector
            .expect_connect()
            .withf(|server, _, _| server.imap == "imap.first.test")
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("Login failed")));
        connector
            .expect_connect()
            .withf(|server, _, _| server.imap == "imap.second.test")
            .times(1)
            .return_once(|_, _, _| Ok(Box::new(empty_session())));

        let reporter = MockSpamReporter::new();

        let summary = run(&connector, &reporter, &config, fixed_now).await;
        assert_eq!(
            summary,
            RunSummary {
                checked: 2,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_server_reference_is_skipped() {
        let config = test_config(vec![
            ("dangling", mailbox("nowhere", true)),
            ("working", mailbox("first", true)),
        ]);

        let mut connector = MockMailConnector::new();
        connector
            .expect_connect()
            .withf(|server, _, _| server.imap == "imap.first.test")
            .times(1)
            .return_once(|_, _, _| Ok(Box::new(empty_session())));

        let reporter = MockSpamReporter::new();

        let summary = run(&connector, &reporter, &config, fixed_now).await;
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_disabled_accounts_are_not_contacted() {
        let config = test_config(vec![("off", mailbox("first", false))]);

        let mut connector = MockMailConnector::new();
        connector.expect_connect().never();

        let reporter = MockSpamReporter::new();

        let summary = run(&connector, &reporter, &config, fixed_now).await;
        assert_eq!(summary, RunSummary::default());
    }

    #[test]
    fn test_default_config_path() {
        let args = Args::parse_from(["signal-spam"]);
        assert_eq!(args.config, "config.json");

        let args = Args::parse_from(["signal-spam", "--config", "/etc/signal-spam.json"]);
        assert_eq!(args.config, "/etc/signal-spam.json");
    }
}
