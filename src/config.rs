/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: config.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 10:12:41
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-04 18:06:12
 */

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid configuration file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("No configuration loaded from {0}")]
    Empty(String),

    #[error("Mailbox {mailbox} references unknown server {server}")]
    UnknownServer { mailbox: String, server: String },

    #[error("Mailbox {mailbox} references unknown signal spam account {account}")]
    UnknownReportAccount { mailbox: String, account: String },
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub config: GlobalConfig,
    pub servers: HashMap<String, ServerConfig>,
    pub accounts: AccountsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalConfig {
    pub signal_spam_url: String,
    pub user_agent: UserAgentConfig,
    pub log_file: Option<String>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub quiet: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserAgentConfig {
    pub agent: String,
    /// Request timeout in seconds, fractions allowed.
    pub timeout: f64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    pub imap: String,
    pub port: u16,
    pub ssl: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ReportAccount {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccountsConfig {
    pub signal_spam: HashMap<String, ReportAccount>,
    // Kept as a list so accounts are checked in file order
    #[serde(deserialize_with = "ordered_map")]
    pub mailbox: Vec<(String, MailboxConfig)>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailboxConfig {
    pub enabled: bool,
    pub server: String,
    pub username: String,
    pub password: String,
    pub junk: String,
    pub signal_spam_account: String,
    /// Minimum age in seconds before a message is reported.
    #[serde(default)]
    pub delay: Option<u64>,
}

/// A mailbox with its server and report account references looked up.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMailbox {
    pub id: String,
    pub server: ServerConfig,
    pub username: String,
    pub password: String,
    pub junk: String,
    pub delay: Option<u64>,
    pub report_account: ReportAccount,
}

fn ordered_map<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct OrderedMapVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<T> {
        type Value = Vec<(String, T)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of mailbox accounts")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, value)) = access.next_entry()? {
                entries.push((key, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
}

impl AppConfig {
    // Load config from a JSON file, read once at startup
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        Self::from_json(&content, &display)
    }

    fn from_json(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|source| ConfigError::Parse {
                path: origin.to_string(),
                source,
            })?;

        let is_empty = match &value {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if is_empty {
            return Err(ConfigError::Empty(origin.to_string()));
        }

        // Deserialize from the text again, `Value` maps do not keep key order
        serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn enabled_mailboxes(&self) -> impl Iterator<Item = (&str, &MailboxConfig)> {
        self.accounts
            .mailbox
            .iter()
            .filter(|(_, mailbox)| mailbox.enabled)
            .map(|(id, mailbox)| (id.as_str(), mailbox))
    }

    pub fn resolve_mailbox(
        &self,
        id: &str,
        mailbox: &MailboxConfig,
    ) -> Result<ResolvedMailbox, ConfigError> {
        let server = self
            .servers
            .get(&mailbox.server)
            .ok_or_else(|| ConfigError::UnknownServer {
                mailbox: id.to_string(),
                server: mailbox.server.clone(),
            })?;

        let report_account = self
            .accounts
            .signal_spam
            .get(&mailbox.signal_spam_account)
            .ok_or_else(|| ConfigError::UnknownReportAccount {
                mailbox: id.to_string(),
                account: mailbox.signal_spam_account.clone(),
            })?;

        Ok(ResolvedMailbox {
            id: id.to_string(),
            server: server.clone(),
            username: mailbox.username.clone(),
            password: mailbox.password.clone(),
            junk: mailbox.junk.clone(),
            delay: mailbox.delay,
            report_account: report_account.clone(),
        })
    }
}
