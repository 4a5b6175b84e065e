/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: reporter.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 14:20:17
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-04 17:51:09
 */

use crate::config::{GlobalConfig, ReportAccount};
use crate::traits::{ReportOutcome, SpamReporter};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use log::{error, info, warn};
use mail_parser::MessageParser;
use reqwest::{Client, StatusCode};
use std::time::Duration;

#[cfg(test)]
#[path = "./reporter_tests.rs"]
mod reporter_tests;

/// What happened to a single junk message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Too recent, left in place for a later run.
    Deferred,
    Reported,
    Failed,
}

/// Sender and date of a message, as found in its headers.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageInfo {
    pub sender: String,
    /// `Date` header as written in the message.
    pub date: String,
    /// Send time in seconds since the epoch, timezone offset applied.
    pub timestamp: Option<i64>,
}

impl MessageInfo {
    pub fn parse(raw: &[u8]) -> Self {
        let Some(message) = MessageParser::default().parse(raw) else {
            return Self {
                sender: "unknown".to_string(),
                date: "unknown".to_string(),
                timestamp: None,
            };
        };

        let sender = message
            .from()
            .and_then(|from| from.first())
            .and_then(|addr| addr.address().or_else(|| addr.name()))
            .unwrap_or("unknown")
            .to_string();

        let date = message
            .header_raw("Date")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            sender,
            date,
            timestamp: message.date().map(|d| d.to_timestamp()),
        }
    }
}

/// Decides whether a junk message is old enough and, if so, reports it.
///
/// `now` is seconds since the epoch. With no `delay`, every message is reported.
pub async fn process_email(
    reporter: &dyn SpamReporter,
    now: i64,
    raw: &[u8],
    delay: Option<u64>,
    account: &ReportAccount,
) -> Decision {
    let info = MessageInfo::parse(raw);

    if let Some(delay) = delay {
        let Some(timestamp) = info.timestamp else {
            warn!(
                "Spam from {} has no usable Date header, keeping it for now",
                info.sender
            );
            return Decision::Deferred;
        };

        let delay = i64::try_from(delay).unwrap_or(i64::MAX);
        if now.saturating_sub(timestamp) < delay {
            return Decision::Deferred;
        }
    }

    info!("Spam report: {} sent on {}", info.sender, info.date);

    let outcome = reporter.report(account, raw).await;
    if outcome.is_success() {
        Decision::Reported
    } else {
        error!("{}", outcome);
        Decision::Failed
    }
}

/// Submits messages to the Signal Spam reporting endpoint.
pub struct SignalSpamReporter {
    client: Client,
    url: String,
}

impl SignalSpamReporter {
    pub fn new(config: &GlobalConfig) -> anyhow::Result<Self> {
        let timeout = Duration::try_from_secs_f64(config.user_agent.timeout).map_err(|e| {
            anyhow::anyhow!(
                "Invalid HTTP timeout {}: {}",
                config.user_agent.timeout,
                e
            )
        })?;

        let client = Client::builder()
            .user_agent(config.user_agent.agent.as_str())
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            url: config.signal_spam_url.clone(),
        })
    }
}

#[async_trait]
impl SpamReporter for SignalSpamReporter {
    async fn report(&self, account: &ReportAccount, content: &[u8]) -> ReportOutcome {
        let encoded = general_purpose::STANDARD.encode(content);

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&account.username, Some(&account.password))
            .form(&[("message", encoded)])
            .send()
            .await;

        match response {
            Ok(response) => match response.status() {
                status @ (StatusCode::OK | StatusCode::ACCEPTED) => ReportOutcome::Accepted(status),
                status => ReportOutcome::Rejected(status),
            },
            Err(e) if e.is_timeout() => ReportOutcome::Timeout(e.to_string()),
            Err(e) => ReportOutcome::Connection(e.to_string()),
        }
    }
}
