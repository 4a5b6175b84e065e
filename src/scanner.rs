/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: scanner.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 16:03:55
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-04 17:58:30
 */

use crate::config::ResolvedMailbox;
use crate::reporter::{Decision, process_email};
use crate::traits::{MailConnector, MailSession, Seq, SpamReporter};
use log::warn;
use thiserror::Error;

#[cfg(test)]
#[path = "./scanner_tests.rs"]
mod scanner_tests;

/// Why a mailbox could not be fully scanned.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Unable to open mailbox: {0}")]
    Connect(anyhow::Error),

    #[error("Unable to select junk folder {folder}: {source}")]
    Select {
        folder: String,
        source: anyhow::Error,
    },

    #[error("IMAP error: {0}")]
    Protocol(anyhow::Error),
}

/// Counters for one mailbox scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub messages: u32,
    pub reported: u32,
    pub deferred: u32,
    pub failed: u32,
}

/// Scans the junk folder of one mailbox, reports its messages and purges the
/// ones the reporting service accepted.
///
/// Once connected, the session is always logged out, whatever happened in between.
pub async fn scan_mailbox(
    connector: &dyn MailConnector,
    reporter: &dyn SpamReporter,
    mailbox: &ResolvedMailbox,
    now: i64,
) -> Result<ScanSummary, ScanError> {
    let mut session = connector
        .connect(&mailbox.server, &mailbox.username, &mailbox.password)
        .await
        .map_err(ScanError::Connect)?;

    let result = scan_junk_folder(session.as_mut(), reporter, mailbox, now).await;

    if let Err(e) = session.logout().await {
        warn!("[{}] {}", mailbox.id, e);
    }

    result
}

async fn scan_junk_folder(
    session: &mut dyn MailSession,
    reporter: &dyn SpamReporter,
    mailbox: &ResolvedMailbox,
    now: i64,
) -> Result<ScanSummary, ScanError> {
    let count = session
        .select(&mailbox.junk)
        .await
        .map_err(|source| ScanError::Select {
            folder: mailbox.junk.clone(),
            source,
        })?;

    let mut summary = ScanSummary {
        messages: count,
        ..ScanSummary::default()
    };

    if count > 0 {
        let mut marked: Vec<Seq> = Vec::new();

        let scanned = report_messages(session, reporter, mailbox, now, &mut summary, &mut marked).await;

        // Accepted messages are purged even when the loop stopped early
        let purged = if marked.is_empty() {
            Ok(())
        } else {
            purge(session, &marked).await
        };

        if let Err(e) = scanned {
            if let Err(purge_err) = purged {
                warn!("[{}] {}", mailbox.id, purge_err);
            }
            return Err(e);
        }
        purged?;
    }

    session.close().await.map_err(ScanError::Protocol)?;

    Ok(summary)
}

async fn report_messages(
    session: &mut dyn MailSession,
    reporter: &dyn SpamReporter,
    mailbox: &ResolvedMailbox,
    now: i64,
    summary: &mut ScanSummary,
    marked: &mut Vec<Seq>,
) -> Result<(), ScanError> {
    let seqs = session.search_all().await.map_err(ScanError::Protocol)?;

    for seq in seqs {
        let Some(content) = session.fetch_raw(seq).await.map_err(ScanError::Protocol)? else {
            warn!("[{}] Message {} has no body, skipping", mailbox.id, seq);
            continue;
        };

        let decision = process_email(
            reporter,
            now,
            &content,
            mailbox.delay,
            &mailbox.report_account,
        )
        .await;

        match decision {
            Decision::Reported => {
                summary.reported += 1;
                marked.push(seq);
            }
            Decision::Deferred => summary.deferred += 1,
            Decision::Failed => summary.failed += 1,
        }
    }

    Ok(())
}

async fn purge(session: &mut dyn MailSession, marked: &[Seq]) -> Result<(), ScanError> {
    session
        .mark_deleted(marked)
        .await
        .map_err(ScanError::Protocol)?;
    session.expunge().await.map_err(ScanError::Protocol)
}
