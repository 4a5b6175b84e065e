use crate::config::{ReportAccount, ServerConfig};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::fmt;

/// Sequence number of a message inside the selected folder.
pub type Seq = u32;

/// An authenticated connection to one mail server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailSession: Send {
    /// Selects a folder and returns the number of messages it holds
    async fn select(&mut self, folder: &str) -> anyhow::Result<u32>;

    /// Sequence numbers of every message in the selected folder, ascending
    async fn search_all(&mut self) -> anyhow::Result<Vec<Seq>>;

    /// Full RFC822 content, `None` when the server returned no body
    async fn fetch_raw(&mut self, seq: Seq) -> anyhow::Result<Option<Vec<u8>>>;

    async fn mark_deleted(&mut self, seqs: &[Seq]) -> anyhow::Result<()>;

    async fn expunge(&mut self) -> anyhow::Result<()>;

    async fn close(&mut self) -> anyhow::Result<()>;

    async fn logout(&mut self) -> anyhow::Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Connects and authenticates
    async fn connect(
        &self,
        server: &ServerConfig,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Box<dyn MailSession>>;
}

/// Result of one submission to the reporting service.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    Accepted(StatusCode),
    Rejected(StatusCode),
    Timeout(String),
    Connection(String),
}

impl ReportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ReportOutcome::Accepted(_))
    }
}

impl fmt::Display for ReportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportOutcome::Accepted(status) => write!(f, "accepted [code: {}]", status.as_u16()),
            ReportOutcome::Rejected(status) => write!(
                f,
                "Sending the spam report failed [code: {}]",
                status.as_u16()
            ),
            ReportOutcome::Timeout(e) => write!(f, "Spam report timed out: {}", e),
            ReportOutcome::Connection(e) => write!(f, "Spam report connection error: {}", e),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpamReporter: Send + Sync {
    /// Submits a raw message on behalf of a report account
    async fn report(&self, account: &ReportAccount, content: &[u8]) -> ReportOutcome;
}
