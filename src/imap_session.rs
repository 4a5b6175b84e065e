use crate::config::ServerConfig;
use crate::traits::{MailConnector, MailSession, Seq};
use async_imap::Session;
use async_imap::types::Fetch;
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use futures::TryStreamExt;
use futures::io::{AsyncRead, AsyncWrite};
use std::fmt::Debug;
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncReadCompatExt;

/// Opens IMAP4 or IMAP4-over-TLS sessions depending on the server's `ssl` flag.
pub struct ImapConnector;

impl ImapConnector {
    async fn login<T>(
        stream: T,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Box<dyn MailSession>>
    where
        T: AsyncRead + AsyncWrite + Unpin + Debug + Send + 'static,
    {
        let client = async_imap::Client::new(stream);

        let session = client
            .login(username, password)
            .await
            .map_err(|e| anyhow::anyhow!("Login failed: {:?}", e.0))?;

        Ok(Box::new(ImapMailSession { session }))
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    async fn connect(
        &self,
        server: &ServerConfig,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Box<dyn MailSession>> {
        let addr = format!("{}:{}", server.imap, server.port);
        let tcp_stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", addr, e))?;

        if server.ssl {
            let tls = TlsConnector::new();
            let tls_stream = tls
                .connect(&server.imap, tcp_stream.compat())
                .await
                .map_err(|e| anyhow::anyhow!("TLS connection failed: {}", e))?;

            Self::login(tls_stream, username, password).await
        } else {
            Self::login(tcp_stream.compat(), username, password).await
        }
    }
}

pub struct ImapMailSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    session: Session<T>,
}

fn sequence_set(seqs: &[Seq]) -> String {
    seqs.iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl<T> MailSession for ImapMailSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    async fn select(&mut self, folder: &str) -> anyhow::Result<u32> {
        let mailbox = self
            .session
            .select(folder)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to select mailbox {}: {}", folder, e))?;

        Ok(mailbox.exists)
    }

    async fn search_all(&mut self) -> anyhow::Result<Vec<Seq>> {
        let found = self
            .session
            .search("ALL")
            .await
            .map_err(|e| anyhow::anyhow!("Search failed: {}", e))?;

        let mut seqs: Vec<Seq> = found.into_iter().collect();
        seqs.sort_unstable();
        Ok(seqs)
    }

    async fn fetch_raw(&mut self, seq: Seq) -> anyhow::Result<Option<Vec<u8>>> {
        let messages: Vec<Fetch> = self
            .session
            .fetch(seq.to_string(), "RFC822")
            .await
            .map_err(|e| anyhow::anyhow!("Fetch failed for message {}: {}", seq, e))?
            .try_collect()
            .await
            .map_err(|e| anyhow::anyhow!("Error reading fetch result: {}", e))?;

        Ok(messages
            .iter()
            .find_map(|message| message.body().map(|body| body.to_vec())))
    }

    async fn mark_deleted(&mut self, seqs: &[Seq]) -> anyhow::Result<()> {
        if seqs.is_empty() {
            return Ok(());
        }

        let set = sequence_set(seqs);
        let _: Vec<Fetch> = self
            .session
            .store(&set, "+FLAGS (\\Deleted)")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to mark messages {} as deleted: {}", set, e))?
            .try_collect()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to mark messages {} as deleted: {}", set, e))?;

        Ok(())
    }

    async fn expunge(&mut self) -> anyhow::Result<()> {
        let _: Vec<Seq> = self
            .session
            .expunge()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to expunge: {}", e))?
            .try_collect()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to expunge: {}", e))?;

        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.session
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("Close failed: {}", e))
    }

    async fn logout(&mut self) -> anyhow::Result<()> {
        self.session
            .logout()
            .await
            .map_err(|e| anyhow::anyhow!("Logout failed: {}", e))
    }
}
