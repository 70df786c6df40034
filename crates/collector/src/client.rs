use crate::service::codec;
use anyhow::Context;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use protocol::{CollectorRequest, CollectorResponse, InterceptSettings, InterceptedCommand, Status};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client side of the collector protocol: what a shim does, from Rust.
///
/// One connection carries any number of request/response exchanges.
pub struct CollectorClient {
    addr: String,
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl CollectorClient {
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .context("collector connect timeout")?
            .with_context(|| format!("failed to connect {addr}"))?;
        Ok(Self {
            addr: addr.to_string(),
            framed: Framed::new(stream, codec()),
        })
    }

    pub async fn get_settings(&mut self) -> anyhow::Result<InterceptSettings> {
        match self.send_request(&CollectorRequest::GetInterceptSettings).await? {
            CollectorResponse::InterceptSettings { settings } => Ok(settings),
            CollectorResponse::Error { message } => anyhow::bail!(message),
            other => anyhow::bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn report(&mut self, commands: Vec<InterceptedCommand>) -> anyhow::Result<Status> {
        let request = CollectorRequest::ReportInterceptedCommand { commands };
        match self.send_request(&request).await? {
            CollectorResponse::Status { status } => Ok(status),
            CollectorResponse::Error { message } => anyhow::bail!(message),
            other => anyhow::bail!("unexpected response: {:?}", other),
        }
    }

    pub async fn report_one(&mut self, command: InterceptedCommand) -> anyhow::Result<Status> {
        self.report(vec![command]).await
    }

    async fn send_request(&mut self, request: &CollectorRequest) -> anyhow::Result<CollectorResponse> {
        let payload = serde_json::to_vec(request)?;
        self.framed
            .send(Bytes::from(payload))
            .await
            .with_context(|| format!("failed to send request to {}", self.addr))?;
        let frame = self
            .framed
            .next()
            .await
            .context("collector closed connection")?
            .context("collector read error")?;
        let response = serde_json::from_slice(&frame).context("invalid collector response")?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_failure_is_surfaced() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        drop(listener);
        assert!(CollectorClient::connect(&addr).await.is_err());
    }

    #[tokio::test]
    async fn closed_connection_is_surfaced() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            drop(stream);
        });
        let mut client = CollectorClient::connect(&addr).await.expect("connect");
        server.await.expect("server");
        assert!(client.get_settings().await.is_err());
    }

    #[tokio::test]
    async fn error_response_becomes_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut framed = Framed::new(stream, codec());
            let _ = framed.next().await;
            let payload =
                serde_json::to_vec(&CollectorResponse::error("queue closed")).expect("encode");
            framed.send(Bytes::from(payload)).await.expect("send");
        });
        let mut client = CollectorClient::connect(&addr).await.expect("connect");
        let err = client
            .report_one(InterceptedCommand::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("queue closed"));
    }
}
