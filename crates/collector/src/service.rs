use crate::matching::RuleSet;
use crate::queue::CommandQueue;
use anyhow::Context;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use protocol::{CollectorRequest, CollectorResponse, InterceptSettings};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

/// State shared by every connection. `settings` never changes after start.
#[derive(Debug)]
struct CollectorState {
    settings: InterceptSettings,
    queue: Arc<CommandQueue>,
    settings_requested: AtomicBool,
}

impl CollectorState {
    fn handle(&self, request: CollectorRequest, peer: SocketAddr) -> CollectorResponse {
        match request {
            CollectorRequest::GetInterceptSettings => {
                self.settings_requested.store(true, Ordering::Release);
                tracing::debug!(event = "collector.settings_request", peer = %peer);
                CollectorResponse::InterceptSettings {
                    settings: self.settings.clone(),
                }
            }
            CollectorRequest::ReportInterceptedCommand { commands } => {
                let count = commands.len();
                for command in &commands {
                    tracing::debug!(
                        event = "collector.command",
                        peer = %peer,
                        original = %command.original_command,
                        replaced = %command.replaced_command,
                        directory = %command.directory,
                    );
                }
                let status = self.queue.push_commands(commands);
                tracing::info!(
                    event = "collector.report.received",
                    peer = %peer,
                    commands = count,
                    received = status.received,
                    processed = status.processed,
                );
                CollectorResponse::Status { status }
            }
        }
    }
}

/// The report service a shim talks to during one build session.
///
/// Dropping the server stops the accept loop; queued commands stay in the queue.
#[derive(Debug)]
pub struct CollectorServer {
    local_addr: SocketAddr,
    state: Arc<CollectorState>,
    shutdown: CancellationToken,
}

impl CollectorServer {
    /// Binds `addr` (use port 0 for an ephemeral port) and starts accepting in the
    /// background. Settings are validated before anything is bound.
    pub async fn start(addr: &str, settings: InterceptSettings) -> anyhow::Result<Self> {
        Self::start_with_queue(addr, settings, Arc::new(CommandQueue::new())).await
    }

    pub async fn start_with_queue(
        addr: &str,
        settings: InterceptSettings,
        queue: Arc<CommandQueue>,
    ) -> anyhow::Result<Self> {
        RuleSet::compile(&settings).context("refusing to serve invalid intercept settings")?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind collector addr {addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("failed to read collector address")?;
        tracing::info!(
            event = "collector.listener.bound",
            addr = %local_addr,
            rules = settings.matching_rules.len(),
        );

        let state = Arc::new(CollectorState {
            settings,
            queue,
            settings_requested: AtomicBool::new(false),
        });
        let shutdown = CancellationToken::new();
        spawn_accept_loop(listener, Arc::clone(&state), shutdown.clone());

        Ok(Self {
            local_addr,
            state,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Value for the `REPORT_URL` environment variable of spawned children.
    pub fn report_url(&self) -> String {
        self.local_addr.to_string()
    }

    pub fn settings(&self) -> &InterceptSettings {
        &self.state.settings
    }

    pub fn queue(&self) -> Arc<CommandQueue> {
        Arc::clone(&self.state.queue)
    }

    /// Whether any client fetched the settings since start.
    pub fn settings_requested(&self) -> bool {
        self.state.settings_requested.load(Ordering::Acquire)
    }

    /// Stops accepting connections. Safe to call more than once.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!(
                event = "collector.stopping",
                addr = %self.local_addr,
                pending = self.state.queue.pending(),
            );
        }
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for CollectorServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn spawn_accept_loop(listener: TcpListener, state: Arc<CollectorState>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(event = "collector.listener.closed");
                    break;
                }
                accept = listener.accept() => match accept {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            tracing::debug!(event = "collector.conn.accepted", peer = %peer);
                            if let Err(err) = handle_connection(stream, peer, state).await {
                                tracing::warn!(
                                    event = "collector.conn.error",
                                    peer = %peer,
                                    error = %err,
                                    "collector connection failed"
                                );
                            }
                        });
                    }
                    Err(err) => {
                        tracing::warn!(
                            event = "collector.listener.accept_failed",
                            error = %err,
                            "collector accept failed"
                        );
                    }
                }
            }
        }
    });
}

pub(crate) fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(protocol::framing::MAX_FRAME_LENGTH)
        .new_codec()
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<CollectorState>,
) -> anyhow::Result<()> {
    let mut framed = Framed::new(stream, codec());
    while let Some(frame) = framed.next().await {
        let bytes = frame.context("read frame")?;
        let response = match serde_json::from_slice::<CollectorRequest>(&bytes) {
            Ok(request) => state.handle(request, peer),
            Err(err) => {
                tracing::warn!(
                    event = "collector.request.invalid",
                    peer = %peer,
                    error = %err,
                    "invalid collector request"
                );
                CollectorResponse::error(format!("invalid request: {err}"))
            }
        };
        send_response(&mut framed, &response).await?;
    }
    tracing::debug!(event = "collector.conn.closed", peer = %peer);
    Ok(())
}

async fn send_response(
    framed: &mut Framed<TcpStream, LengthDelimitedCodec>,
    response: &CollectorResponse,
) -> anyhow::Result<()> {
    let payload = serde_json::to_vec(response)?;
    framed.send(Bytes::from(payload)).await?;
    Ok(())
}
