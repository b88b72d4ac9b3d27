//! Ingest listener
//!
//! Accepts the producer pipeline's TCP connection and publishes what it sends
//! into a hub. Producers are served one at a time: when a pipeline
//! disconnects, the listener waits for it (or a replacement) to reconnect.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::hub::Hub;

use super::config::IngestConfig;
use super::reader::FrameReader;

/// Why a producer connection ended
#[derive(Debug)]
pub enum IngestEnd {
    /// Producer closed the stream
    Eof,
    /// The hub stopped accepting values
    HubStopped,
    /// Reading the stream failed
    Failed(Error),
}

/// Summary of one producer connection
#[derive(Debug)]
pub struct IngestSummary {
    /// Remote address of the producer
    pub peer_addr: SocketAddr,
    /// Values published into the hub
    pub frames: u64,
    /// Payload bytes published into the hub
    pub bytes: u64,
    /// How the connection ended
    pub end: IngestEnd,
}

/// TCP ingest server feeding one hub
pub struct IngestServer {
    config: IngestConfig,
    hub: Hub<Bytes>,
}

impl IngestServer {
    /// Create an ingest server publishing into `hub`
    pub fn new(config: IngestConfig, hub: Hub<Bytes>) -> Self {
        Self { config, hub }
    }

    /// Get the hub this server publishes into
    pub fn hub(&self) -> &Hub<Bytes> {
        &self.hub
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind and serve until the hub stops
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve producers on an already bound listener until the hub stops
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;

        while self.hub.is_running() {
            tracing::info!(addr = %addr, hub = %self.hub.config().name, "Waiting for input stream");

            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = self.hub.stopped() => break,
            };

            match accepted {
                Ok((socket, peer_addr)) => {
                    let summary = self.handle_connection(socket, peer_addr).await;
                    log_summary(&addr, &summary);
                }
                Err(e) => {
                    tracing::error!(addr = %addr, error = %e, "Failed to accept input stream");
                }
            }
        }

        tracing::info!(addr = %addr, "Hub stopped, ingest closed");
        Ok(())
    }

    /// Publish everything one producer sends
    pub async fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) -> IngestSummary {
        tracing::info!(peer = %peer_addr, mode = ?self.config.mode, "Accepted input stream");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(peer = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let mut reader = FrameReader::new(socket, self.config.mode);
        let end = self.pump(&mut reader).await;

        IngestSummary {
            peer_addr,
            frames: reader.frames_read(),
            bytes: reader.bytes_read(),
            end,
        }
    }

    async fn pump(&self, reader: &mut FrameReader<TcpStream>) -> IngestEnd {
        loop {
            let next = tokio::select! {
                biased;
                next = reader.next_frame() => next,
                _ = self.hub.stopped() => return IngestEnd::HubStopped,
            };

            match next {
                Ok(Some(frame)) => {
                    if !self.hub.publish(frame).await {
                        return IngestEnd::HubStopped;
                    }
                }
                Ok(None) => return IngestEnd::Eof,
                Err(e) => return IngestEnd::Failed(e),
            }
        }
    }
}

fn log_summary(addr: &SocketAddr, summary: &IngestSummary) {
    match summary.end {
        IngestEnd::Eof => tracing::info!(
            addr = %addr,
            peer = %summary.peer_addr,
            frames = summary.frames,
            bytes = summary.bytes,
            "Input stream closed"
        ),
        IngestEnd::HubStopped => tracing::info!(
            addr = %addr,
            peer = %summary.peer_addr,
            frames = summary.frames,
            "Hub stopped, dropping input stream"
        ),
        IngestEnd::Failed(ref e) => tracing::warn!(
            addr = %addr,
            peer = %summary.peer_addr,
            frames = summary.frames,
            error = %e,
            "Input stream read error"
        ),
    }
}
