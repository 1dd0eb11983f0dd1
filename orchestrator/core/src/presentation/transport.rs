// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Stream Transport
//!
//! TCP listener with a signed identity handshake ahead of each request.
//!
//! ```text
//! node   -> caller : conductor/0.0.1 <node-peer-id> <nonce-hex>\n
//! caller -> node   : <caller-public-key-hex> <signature-hex>\n
//! caller -> node   : <request xml>      (caller half-closes)
//! node   -> caller : <response xml>     (node closes)
//! ```
//!
//! The caller signs `conductor/0.0.1:<nonce-hex>:<node-peer-id>`. A verified
//! signature makes the caller's public key hex its peer id for the request.
//! A failed handshake closes the stream without a response.

use crate::domain::rbac::PeerId;
use crate::infrastructure::identity::{verify_peer, IdentityError, NodeIdentity};
use crate::presentation::dispatcher::Dispatcher;
use rand::Rng;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

pub const PROTOCOL_ID: &str = "conductor/0.0.1";

const MAX_HANDSHAKE_LINE: u64 = 512;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Timed out during {0}")]
    Timeout(&'static str),
}

fn challenge(nonce_hex: &str, node_peer: &str) -> String {
    format!("{}:{}:{}", PROTOCOL_ID, nonce_hex, node_peer)
}

async fn read_line<S>(stream: &mut BufReader<S>) -> Result<String, TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut line = String::new();
    let read = (&mut *stream)
        .take(MAX_HANDSHAKE_LINE)
        .read_line(&mut line)
        .await?;
    if read == 0 || !line.ends_with('\n') {
        return Err(TransportError::Handshake("incomplete handshake line".to_string()));
    }
    Ok(line.trim_end().to_string())
}

/// Node side of the handshake; returns the caller's verified peer id.
pub async fn accept_handshake<S>(
    stream: &mut BufReader<S>,
    identity: &NodeIdentity,
) -> Result<PeerId, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let nonce_hex = hex::encode(rand::rng().random::<[u8; 16]>());
    let node_peer = identity.peer_id();

    let greeting = format!("{} {} {}\n", PROTOCOL_ID, node_peer, nonce_hex);
    stream.get_mut().write_all(greeting.as_bytes()).await?;
    stream.get_mut().flush().await?;

    let reply = read_line(stream).await?;
    let (public_key, signature) = reply
        .split_once(' ')
        .ok_or_else(|| TransportError::Handshake("expected '<public-key> <signature>'".to_string()))?;

    let message = challenge(&nonce_hex, node_peer.as_str());
    Ok(verify_peer(public_key, message.as_bytes(), signature.trim())?)
}

/// Caller side of the handshake; returns the node's peer id.
pub async fn client_handshake<S>(
    stream: &mut BufReader<S>,
    identity: &NodeIdentity,
) -> Result<PeerId, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting = read_line(stream).await?;
    let mut parts = greeting.split(' ');
    let (Some(protocol), Some(node_peer), Some(nonce_hex), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TransportError::Handshake(format!("unexpected greeting '{}'", greeting)));
    };
    if protocol != PROTOCOL_ID {
        return Err(TransportError::Handshake(format!("unsupported protocol '{}'", protocol)));
    }

    let signature = identity.sign(challenge(nonce_hex, node_peer).as_bytes());
    let reply = format!(
        "{} {}\n",
        identity.public_key_hex(),
        hex::encode(signature.to_bytes())
    );
    stream.get_mut().write_all(reply.as_bytes()).await?;
    stream.get_mut().flush().await?;

    Ok(PeerId::new(node_peer))
}

pub struct Server {
    listener: TcpListener,
    identity: Arc<NodeIdentity>,
    dispatcher: Arc<Dispatcher>,
    handshake_timeout: Duration,
}

impl Server {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        identity: Arc<NodeIdentity>,
        dispatcher: Arc<Dispatcher>,
        handshake_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            identity,
            dispatcher,
            handshake_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves. Each connection runs on
    /// its own task.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Listening on {} as {}",
            self.local_addr()?,
            self.identity.peer_id()
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Listener shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    let identity = Arc::clone(&self.identity);
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let timeout = self.handshake_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &identity, &dispatcher, timeout).await {
                            debug!(remote = %remote, "Connection closed: {}", e);
                        }
                    });
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    identity: &NodeIdentity,
    dispatcher: &Dispatcher,
    handshake_timeout: Duration,
) -> Result<(), TransportError> {
    let mut stream = BufReader::new(stream);

    let peer = match tokio::time::timeout(handshake_timeout, accept_handshake(&mut stream, identity)).await {
        Ok(Ok(peer)) => peer,
        Ok(Err(e)) => {
            let _ = stream.shutdown().await;
            return Err(e);
        }
        Err(_) => {
            let _ = stream.shutdown().await;
            return Err(TransportError::Timeout("handshake"));
        }
    };

    dispatcher.handle_stream(&peer, stream).await?;
    Ok(())
}

/// Send one request to the node at `addr` and return its response.
pub async fn request(
    addr: &str,
    identity: &NodeIdentity,
    body: &[u8],
    timeout: Duration,
) -> Result<String, TransportError> {
    let exchange = async {
        let stream = TcpStream::connect(addr).await?;
        let mut stream = BufReader::new(stream);
        let node = client_handshake(&mut stream, identity).await?;
        debug!("Connected to node {}", node);

        stream.write_all(body).await?;
        stream.shutdown().await?;

        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        Ok::<_, TransportError>(response)
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| TransportError::Timeout("request"))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handshake_over_duplex() {
        let node = Arc::new(NodeIdentity::generate());
        let client = NodeIdentity::generate();
        let (node_io, client_io) = tokio::io::duplex(4096);

        let node_side = {
            let node = Arc::clone(&node);
            tokio::spawn(async move {
                let mut stream = BufReader::new(node_io);
                accept_handshake(&mut stream, &node).await
            })
        };

        let mut stream = BufReader::new(client_io);
        let seen_node = client_handshake(&mut stream, &client).await.unwrap();

        assert_eq!(seen_node, node.peer_id());
        assert_eq!(node_side.await.unwrap().unwrap(), client.peer_id());
    }

    #[tokio::test]
    async fn test_forged_signature_rejected() {
        let node = NodeIdentity::generate();
        let impostor = NodeIdentity::generate();
        let (node_io, client_io) = tokio::io::duplex(4096);

        let node_side = tokio::spawn(async move {
            let mut stream = BufReader::new(node_io);
            accept_handshake(&mut stream, &node).await
        });

        let mut stream = BufReader::new(client_io);
        let _greeting = read_line(&mut stream).await.unwrap();
        let forged = impostor.sign(b"something else");
        let reply = format!(
            "{} {}\n",
            NodeIdentity::generate().public_key_hex(),
            hex::encode(forged.to_bytes())
        );
        stream.get_mut().write_all(reply.as_bytes()).await.unwrap();

        assert!(matches!(
            node_side.await.unwrap(),
            Err(TransportError::Identity(IdentityError::BadSignature))
        ));
    }
}
