/// TCP transports: server (accepts a single connection) and client
/// (connects to a fixed remote). Each datagram is framed with an explicit
/// 4-byte little-endian length prefix.
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{Transport, MAX_DATAGRAM_SIZE};

fn spawn_framed(stream: TcpStream) -> Transport {
    let (mut read_half, mut write_half) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        loop {
            let mut len_buf = [0u8; 4];
            if let Err(e) = read_half.read_exact(&mut len_buf).await {
                debug!(error = %e, "tcp connection closed reading frame length");
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_DATAGRAM_SIZE {
                warn!(len, "tcp frame exceeds maximum datagram size, closing connection");
                break;
            }
            let mut payload = vec![0u8; len];
            if let Err(e) = read_half.read_exact(&mut payload).await {
                debug!(error = %e, "tcp connection closed reading frame payload");
                break;
            }
            if inbound_tx.send(payload).is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(data) = outbound_rx.recv().await {
            let len = data.len() as u32;
            if write_half.write_all(&len.to_le_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(&data).await.is_err() {
                break;
            }
        }
    });

    Transport {
        outbound: outbound_tx,
        inbound: inbound_rx,
    }
}

/// TCP server: listens on `local` and accepts exactly one connection before
/// returning; the relay is strictly point-to-point.
pub async fn server(local: SocketAddr) -> Result<Transport> {
    let listener = TcpListener::bind(local)
        .await
        .with_context(|| format!("binding TCP listener to {local}"))?;
    info!(%local, "tcp server waiting for connection");
    let (stream, peer) = listener.accept().await.context("accepting TCP connection")?;
    info!(%peer, "tcp server accepted connection");
    Ok(spawn_framed(stream))
}

/// TCP client: connects to a fixed remote address.
pub async fn client(remote: SocketAddr) -> Result<Transport> {
    let stream = TcpStream::connect(remote)
        .await
        .with_context(|| format!("connecting to {remote}"))?;
    info!(%remote, "tcp client connected");
    Ok(spawn_framed(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn framed_roundtrip() {
        let local: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = TcpListener::bind(local).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            spawn_framed(stream)
        });

        let mut client = client(addr).await.unwrap();
        let mut server = server_task.await.unwrap();

        client.send(vec![1, 2, 3, 4, 5]).unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), server.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, vec![1, 2, 3, 4, 5]);

        server.send(vec![9, 8, 7]).unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), client.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn oversized_frame_closes_connection() {
        let local: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = TcpListener::bind(local).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            spawn_framed(stream)
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let bad_len: u32 = (MAX_DATAGRAM_SIZE + 1) as u32;
        client.write_all(&bad_len.to_le_bytes()).await.unwrap();

        let mut server = server_task.await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), server.recv()).await;
        assert!(matches!(result, Ok(None)));
    }
}
