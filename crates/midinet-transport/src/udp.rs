/// UDP transports: symmetric, server (peer learned from first datagram),
/// and client (fixed remote). Each binds a non-blocking `socket2::Socket`
/// and hands it to `tokio::net::UdpSocket::from_std`.
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{Transport, MAX_DATAGRAM_SIZE};

fn bind_std(local: SocketAddr) -> Result<std::net::UdpSocket> {
    let domain = if local.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::DGRAM, None).context("creating UDP socket")?;
    socket.set_reuse_address(true).ok();
    socket
        .set_nonblocking(true)
        .context("setting UDP socket non-blocking")?;
    socket
        .bind(&local.into())
        .with_context(|| format!("binding UDP socket to {local}"))?;
    Ok(socket.into())
}

/// Symmetric UDP: both ends bind locally and send to a known remote address.
pub async fn symmetric(local: SocketAddr, remote: SocketAddr) -> Result<Transport> {
    let socket = Arc::new(UdpSocket::from_std(bind_std(local)?)?);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let recv_socket = socket.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            match recv_socket.recv_from(&mut buf).await {
                Ok((n, from)) => {
                    debug!(bytes = n, %from, "udp recv");
                    if inbound_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "udp recv failed, closing transport");
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(data) = outbound_rx.recv().await {
            if let Err(e) = socket.send_to(&data, remote).await {
                warn!(error = %e, %remote, "udp send failed");
            }
        }
    });

    info!(%local, %remote, "udp symmetric transport ready");
    Ok(Transport {
        outbound: outbound_tx,
        inbound: inbound_rx,
    })
}

/// UDP server: binds locally and learns the peer address from the first
/// inbound datagram. Sends before a peer is learned are dropped.
pub async fn server(local: SocketAddr) -> Result<Transport> {
    let socket = Arc::new(UdpSocket::from_std(bind_std(local)?)?);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (peer_tx, mut peer_rx) = watch::channel::<Option<SocketAddr>>(None);

    let recv_socket = socket.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            match recv_socket.recv_from(&mut buf).await {
                Ok((n, from)) => {
                    if peer_tx.borrow().is_none() {
                        info!(%from, "udp server learned peer");
                        let _ = peer_tx.send(Some(from));
                    }
                    if inbound_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "udp recv failed, closing transport");
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(data) = outbound_rx.recv().await {
            let peer = *peer_rx.borrow_and_update();
            match peer {
                Some(addr) => {
                    if let Err(e) = socket.send_to(&data, addr).await {
                        warn!(error = %e, %addr, "udp send failed");
                    }
                }
                None => debug!("udp server dropping send: no peer learned yet"),
            }
        }
    });

    info!(%local, "udp server transport ready");
    Ok(Transport {
        outbound: outbound_tx,
        inbound: inbound_rx,
    })
}

/// UDP client: binds locally and sends to a fixed remote address. Identical
/// wiring to `symmetric`; kept as a distinct entry point because the
/// configuration directive that selects it is distinct (`udp-client`).
pub async fn client(local: SocketAddr, remote: SocketAddr) -> Result<Transport> {
    symmetric(local, remote).await
}
