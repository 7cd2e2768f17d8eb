pub mod hmac;
pub mod tcp;
pub mod udp;

use tokio::sync::mpsc;

/// Maximum size of a single UDP datagram this protocol will send or accept,
/// mirrored here so transports can size their receive buffers without
/// depending on the relay crate.
pub const MAX_DATAGRAM_SIZE: usize = midinet_protocol::MAX_DATAGRAM_SIZE;

/// A live network connection, reduced to the two channels every relay
/// component actually needs: a sender for outbound datagrams and a receiver
/// for inbound ones. Each concrete transport (`udp`, `tcp`, `hmac`) spawns
/// its own background tasks and wires them to these channels; callers never
/// see sockets directly.
pub struct Transport {
    pub outbound: mpsc::UnboundedSender<Vec<u8>>,
    pub inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Transport {
    pub fn send(&self, data: Vec<u8>) -> Result<(), mpsc::error::SendError<Vec<u8>>> {
        self.outbound.send(data)
    }

    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }
}
