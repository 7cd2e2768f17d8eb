/// HMAC-SHA1 datagram authentication, wrapping any other transport. A
/// 20-byte tag is appended to each outbound datagram and verified on
/// receipt via `Mac::verify_slice`, which compares in constant time.
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tokio::sync::mpsc;
use tracing::warn;

use crate::Transport;

type HmacSha1 = Hmac<Sha1>;

/// Length, in bytes, of the HMAC-SHA1 tag appended to each datagram.
pub const TAG_LEN: usize = 20;

/// Wrap `inner` so every outbound datagram is appended with an HMAC-SHA1 tag
/// over its payload, and every inbound datagram has its tag verified and
/// stripped before being handed to the caller. Datagrams that are too short
/// to carry a tag, or whose tag doesn't verify, are dropped silently.
pub fn wrap(inner: Transport, key: Vec<u8>) -> Transport {
    let Transport {
        outbound: inner_tx,
        inbound: mut inner_rx,
    } = inner;
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let send_key = key.clone();
    tokio::spawn(async move {
        while let Some(data) = outbound_rx.recv().await {
            let mut mac =
                HmacSha1::new_from_slice(&send_key).expect("HMAC accepts a key of any length");
            mac.update(&data);
            let tag = mac.finalize().into_bytes();
            let mut framed = data;
            framed.extend_from_slice(&tag);
            if inner_tx.send(framed).is_err() {
                break;
            }
        }
    });

    let recv_key = key;
    tokio::spawn(async move {
        while let Some(framed) = inner_rx.recv().await {
            if framed.len() < TAG_LEN {
                warn!(len = framed.len(), "hmac: datagram shorter than tag, dropping");
                continue;
            }
            let split = framed.len() - TAG_LEN;
            let (payload, tag) = framed.split_at(split);
            let mut mac = HmacSha1::new_from_slice(&recv_key)
                .expect("HMAC accepts a key of any length");
            mac.update(payload);
            if mac.verify_slice(tag).is_err() {
                warn!("hmac: tag verification failed, dropping datagram");
                continue;
            }
            if inbound_tx.send(payload.to_vec()).is_err() {
                break;
            }
        }
    });

    Transport {
        outbound: outbound_tx,
        inbound: inbound_rx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_pair() -> (Transport, mpsc::UnboundedSender<Vec<u8>>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (to_inner_tx, to_inner_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (from_inner_tx, from_inner_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let inner = Transport {
            outbound: from_inner_tx,
            inbound: to_inner_rx,
        };
        (inner, to_inner_tx, from_inner_rx)
    }

    #[tokio::test]
    async fn matching_key_roundtrips() {
        let (inner, wire_tx, mut wire_rx) = loopback_pair();
        let mut wrapped = wrap(inner, b"secret".to_vec());

        wrapped.send(vec![1, 2, 3]).unwrap();
        let on_wire = wire_rx.recv().await.unwrap();
        assert_eq!(on_wire.len(), 3 + TAG_LEN);

        wire_tx.send(on_wire).unwrap();
        let received = wrapped.recv().await.unwrap();
        assert_eq!(received, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn wrong_key_is_dropped() {
        let (sender_inner, _sender_feed, mut sender_drain) = loopback_pair();
        let mut sender = wrap(sender_inner, b"secret".to_vec());
        sender.send(vec![1, 2, 3]).unwrap();
        let framed = sender_drain.recv().await.unwrap();

        let (receiver_inner, receiver_feed, _receiver_drain) = loopback_pair();
        let mut receiver = wrap(receiver_inner, b"different".to_vec());
        receiver_feed.send(framed).unwrap();
        drop(receiver_feed);

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), receiver.recv()).await;
        assert!(result.is_err() || result.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_tag_is_dropped() {
        let (inner, wire_tx, _wire_rx) = loopback_pair();
        let mut wrapped = wrap(inner, b"secret".to_vec());
        wire_tx.send(vec![1, 2, 3]).unwrap(); // shorter than TAG_LEN
        drop(wire_tx);
        let result = tokio::time::timeout(std::time::Duration::from_millis(50), wrapped.recv()).await;
        assert!(result.is_err() || result.unwrap().is_none());
    }
}
