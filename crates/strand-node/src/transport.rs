//! UDP transport for election traffic.
//!
//! One datagram per election frame, no retries and no delivery
//! guarantees: the election's timeout rotation and periodic view-change
//! proofs repair any loss.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use strand_elections::{ElectionMessage, PeerMessage, TransportPort};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sends election frames as UDP datagrams.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

impl TransportPort for UdpTransport {
    fn send(&self, target: SocketAddr, message: PeerMessage, _deadline: Instant) {
        let frame = message.encode();
        if let Err(e) = self.socket.try_send_to(&frame, target) {
            warn!("failed to send election frame to {target}: {e}");
        }
    }
}

/// Receives datagrams and feeds decoded messages into the node bus.
///
/// Undecodable frames are dropped: stray traffic on the election port is
/// not an error the node can act on.
pub async fn recv_loop(socket: Arc<UdpSocket>, bus: mpsc::UnboundedSender<ElectionMessage>) {
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => match PeerMessage::decode(&buf[..len]) {
                Ok(message) => {
                    if bus.send(message.into()).is_err() {
                        // bus closed, the node is shutting down
                        return;
                    }
                }
                Err(e) => debug!("dropping undecodable frame from {from}: {e}"),
            },
            Err(e) => warn!("election socket receive error: {e}"),
        }
    }
}
