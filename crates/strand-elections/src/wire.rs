//! Binary wire format for election messages.
//!
//! Uses a compact binary encoding: a 1-byte message tag followed by the
//! message fields. All multi-byte integers are little-endian; node ids are
//! the canonical 16-byte form; socket addresses carry a 4/6 family tag.
//! Every frame is self-contained; election messages are fixed-size, so no
//! length prefixes or collection guards are needed.

use std::io::{self, Read};
use std::net::SocketAddr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use strand_cluster::NodeId;

use crate::messages::{
    Accept, LeaderIsResigning, LeaderIsResigningOk, PeerMessage, Prepare, PrepareOk, Proposal,
    ViewChange, ViewChangeProof,
};

// Wire format constants
const MSG_VIEW_CHANGE: u8 = 1;
const MSG_VIEW_CHANGE_PROOF: u8 = 2;
const MSG_PREPARE: u8 = 3;
const MSG_PREPARE_OK: u8 = 4;
const MSG_PROPOSAL: u8 = 5;
const MSG_ACCEPT: u8 = 6;
const MSG_LEADER_IS_RESIGNING: u8 = 7;
const MSG_LEADER_IS_RESIGNING_OK: u8 = 8;

// Safe read helpers that return io::Error instead of panicking on truncated input.

fn safe_get_u8(buf: &mut &[u8]) -> io::Result<u8> {
    if buf.is_empty() {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "need 1 byte"));
    }
    Ok(buf.get_u8())
}

fn safe_get_i32_le(buf: &mut &[u8]) -> io::Result<i32> {
    if buf.len() < 4 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "need 4 bytes"));
    }
    Ok(buf.get_i32_le())
}

fn safe_get_i64_le(buf: &mut &[u8]) -> io::Result<i64> {
    if buf.len() < 8 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "need 8 bytes"));
    }
    Ok(buf.get_i64_le())
}

fn encode_node_id(buf: &mut BytesMut, id: &NodeId) {
    buf.put_slice(id.as_bytes());
}

fn decode_node_id(buf: &mut &[u8]) -> io::Result<NodeId> {
    if buf.len() < 16 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "not enough bytes for node id",
        ));
    }
    let mut bytes = [0u8; 16];
    buf.read_exact(&mut bytes)?;
    Ok(NodeId::from_bytes(bytes))
}

fn encode_socket_addr(buf: &mut BytesMut, addr: &SocketAddr) {
    match addr {
        SocketAddr::V4(v4) => {
            buf.put_u8(4);
            buf.put_slice(&v4.ip().octets());
            buf.put_u16_le(v4.port());
        }
        SocketAddr::V6(v6) => {
            buf.put_u8(6);
            buf.put_slice(&v6.ip().octets());
            buf.put_u16_le(v6.port());
        }
    }
}

fn decode_socket_addr(buf: &mut &[u8]) -> io::Result<SocketAddr> {
    let addr_type = safe_get_u8(buf)?;
    match addr_type {
        4 => {
            if buf.len() < 6 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "not enough bytes for ipv4 address",
                ));
            }
            let mut octets = [0u8; 4];
            buf.read_exact(&mut octets)?;
            let port = buf.get_u16_le();
            Ok(SocketAddr::from((octets, port)))
        }
        6 => {
            if buf.len() < 18 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "not enough bytes for ipv6 address",
                ));
            }
            let mut octets = [0u8; 16];
            buf.read_exact(&mut octets)?;
            let port = buf.get_u16_le();
            Ok(SocketAddr::from((octets, port)))
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown address type: {other}"),
        )),
    }
}

impl PeerMessage {
    /// Serializes the message to bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(128);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Serializes the message into the given buffer.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            PeerMessage::ViewChange(m) => {
                buf.put_u8(MSG_VIEW_CHANGE);
                encode_node_id(buf, &m.server_id);
                encode_socket_addr(buf, &m.server_endpoint);
                buf.put_i32_le(m.attempted_view);
            }
            PeerMessage::ViewChangeProof(m) => {
                buf.put_u8(MSG_VIEW_CHANGE_PROOF);
                encode_node_id(buf, &m.server_id);
                encode_socket_addr(buf, &m.server_endpoint);
                buf.put_i32_le(m.installed_view);
            }
            PeerMessage::Prepare(m) => {
                buf.put_u8(MSG_PREPARE);
                encode_node_id(buf, &m.server_id);
                encode_socket_addr(buf, &m.server_endpoint);
                buf.put_i32_le(m.view);
            }
            PeerMessage::PrepareOk(m) => {
                buf.put_u8(MSG_PREPARE_OK);
                buf.put_i32_le(m.view);
                encode_node_id(buf, &m.server_id);
                encode_socket_addr(buf, &m.server_endpoint);
                buf.put_i32_le(m.epoch_number);
                buf.put_i64_le(m.epoch_position);
                encode_node_id(buf, &m.epoch_id);
                buf.put_i64_le(m.last_commit_position);
                buf.put_i64_le(m.writer_checkpoint);
                buf.put_i64_le(m.chaser_checkpoint);
                buf.put_i32_le(m.node_priority);
            }
            PeerMessage::Proposal(m) => {
                buf.put_u8(MSG_PROPOSAL);
                encode_node_id(buf, &m.server_id);
                encode_socket_addr(buf, &m.server_endpoint);
                encode_node_id(buf, &m.leader_id);
                encode_socket_addr(buf, &m.leader_endpoint);
                buf.put_i32_le(m.view);
                buf.put_i32_le(m.epoch_number);
                buf.put_i64_le(m.epoch_position);
                encode_node_id(buf, &m.epoch_id);
                buf.put_i64_le(m.last_commit_position);
                buf.put_i64_le(m.writer_checkpoint);
                buf.put_i64_le(m.chaser_checkpoint);
                buf.put_i32_le(m.node_priority);
            }
            PeerMessage::Accept(m) => {
                buf.put_u8(MSG_ACCEPT);
                encode_node_id(buf, &m.server_id);
                encode_socket_addr(buf, &m.server_endpoint);
                encode_node_id(buf, &m.leader_id);
                encode_socket_addr(buf, &m.leader_endpoint);
                buf.put_i32_le(m.view);
            }
            PeerMessage::LeaderIsResigning(m) => {
                buf.put_u8(MSG_LEADER_IS_RESIGNING);
                encode_node_id(buf, &m.leader_id);
                encode_socket_addr(buf, &m.leader_endpoint);
            }
            PeerMessage::LeaderIsResigningOk(m) => {
                buf.put_u8(MSG_LEADER_IS_RESIGNING_OK);
                encode_node_id(buf, &m.leader_id);
                encode_socket_addr(buf, &m.leader_endpoint);
                encode_node_id(buf, &m.server_id);
                encode_socket_addr(buf, &m.server_endpoint);
            }
        }
    }

    /// Deserializes a message from bytes.
    pub fn decode(mut buf: &[u8]) -> io::Result<Self> {
        if buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "empty message",
            ));
        }

        let msg_type = safe_get_u8(&mut buf)?;
        match msg_type {
            MSG_VIEW_CHANGE => {
                let server_id = decode_node_id(&mut buf)?;
                let server_endpoint = decode_socket_addr(&mut buf)?;
                let attempted_view = safe_get_i32_le(&mut buf)?;
                Ok(PeerMessage::ViewChange(ViewChange {
                    server_id,
                    server_endpoint,
                    attempted_view,
                }))
            }
            MSG_VIEW_CHANGE_PROOF => {
                let server_id = decode_node_id(&mut buf)?;
                let server_endpoint = decode_socket_addr(&mut buf)?;
                let installed_view = safe_get_i32_le(&mut buf)?;
                Ok(PeerMessage::ViewChangeProof(ViewChangeProof {
                    server_id,
                    server_endpoint,
                    installed_view,
                }))
            }
            MSG_PREPARE => {
                let server_id = decode_node_id(&mut buf)?;
                let server_endpoint = decode_socket_addr(&mut buf)?;
                let view = safe_get_i32_le(&mut buf)?;
                Ok(PeerMessage::Prepare(Prepare {
                    server_id,
                    server_endpoint,
                    view,
                }))
            }
            MSG_PREPARE_OK => {
                let view = safe_get_i32_le(&mut buf)?;
                let server_id = decode_node_id(&mut buf)?;
                let server_endpoint = decode_socket_addr(&mut buf)?;
                let epoch_number = safe_get_i32_le(&mut buf)?;
                let epoch_position = safe_get_i64_le(&mut buf)?;
                let epoch_id = decode_node_id(&mut buf)?;
                let last_commit_position = safe_get_i64_le(&mut buf)?;
                let writer_checkpoint = safe_get_i64_le(&mut buf)?;
                let chaser_checkpoint = safe_get_i64_le(&mut buf)?;
                let node_priority = safe_get_i32_le(&mut buf)?;
                Ok(PeerMessage::PrepareOk(PrepareOk {
                    view,
                    server_id,
                    server_endpoint,
                    epoch_number,
                    epoch_position,
                    epoch_id,
                    last_commit_position,
                    writer_checkpoint,
                    chaser_checkpoint,
                    node_priority,
                }))
            }
            MSG_PROPOSAL => {
                let server_id = decode_node_id(&mut buf)?;
                let server_endpoint = decode_socket_addr(&mut buf)?;
                let leader_id = decode_node_id(&mut buf)?;
                let leader_endpoint = decode_socket_addr(&mut buf)?;
                let view = safe_get_i32_le(&mut buf)?;
                let epoch_number = safe_get_i32_le(&mut buf)?;
                let epoch_position = safe_get_i64_le(&mut buf)?;
                let epoch_id = decode_node_id(&mut buf)?;
                let last_commit_position = safe_get_i64_le(&mut buf)?;
                let writer_checkpoint = safe_get_i64_le(&mut buf)?;
                let chaser_checkpoint = safe_get_i64_le(&mut buf)?;
                let node_priority = safe_get_i32_le(&mut buf)?;
                Ok(PeerMessage::Proposal(Proposal {
                    server_id,
                    server_endpoint,
                    leader_id,
                    leader_endpoint,
                    view,
                    epoch_number,
                    epoch_position,
                    epoch_id,
                    last_commit_position,
                    writer_checkpoint,
                    chaser_checkpoint,
                    node_priority,
                }))
            }
            MSG_ACCEPT => {
                let server_id = decode_node_id(&mut buf)?;
                let server_endpoint = decode_socket_addr(&mut buf)?;
                let leader_id = decode_node_id(&mut buf)?;
                let leader_endpoint = decode_socket_addr(&mut buf)?;
                let view = safe_get_i32_le(&mut buf)?;
                Ok(PeerMessage::Accept(Accept {
                    server_id,
                    server_endpoint,
                    leader_id,
                    leader_endpoint,
                    view,
                }))
            }
            MSG_LEADER_IS_RESIGNING => {
                let leader_id = decode_node_id(&mut buf)?;
                let leader_endpoint = decode_socket_addr(&mut buf)?;
                Ok(PeerMessage::LeaderIsResigning(LeaderIsResigning {
                    leader_id,
                    leader_endpoint,
                }))
            }
            MSG_LEADER_IS_RESIGNING_OK => {
                let leader_id = decode_node_id(&mut buf)?;
                let leader_endpoint = decode_socket_addr(&mut buf)?;
                let server_id = decode_node_id(&mut buf)?;
                let server_endpoint = decode_socket_addr(&mut buf)?;
                Ok(PeerMessage::LeaderIsResigningOk(LeaderIsResigningOk {
                    leader_id,
                    leader_endpoint,
                    server_id,
                    server_endpoint,
                }))
            }
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown message type: {other}"),
            )),
        }
    }
}
