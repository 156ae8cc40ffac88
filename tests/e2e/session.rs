//! In-memory transport session
//!
//! Feeds a scripted list of envelopes to a tool and collects everything it
//! writes back until the input stream ends.

use netkit::app::{self, FrameHandler};
use netkit::dataplane::IfNum;
use netkit::protocol::ethernet::FrameBuilder;
use netkit::protocol::ipv4::Ipv4Builder;
use netkit::protocol::{EtherType, MacAddr};
use netkit::transport::{Message, Transport};
use std::net::Ipv4Addr;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

const BUFFER: usize = 1 << 20;

pub struct Session {
    input: Vec<Message>,
}

impl Session {
    /// Starts a session whose handshake assigns `macs` in order.
    pub fn new(macs: &[MacAddr]) -> Self {
        let handshake = macs.iter().flat_map(|m| m.0).collect();
        Self {
            input: vec![Message::Control(handshake)],
        }
    }

    pub fn frame(mut self, interface: IfNum, frame: Vec<u8>) -> Self {
        self.input.push(Message::Frame { interface, frame });
        self
    }

    pub fn command(mut self, line: &str) -> Self {
        self.input
            .push(Message::Control(format!("{}\n", line).into_bytes()));
        self
    }

    /// Runs `handler` over the scripted input and returns its output.
    pub async fn run<H: FrameHandler>(self, handler: &mut H) -> Vec<Message> {
        let (mut peer, local) = duplex(BUFFER);
        let (reader, writer) = tokio::io::split(local);
        let mut transport = Transport::new(reader, writer);

        let mut bytes = Vec::new();
        for msg in &self.input {
            bytes.extend(msg.encode().expect("encode"));
        }
        peer.write_all(&bytes).await.expect("write input");
        peer.shutdown().await.expect("shutdown");

        app::run(&mut transport, handler).await.expect("session");
        drop(transport);

        let mut output = Vec::new();
        peer.read_to_end(&mut output).await.expect("read output");
        decode_all(&output)
    }
}

fn decode_all(mut buf: &[u8]) -> Vec<Message> {
    let mut out = Vec::new();
    while let Some((msg, used)) = Message::decode(buf).expect("decode") {
        out.push(msg);
        buf = &buf[used..];
    }
    assert!(buf.is_empty(), "Trailing bytes in output");
    out
}

/// Control lines in output order.
pub fn lines(output: &[Message]) -> Vec<String> {
    output
        .iter()
        .filter_map(|m| match m {
            Message::Control(text) => Some(String::from_utf8_lossy(text).into_owned()),
            Message::Frame { .. } => None,
        })
        .collect()
}

/// Frames in output order, tagged with their interface.
pub fn frames(output: &[Message]) -> Vec<(IfNum, Vec<u8>)> {
    output
        .iter()
        .filter_map(|m| match m {
            Message::Frame { interface, frame } => Some((*interface, frame.clone())),
            Message::Control(_) => None,
        })
        .collect()
}

pub fn ethernet(dst: MacAddr, src: MacAddr, ethertype: EtherType, payload: &[u8]) -> Vec<u8> {
    FrameBuilder::new()
        .dst_mac(dst)
        .src_mac(src)
        .ethertype(ethertype)
        .payload(payload)
        .build()
}

/// UDP-numbered datagram carrying `payload_len` filler bytes.
pub fn datagram(src: Ipv4Addr, dst: Ipv4Addr, ttl: u8, df: bool, payload_len: usize) -> Vec<u8> {
    Ipv4Builder::new()
        .identification(0x4242)
        .dont_fragment(df)
        .ttl(ttl)
        .protocol(17)
        .src_addr(src)
        .dst_addr(dst)
        .payload(&vec![0x5a; payload_len])
        .build()
}
