//! Event loop shared by every tool
//!
//! One message is processed to completion before the next is read.

use crate::command::{self, CommandOutput};
use crate::dataplane::{Hub, IfNum, Outbound, Router, Switch};
use crate::protocol::MacAddr;
use crate::transport::{control_text, parse_handshake, Message, Transport};
use crate::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// A tool driven by the transport.
pub trait FrameHandler {
    /// Number of configured interfaces.
    fn interface_count(&self) -> usize;

    /// Applies the handshake MACs, one per interface in order.
    fn set_macs(&mut self, macs: &[MacAddr]);

    /// Processes a frame received on `interface`.
    fn handle_frame(&mut self, interface: IfNum, frame: &[u8]) -> Vec<Outbound>;

    /// Executes an operator command line.
    fn handle_command(&mut self, line: &str) -> CommandOutput;
}

impl FrameHandler for Router {
    fn interface_count(&self) -> usize {
        self.interfaces().len()
    }

    fn set_macs(&mut self, macs: &[MacAddr]) {
        Router::set_macs(self, macs);
    }

    fn handle_frame(&mut self, interface: IfNum, frame: &[u8]) -> Vec<Outbound> {
        self.process_frame(interface, frame)
    }

    fn handle_command(&mut self, line: &str) -> CommandOutput {
        match command::parse(line).and_then(|cmd| self.execute(cmd)) {
            Ok(output) => output,
            Err(err) => Router::command_error(err),
        }
    }
}

/// Bridges accept commands but do not act on them.
fn ignore_command(line: &str) -> CommandOutput {
    debug!(command = line, "Ignoring command");
    CommandOutput::new().line(format!("Received command `{}' (ignored)", line))
}

impl FrameHandler for Switch {
    fn interface_count(&self) -> usize {
        self.ports().len()
    }

    fn set_macs(&mut self, macs: &[MacAddr]) {
        Switch::set_macs(self, macs);
    }

    fn handle_frame(&mut self, interface: IfNum, frame: &[u8]) -> Vec<Outbound> {
        self.process_frame(interface, frame)
    }

    fn handle_command(&mut self, line: &str) -> CommandOutput {
        ignore_command(line)
    }
}

impl FrameHandler for Hub {
    fn interface_count(&self) -> usize {
        self.ports().len()
    }

    fn set_macs(&mut self, macs: &[MacAddr]) {
        Hub::set_macs(self, macs);
    }

    fn handle_frame(&mut self, interface: IfNum, frame: &[u8]) -> Vec<Outbound> {
        self.process_frame(interface, frame)
    }

    fn handle_command(&mut self, line: &str) -> CommandOutput {
        ignore_command(line)
    }
}

/// Runs `handler` until the transport reaches end of stream.
///
/// The first control message is the MAC handshake; later ones are
/// operator commands whose feedback goes back one line per message.
pub async fn run<R, W, H>(transport: &mut Transport<R, W>, handler: &mut H) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: FrameHandler,
{
    let mut handshake_done = false;

    while let Some(msg) = transport.recv().await? {
        match msg {
            Message::Control(payload) if !handshake_done => {
                let macs = parse_handshake(&payload, handler.interface_count())?;
                handler.set_macs(&macs);
                handshake_done = true;
                info!(interfaces = macs.len(), "Handshake complete");
            }
            Message::Control(payload) => {
                let line = control_text(&payload);
                debug!(command = %line, "Operator command");
                let output = handler.handle_command(&line);
                send_all(transport, output.frames).await?;
                for line in output.lines {
                    transport.send_control(&format!("{}\n", line)).await?;
                }
            }
            Message::Frame { interface, frame } => {
                if !handshake_done {
                    warn!(interface, "Frame received before handshake");
                }
                let out = handler.handle_frame(interface, &frame);
                send_all(transport, out).await?;
            }
        }
    }

    info!("Transport closed");
    Ok(())
}

async fn send_all<R, W>(transport: &mut Transport<R, W>, frames: Vec<Outbound>) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    for (interface, frame) in frames {
        transport.send_frame(interface, &frame).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::Port;
    use crate::telemetry::MetricsRegistry;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn make_hub() -> Hub {
        let ports = (1..=2)
            .map(|num| Port {
                num,
                name: format!("p{}", num),
                mac: MacAddr::ZERO,
            })
            .collect();
        Hub::new(ports, Arc::new(MetricsRegistry::new()))
    }

    #[tokio::test]
    async fn test_run_hub_session() {
        let (mut peer, local) = duplex(4096);
        let (r, w) = tokio::io::split(local);
        let mut transport = Transport::new(r, w);
        let mut hub = make_hub();

        let mut input = Vec::new();
        input.extend(Message::Control(vec![2; 12]).encode().unwrap());
        input.extend(
            Message::Frame {
                interface: 1,
                frame: vec![7; 20],
            }
            .encode()
            .unwrap(),
        );
        input.extend(Message::Control(b"status\n".to_vec()).encode().unwrap());
        peer.write_all(&input).await.unwrap();
        peer.shutdown().await.unwrap();

        run(&mut transport, &mut hub).await.unwrap();
        assert_eq!(hub.ports()[1].mac, MacAddr([2; 6]));
        drop(transport);

        let mut output = Vec::new();
        peer.read_to_end(&mut output).await.unwrap();

        let (first, used) = Message::decode(&output).unwrap().unwrap();
        assert_eq!(
            first,
            Message::Frame {
                interface: 2,
                frame: vec![7; 20]
            }
        );
        let (second, _) = Message::decode(&output[used..]).unwrap().unwrap();
        assert_eq!(
            second,
            Message::Control(b"Received command `status' (ignored)\n".to_vec())
        );
    }

    #[tokio::test]
    async fn test_short_handshake_is_error() {
        let (mut peer, local) = duplex(4096);
        let (r, w) = tokio::io::split(local);
        let mut transport = Transport::new(r, w);
        let mut hub = make_hub();

        peer.write_all(&Message::Control(vec![2; 6]).encode().unwrap())
            .await
            .unwrap();
        peer.shutdown().await.unwrap();

        assert!(run(&mut transport, &mut hub).await.is_err());
    }
}
