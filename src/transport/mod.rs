//! Framed byte-stream transport to the frame-delivery process
//!
//! Production uses stdin/stdout; any tokio reader/writer pair works.

mod codec;

pub use codec::{
    control_text, decode_header, parse_handshake, Message, CONTROL_TYPE, HEADER_LEN, MAX_PAYLOAD,
};

use crate::dataplane::IfNum;
use crate::{Error, Result};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Envelope transport over an async reader/writer pair
pub struct Transport<R, W> {
    reader: R,
    writer: W,
}

impl Transport<tokio::io::Stdin, tokio::io::Stdout> {
    /// Transport over the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> Transport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Receive the next message.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between messages.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = self.reader.read(&mut header[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(Error::Transport("stream ended inside a header".into()));
            }
            filled += n;
        }

        let (payload_len, msg_type) = decode_header(header)?;
        let mut payload = vec![0u8; payload_len];
        self.reader
            .read_exact(&mut payload)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => {
                    Error::Transport(format!("stream ended inside a {} byte message", payload_len))
                }
                _ => Error::Io(e),
            })?;

        Ok(Some(Message::from_parts(msg_type, payload)))
    }

    /// Send one message and flush.
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        let bytes = msg.encode()?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn send_frame(&mut self, interface: IfNum, frame: &[u8]) -> Result<()> {
        self.send(&Message::Frame {
            interface,
            frame: frame.to_vec(),
        })
        .await
    }

    /// Send operator feedback on the control channel.
    pub async fn send_control(&mut self, text: &str) -> Result<()> {
        self.send(&Message::Control(text.as_bytes().to_vec())).await
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
