//! Length-delimited framing over TCP.

use crate::{
    constants::MAX_FRAME_LEN,
    error::{NodeError, NodeResult, WireError},
    message::Message,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::{io, net::SocketAddr, time::Duration};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

/// Wrap a stream in a 4-byte big-endian length-prefixed codec.
pub fn framed(stream: TcpStream) -> Transport {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LEN)
        .new_framed(stream)
}

/// Next decoded message, or `None` once the peer closes the stream.
pub async fn next_message(transport: &mut Transport) -> Option<Result<Message, WireError>> {
    let frame = transport.next().await?;
    Some(frame.map_err(WireError::Io).and_then(|f| Message::decode(&f)))
}

/// Open a connection to `addr`, write one frame and close.
pub async fn send_frame(
    addr: SocketAddr,
    frame: Bytes,
    connect_timeout: Duration,
) -> NodeResult<()> {
    let unreachable = |source: io::Error| NodeError::UnreachablePeer { addr, source };

    let stream = timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| unreachable(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))?
        .map_err(unreachable)?;

    let mut transport = framed(stream);
    transport.send(frame).await.map_err(unreachable)?;
    SinkExt::<Bytes>::close(&mut transport)
        .await
        .map_err(unreachable)?;
    Ok(())
}

pub async fn send_message(
    addr: SocketAddr,
    message: &Message,
    connect_timeout: Duration,
) -> NodeResult<()> {
    let frame = Bytes::from(message.encode()?);
    send_frame(addr, frame, connect_timeout).await
}
