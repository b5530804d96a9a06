use bytes::Bytes;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::codec::decode_header;
use super::types::{HEADER_LENGTH, Header};
use crate::error::{MetaError, Result};

/// One decoded frame: header plus raw body bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: Header,
    pub body: Bytes,
}

/// Reads exactly one frame.
///
/// `read_exact` loops over short reads; hitting end-of-stream before the frame is complete
/// means the peer went away and is reported as `ConnectionClosed`.
pub async fn read_message<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; HEADER_LENGTH];
    reader.read_exact(&mut head).await.map_err(closed_or_io)?;
    let header = decode_header(&head)?;

    let mut body = vec![0u8; header.body_len()];
    if !body.is_empty() {
        reader.read_exact(&mut body).await.map_err(closed_or_io)?;
    }

    Ok(Frame {
        header,
        body: Bytes::from(body),
    })
}

pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await.map_err(MetaError::SendFailed)?;
    writer.flush().await.map_err(MetaError::SendFailed)
}

fn closed_or_io(e: std::io::Error) -> MetaError {
    match e.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
            MetaError::ConnectionClosed
        }
        _ => MetaError::Io(e),
    }
}
