//! Binary file-transfer sub-protocol, nested in a session's stream.
//!
//! After a `TRNSFR <user>` line the sender switches the same connection to
//! raw bytes and transmits one frame:
//!
//! ```text
//! [filename_len: u16 BE][filename: UTF-8][payload_len: u64 BE][payload]
//! ```
//!
//! The recipient gets a `TRNSFR from <sender>` line on its line channel,
//! then the identical frame, then an acknowledging `+OK` line.
//!
//! A frame that violates the limits is still consumed to the declared
//! lengths, so the sender's line protocol stays in sync after the `-ERR`.
//! Only a transport failure (short read) aborts the session.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

pub const MAX_FILENAME_LEN: usize = 255;
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB per transfer

#[derive(Debug)]
pub enum TransferError {
    Io(io::Error),
    EmptyFilename,
    FilenameTooLong(usize),
    InvalidFilename,
    FileTooLarge(u64),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Io(e) => write!(f, "transfer I/O error: {}", e),
            TransferError::EmptyFilename => write!(f, "empty filename"),
            TransferError::FilenameTooLong(len) => {
                write!(f, "filename of {} bytes exceeds {}", len, MAX_FILENAME_LEN)
            }
            TransferError::InvalidFilename => write!(f, "filename is not valid UTF-8"),
            TransferError::FileTooLarge(size) => {
                write!(f, "declared size {} exceeds {} bytes", size, MAX_FILE_SIZE)
            }
        }
    }
}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        TransferError::Io(e)
    }
}

/// One fully buffered inbound transfer, held in memory until it is forwarded
/// to the recipient. Nothing is written to the filesystem.
#[derive(Debug, PartialEq, Eq)]
pub struct InboundFile {
    pub filename: String,
    pub payload: Vec<u8>,
}

/// Reads one complete transfer frame. Exactly the declared bytes are
/// consumed, even when the frame is rejected.
pub async fn receive_file<R>(reader: &mut R) -> Result<InboundFile, TransferError>
where
    R: AsyncRead + Unpin,
{
    let name_len = read_u16(reader).await? as usize;
    if name_len == 0 || name_len > MAX_FILENAME_LEN {
        discard_exact(reader, name_len as u64).await?;
        discard_declared_payload(reader).await?;
        return if name_len == 0 {
            Err(TransferError::EmptyFilename)
        } else {
            Err(TransferError::FilenameTooLong(name_len))
        };
    }

    let mut name_bytes = vec![0u8; name_len];
    reader.read_exact(&mut name_bytes).await?;
    let filename = match String::from_utf8(name_bytes) {
        Ok(filename) => filename,
        Err(_) => {
            discard_declared_payload(reader).await?;
            return Err(TransferError::InvalidFilename);
        }
    };

    let payload_len = read_u64(reader).await?;
    if payload_len > MAX_FILE_SIZE {
        discard_exact(reader, payload_len).await?;
        return Err(TransferError::FileTooLarge(payload_len));
    }

    let mut payload = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(InboundFile { filename, payload })
}

async fn read_u16<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<u16> {
    let mut bytes = [0u8; 2];
    reader.read_exact(&mut bytes).await?;
    Ok(u16::from_be_bytes(bytes))
}

async fn read_u64<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes).await?;
    Ok(u64::from_be_bytes(bytes))
}

/// Consumes the length field and payload of a frame being rejected.
async fn discard_declared_payload<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<()> {
    let payload_len = read_u64(reader).await?;
    discard_exact(reader, payload_len).await
}

async fn discard_exact<R: AsyncRead + Unpin>(reader: &mut R, mut remaining: u64) -> io::Result<()> {
    let mut buffer = [0u8; 8192];
    while remaining > 0 {
        let chunk = remaining.min(buffer.len() as u64) as usize;
        let read = reader.read(&mut buffer[..chunk]).await?;
        if read == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        remaining -= read as u64;
    }
    Ok(())
}
