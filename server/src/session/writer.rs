use std::io;
use std::sync::{Arc, OnceLock};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use shared::logger;

use crate::faults::{FaultPolicy, WriteAction};

/// Serialized writer for one session's outbound channel.
///
/// Fan-out (broadcasts, whispers, group notices, forwarded files) makes other
/// sessions' tasks write into this channel concurrently with the owning
/// session's own replies. The mutex guarantees whole lines, and whole
/// transfer frames, never interleave on the wire.
pub struct SessionWriter<W> {
    stream: Mutex<W>,
    faults: Arc<dyn FaultPolicy>,
    username: OnceLock<String>,
}

pub type ClientWriter = SessionWriter<OwnedWriteHalf>;

impl<W: AsyncWrite + Unpin> SessionWriter<W> {
    pub fn new(stream: W, faults: Arc<dyn FaultPolicy>) -> Self {
        SessionWriter {
            stream: Mutex::new(stream),
            faults,
            username: OnceLock::new(),
        }
    }

    /// Tags this writer's log lines once the handshake assigns a username.
    pub fn set_username(&self, username: &str) {
        let _ = self.username.set(username.to_string());
    }

    pub fn username(&self) -> Option<&str> {
        self.username.get().map(String::as_str)
    }

    /// Writes one protocol line, subject to the fault policy.
    pub async fn send_line(&self, line: &str) -> io::Result<()> {
        match self.faults.on_line(line) {
            WriteAction::Drop => {
                logger::log_warning(&format!("[DROPPED] {}", line));
                Ok(())
            }
            WriteAction::Deliver(line) => {
                let mut stream = self.stream.lock().await;
                stream.write_all(line.as_bytes()).await?;
                stream.write_all(b"\n").await?;
                stream.flush().await?;
                logger::log_outgoing(self.username(), &line);
                Ok(())
            }
        }
    }

    /// Forwards a received file to this session: the notice line, the binary
    /// metadata fields, the payload, and the acknowledgment, all under a
    /// single lock acquisition so no concurrent line can split the frame.
    pub async fn send_file(&self, notice: &str, filename: &str, payload: &[u8]) -> io::Result<()> {
        let name_len = u16::try_from(filename.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "filename too long"))?;

        let mut stream = self.stream.lock().await;
        stream.write_all(notice.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.write_all(&name_len.to_be_bytes()).await?;
        stream.write_all(filename.as_bytes()).await?;
        stream.write_all(&(payload.len() as u64).to_be_bytes()).await?;
        stream.write_all(payload).await?;
        stream.write_all(b"+OK\n").await?;
        stream.flush().await?;
        logger::log_outgoing(self.username(), notice);
        Ok(())
    }
}
