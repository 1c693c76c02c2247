//! Message transport with `Content-Length` framing.

use anyhow::anyhow;
use serde_json::Value;
use std::io::{BufRead, BufReader, Stdin, Stdout, Write};
use std::sync::{Mutex, PoisonError};

/// Framed JSON message transport. Reads and writes may happen from different
/// threads, a write never waits for a pending read.
pub trait Transport: Send + Sync {
    /// Read a single message. `None` means the peer closed the connection.
    fn read_message(&self) -> anyhow::Result<Option<Value>>;

    /// Write a single message.
    fn write_message(&self, message: &Value) -> anyhow::Result<()>;
}

/// Transport over a buffered reader and a writer, stdio for the binary and
/// in-memory buffers for tests.
pub struct FramedTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl FramedTransport<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> FramedTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: BufRead + Send, W: Write + Send> Transport for FramedTransport<R, W> {
    fn read_message(&self) -> anyhow::Result<Option<Value>> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let mut content_length: Option<usize> = None;
        let mut header_seen = false;
        loop {
            let mut line = String::new();
            let read_n = reader.read_line(&mut line)?;
            if read_n == 0 {
                if header_seen {
                    return Err(anyhow!("connection closed inside a message header"));
                }
                return Ok(None);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if header_seen {
                    break;
                }
                continue;
            }
            header_seen = true;
            if let Some(v) = line.strip_prefix("Content-Length:") {
                content_length = Some(v.trim().parse()?);
            }
        }

        let len = content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        let msg: Value = serde_json::from_slice(&buf)?;
        Ok(Some(msg))
    }

    fn write_message(&self, message: &Value) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(message)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        write!(writer, "Content-Length: {}\r\n\r\n", payload.len())?;
        writer.write_all(&payload)?;
        writer.flush()?;
        Ok(())
    }
}
