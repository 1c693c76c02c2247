use crate::{mux_debug, mux_error};
use os_pipe::PipeReader;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use timeout_readwrite::TimeoutReader;

/// How long a reader waits for new bytes before publishing an unterminated tail.
/// Debugger prompts are not followed by a newline, so an idle stream with a pending
/// tail means the tail is complete.
const IDLE_FLUSH: Duration = Duration::from_millis(15);

const READ_CHUNK: usize = 4096;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StreamType {
    StdErr,
    StdOut,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum OutputLine {
    Out(String),
    Err(String),
}

impl OutputLine {
    pub fn text(&self) -> &str {
        match self {
            OutputLine::Out(s) | OutputLine::Err(s) => s,
        }
    }

    pub fn is_stdout(&self) -> bool {
        matches!(self, OutputLine::Out(_))
    }
}

/// Messages delivered to a session from its readers.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum OutputEvent {
    Line(OutputLine),
    /// Stream reached EOF (or failed), no more lines will come from it.
    Closed(StreamType),
    /// Session is stopping, any pending wait must end.
    Interrupt,
}

/// Reader thread handle. Dropping a handle stops the thread.
pub struct Handle {
    flag: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Handle {
    /// Ask reader thread to stop and wait for it.
    pub fn stop(&mut self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                mux_error!(target: "driver", "output reader thread panicked");
            }
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.stop()
    }
}

/// Turns a byte stream into lines, publishing them into a channel.
pub struct OutputStreamProcessor {
    r#type: StreamType,
}

impl OutputStreamProcessor {
    pub fn new(r#type: StreamType) -> Self {
        Self { r#type }
    }

    pub fn run(self, stream: PipeReader, sender: Sender<OutputEvent>) -> Handle {
        let flag = Arc::new(AtomicBool::new(false));
        let stream = TimeoutReader::new(stream, IDLE_FLUSH);

        let join = {
            let flag = flag.clone();
            thread::spawn(move || self.read_loop(stream, sender, flag))
        };

        Handle {
            flag,
            join: Some(join),
        }
    }

    fn read_loop(
        self,
        mut stream: TimeoutReader<PipeReader>,
        sender: Sender<OutputEvent>,
        flag: Arc<AtomicBool>,
    ) {
        let mut pending: Vec<u8> = Vec::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            if flag.load(Ordering::SeqCst) {
                return;
            }

            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=pos).collect();
                        if !self.publish(&sender, &line) {
                            return;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    if !pending.is_empty() {
                        let tail = std::mem::take(&mut pending);
                        if !self.publish(&sender, &tail) {
                            return;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    mux_debug!(target: "driver", "{:?} read error: {e}", self.r#type);
                    break;
                }
            }
        }

        if !pending.is_empty() {
            self.publish(&sender, &pending);
        }
        _ = sender.send(OutputEvent::Closed(self.r#type));
    }

    /// Send line into channel, return false if nobody listen anymore.
    fn publish(&self, sender: &Sender<OutputEvent>, raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches(['\n', '\r']).to_string();
        let line = match self.r#type {
            StreamType::StdErr => OutputLine::Err(text),
            StreamType::StdOut => OutputLine::Out(text),
        };
        sender.send(OutputEvent::Line(line)).is_ok()
    }
}
