use std::io::{self, Read as _, Write as _};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace};

/// Line speed of the ASCII bridge.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Read timeout after which `read_line` yields the empty line.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Settle time after each write, letting USB-serial bridges drain.
const WRITE_SETTLE: Duration = Duration::from_millis(20);

const LINE_TERMINATOR: u8 = b'\r';
const REQUEST_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("failed to open serial port {port}: {reason}")]
    Open { port: String, reason: String },
    #[error("serial link closed")]
    Closed,
    #[error("serial i/o error: {0}")]
    Io(String),
}

/// One request served by the link task.
///
/// Public so tests and alternate transports can stand behind the same
/// channel the way the production serial task does.
#[derive(Debug)]
pub enum LinkRequest {
    Write {
        line: String,
        respond_to: oneshot::Sender<Result<(), LinkError>>,
    },
    Read {
        respond_to: oneshot::Sender<Result<String, LinkError>>,
    },
    Shutdown,
}

/// Handle to the serial link task.
///
/// The physical port is owned by a dedicated thread doing blocking I/O
/// with the port's native read timeout; this handle serialises requests
/// to it over a channel. The link is half-duplex: callers pair each
/// `write_line` with the reads that complete the exchange before issuing
/// the next write.
#[derive(Debug, Clone)]
pub struct SerialLink {
    sender: mpsc::Sender<LinkRequest>,
}

impl SerialLink {
    /// Wraps an already-spawned link task. Used by tests and alternate
    /// transports; production code uses [`SerialLink::open`].
    #[must_use]
    pub fn new(sender: mpsc::Sender<LinkRequest>) -> Self {
        Self { sender }
    }

    /// Opens the serial port and spawns the link task.
    ///
    /// # Errors
    ///
    /// [`LinkError::Open`] when the port cannot be opened or the task
    /// thread cannot be spawned.
    pub fn open(port: &str, baud: u32, read_timeout: Duration) -> Result<Self, LinkError> {
        let handle = serialport::new(port, baud)
            .timeout(read_timeout)
            .open()
            .map_err(|error| LinkError::Open {
                port: port.to_string(),
                reason: error.to_string(),
            })?;

        info!(port, baud, "serial port opened");

        let (sender, receiver) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        thread::Builder::new()
            .name("mdb-serial-link".into())
            .spawn(move || link_task(handle, receiver))
            .map_err(|error| LinkError::Open {
                port: port.to_string(),
                reason: error.to_string(),
            })?;

        Ok(Self { sender })
    }

    /// Writes one command line; the task appends the CR terminator and
    /// settles briefly.
    ///
    /// # Errors
    ///
    /// [`LinkError::Closed`] when the link task is gone, [`LinkError::Io`]
    /// on a write failure.
    pub async fn write_line(&self, line: &str) -> Result<(), LinkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(LinkRequest::Write {
                line: line.to_string(),
                respond_to,
            })
            .await
            .map_err(|_| LinkError::Closed)?;
        response.await.map_err(|_| LinkError::Closed)?
    }

    /// Reads one line, stripped of framing whitespace. Yields the empty
    /// string when the port's read timeout elapses; a timeout is never an
    /// error.
    ///
    /// # Errors
    ///
    /// [`LinkError::Closed`] when the link task is gone, [`LinkError::Io`]
    /// when the port itself fails.
    pub async fn read_line(&self) -> Result<String, LinkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(LinkRequest::Read { respond_to })
            .await
            .map_err(|_| LinkError::Closed)?;
        response.await.map_err(|_| LinkError::Closed)?
    }

    /// One half-duplex exchange: write the command, read its response.
    ///
    /// # Errors
    ///
    /// Propagates [`write_line`](Self::write_line) and
    /// [`read_line`](Self::read_line) failures.
    pub async fn exchange(&self, line: &str) -> Result<String, LinkError> {
        self.write_line(line).await?;
        self.read_line().await
    }

    /// Stops the link task and closes the port. Idempotent; calls after
    /// the task has gone are no-ops.
    pub async fn close(&self) {
        let _ = self.sender.send(LinkRequest::Shutdown).await;
    }
}

fn link_task(mut port: Box<dyn serialport::SerialPort>, mut requests: mpsc::Receiver<LinkRequest>) {
    while let Some(request) = requests.blocking_recv() {
        match request {
            LinkRequest::Write { line, respond_to } => {
                let result = write_line_blocking(port.as_mut(), &line);
                if let Err(error) = &result {
                    error!(%line, %error, "serial write failed");
                }
                let _ = respond_to.send(result);
            }
            LinkRequest::Read { respond_to } => {
                let result = read_line_blocking(port.as_mut());
                if let Err(error) = &result {
                    error!(%error, "serial read failed");
                }
                let _ = respond_to.send(result);
            }
            LinkRequest::Shutdown => {
                debug!("serial link shutdown requested");
                break;
            }
        }
    }
    info!("serial link task stopped");
}

fn write_line_blocking(port: &mut dyn serialport::SerialPort, line: &str) -> Result<(), LinkError> {
    trace!(%line, "tx");
    port.write_all(line.as_bytes())
        .and_then(|()| port.write_all(&[LINE_TERMINATOR]))
        .and_then(|()| port.flush())
        .map_err(|error| LinkError::Io(error.to_string()))?;
    thread::sleep(WRITE_SETTLE);
    Ok(())
}

fn read_line_blocking(port: &mut dyn serialport::SerialPort) -> Result<String, LinkError> {
    let mut buffer = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match port.read(&mut byte) {
            Ok(0) => return Err(LinkError::Io("port returned end of stream".into())),
            Ok(_) => {
                if byte[0] == b'\r' || byte[0] == b'\n' {
                    // swallow the terminator of an empty leading line
                    if buffer.is_empty() {
                        continue;
                    }
                    break;
                }
                buffer.push(byte[0]);
            }
            Err(error) if error.kind() == io::ErrorKind::TimedOut => {
                // A timeout is "no event this cycle", not a failure.
                if !buffer.is_empty() {
                    debug!(partial = buffer.len(), "discarding partial line on timeout");
                }
                return Ok(String::new());
            }
            Err(error) => return Err(LinkError::Io(error.to_string())),
        }
    }

    let line = String::from_utf8_lossy(&buffer).trim().to_string();
    trace!(%line, "rx");
    Ok(line)
}
