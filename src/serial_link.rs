use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Baud rate the instrument firmware listens on.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Upper bound for a single read exchange. Covers a full sample block at the default baud rate.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);

// Timeout of each individual `read()` call while waiting for the overall deadline.
const POLL_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Duplex byte stream the driver talks through.
///
/// Implementations own the underlying device exclusively. None of the methods
/// may block longer than the implementation's configured read deadline.
pub trait Transport {
    /// Write every byte and push it out to the device.
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Fill `buf` with whatever arrives before the read deadline.
    ///
    /// Returns the number of bytes stored. A count smaller than `buf.len()`
    /// means the deadline elapsed first.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// Drop any received but not yet consumed bytes.
    fn discard_input(&mut self) -> Result<(), LinkError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.as_mut().send(bytes)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        self.as_mut().receive(buf)
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        self.as_mut().discard_input()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl LinkSettings {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Deadline for one complete read, including the full sample block.
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

#[derive(Debug)]
pub struct SerialLink {
    serial: Box<dyn SerialPort>,
    read_timeout: Duration,
}

impl SerialLink {
    /// Open the port and start from empty buffers in both directions.
    pub fn open(settings: &LinkSettings) -> Result<Self, LinkError> {
        log::debug!(
            "Opening logic analyzer on port {} at {} baud",
            settings.port,
            settings.baud_rate
        );
        let serial = serialport::new(&settings.port, settings.baud_rate)
            .timeout(POLL_TIMEOUT.min(settings.read_timeout))
            .open()?;

        let mut link = Self {
            serial,
            read_timeout: settings.read_timeout,
        };
        link.serial.clear(serialport::ClearBuffer::Output)?;
        link.serial.clear(serialport::ClearBuffer::Input)?;
        Ok(link)
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn set_read_timeout(&mut self, read_timeout: Duration) -> Result<(), LinkError> {
        self.serial.set_timeout(POLL_TIMEOUT.min(read_timeout))?;
        self.read_timeout = read_timeout;
        Ok(())
    }

    /// Push out pending output and release the port.
    pub fn close(mut self) -> Result<(), LinkError> {
        log::debug!("Closing logic analyzer port");
        self.serial.flush()?;
        Ok(())
    }
}

impl Transport for SerialLink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.serial.write_all(bytes)?;
        self.serial.flush()?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let mut filled = 0;
        let now = Instant::now();

        while filled < buf.len() {
            match self.serial.read(&mut buf[filled..]) {
                Ok(n) => filled += n,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
            if filled < buf.len() && now.elapsed() >= self.read_timeout {
                log::trace!(
                    "Read deadline of {:?} elapsed after {} of {} bytes",
                    self.read_timeout,
                    filled,
                    buf.len()
                );
                break;
            }
        }

        Ok(filled)
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        self.serial.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }
}
