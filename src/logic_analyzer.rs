use crate::protocol::{Command, ControlRequest, SAMPLE_COUNT};
use crate::serial_link::{LinkError, LinkSettings, SerialLink, Transport};
use crate::trigger_config::{Edge, TriggerConfig, TriggerConfigError, CHANNEL_COUNT};
use crate::vcd;
use polars::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

const RUNNING_BIT: u8 = 0x01;
const TIME_COLUMN_NAME: &str = "time";

#[derive(Debug, thiserror::Error)]
pub enum LogicAnalyzerError {
    #[error("Transport error: {0}")]
    Link(#[from] LinkError),

    #[error("Short read on {command}: expected {expected} bytes but got {received}")]
    ShortRead {
        command: Command,
        expected: usize,
        received: usize,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] TriggerConfigError),

    #[error("Capture still running after {waited:?}")]
    CaptureTimeout { waited: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One complete capture as read back from the instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    samples: Vec<u8>,
}

impl SampleBuffer {
    pub fn new(samples: Vec<u8>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.samples
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.samples
    }

    /// Levels of a single channel, one entry per sample.
    pub fn channel(&self, channel: u8) -> Result<impl Iterator<Item = bool> + '_, TriggerConfigError> {
        if channel >= CHANNEL_COUNT {
            return Err(TriggerConfigError::ChannelOutOfRange { channel });
        }
        Ok(self.samples.iter().map(move |s| (s >> channel) & 1 == 1))
    }

    pub fn write_vcd<W: Write>(&self, divider: u8, out: W) -> std::io::Result<()> {
        vcd::encode(&self.samples, divider, out)
    }

    /// Table with a `time` column in 10 ns units followed by one boolean
    /// column per channel, `CH0` to `CH7`.
    pub fn to_dataframe(&self, divider: u8) -> Result<DataFrame, PolarsError> {
        let steps = vcd::steps_per_sample(divider);
        let time: Vec<u64> = (0..self.samples.len() as u64).map(|i| i * steps).collect();

        let mut columns: Vec<Column> = Vec::with_capacity(1 + CHANNEL_COUNT as usize);
        columns.push(Series::new(TIME_COLUMN_NAME.into(), time).into());

        for ch in 0..CHANNEL_COUNT {
            let values: Vec<bool> = self.samples.iter().map(|s| (s >> ch) & 1 == 1).collect();
            let column: Column = Series::new(format!("CH{}", ch).into(), values).into();
            columns.push(column);
        }

        DataFrame::new(columns)
    }
}

impl AsRef<[u8]> for SampleBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.samples
    }
}

/// Driver for the logic analyzer.
///
/// Every method is one complete request/response exchange. Exchanges that
/// expect a reply first throw away whatever is sitting in the receive buffer,
/// so a leftover byte from an earlier, interrupted exchange is never taken
/// for the answer.
pub struct LogicAnalyzer<T: Transport> {
    link: T,
    sample_count: usize,
}

impl LogicAnalyzer<SerialLink> {
    /// Open the serial port described by `settings`.
    pub fn open(settings: &LinkSettings) -> Result<Self, LogicAnalyzerError> {
        let link = SerialLink::open(settings)?;
        Ok(Self::new(link))
    }

    /// Release the serial port.
    pub fn close(self) -> Result<(), LogicAnalyzerError> {
        self.link.close()?;
        Ok(())
    }
}

impl<T: Transport> LogicAnalyzer<T> {
    pub fn new(link: T) -> Self {
        Self {
            link,
            sample_count: SAMPLE_COUNT,
        }
    }

    /// Use a capture depth other than [`SAMPLE_COUNT`].
    pub fn with_sample_count(mut self, sample_count: usize) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn into_transport(self) -> T {
        self.link
    }

    fn send(&mut self, command: Command) -> Result<(), LogicAnalyzerError> {
        log::debug!("Sending {}", command);
        self.link.send(command.encode().as_bytes())?;
        Ok(())
    }

    /// Discard stale input, send `command` and read back the reply it announces.
    fn query(&mut self, command: Command) -> Result<Vec<u8>, LogicAnalyzerError> {
        let mut reply = vec![0u8; command.reply().len(self.sample_count)];
        self.link.discard_input()?;
        self.send(command)?;

        let received = self.link.receive(&mut reply)?;
        if received < reply.len() {
            log::warn!(
                "Short read on {}: {} of {} bytes",
                command,
                received,
                reply.len()
            );
            return Err(LogicAnalyzerError::ShortRead {
                command,
                expected: reply.len(),
                received,
            });
        }
        Ok(reply)
    }

    fn query_byte(&mut self, command: Command) -> Result<u8, LogicAnalyzerError> {
        let value = match self.query(command)?.as_slice() {
            [value] => *value,
            reply => {
                return Err(LogicAnalyzerError::ShortRead {
                    command,
                    expected: 1,
                    received: reply.len(),
                })
            }
        };
        log::trace!("{} replied 0x{:02x}", command, value);
        Ok(value)
    }

    /// Set the sample clock divider; samples are taken every `divider + 1` clock units.
    pub fn set_divider(&mut self, divider: u8) -> Result<(), LogicAnalyzerError> {
        self.send(Command::SetDivide(divider))
    }

    pub fn get_divider(&mut self) -> Result<u8, LogicAnalyzerError> {
        self.query_byte(Command::GetDivide)
    }

    pub fn set_position(&mut self, position: u8) -> Result<(), LogicAnalyzerError> {
        self.send(Command::SetPosition(position))
    }

    pub fn get_position(&mut self) -> Result<u8, LogicAnalyzerError> {
        self.query_byte(Command::GetPosition)
    }

    /// Fails with [`LogicAnalyzerError::InvalidArgument`] before touching the
    /// link when `channel` does not name one of the eight inputs.
    pub fn set_trigger(&mut self, edge: Edge, channel: u8) -> Result<(), LogicAnalyzerError> {
        let trigger = TriggerConfig::new(edge, channel)?;
        self.set_trigger_config(trigger)
    }

    pub fn set_trigger_config(&mut self, trigger: TriggerConfig) -> Result<(), LogicAnalyzerError> {
        log::debug!("Arming trigger on {}", trigger);
        self.send(Command::SetTrigger(trigger))
    }

    pub fn get_trigger(&mut self) -> Result<TriggerConfig, LogicAnalyzerError> {
        let value = self.query_byte(Command::GetTrigger)?;
        Ok(TriggerConfig::from_byte(value))
    }

    pub fn is_running(&mut self) -> Result<bool, LogicAnalyzerError> {
        let status = self.query_byte(Command::Control(ControlRequest::Status))?;
        Ok(status & RUNNING_BIT != 0)
    }

    pub fn start(&mut self) -> Result<(), LogicAnalyzerError> {
        self.send(Command::Control(ControlRequest::Start))
    }

    /// Poll the run state every `poll_interval` until the capture is done.
    pub fn wait_until_idle(
        &mut self,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<(), LogicAnalyzerError> {
        let now = Instant::now();
        while self.is_running()? {
            if now.elapsed() >= timeout {
                return Err(LogicAnalyzerError::CaptureTimeout {
                    waited: now.elapsed(),
                });
            }
            thread::sleep(poll_interval);
        }
        log::debug!("Capture finished after {:?}", now.elapsed());
        Ok(())
    }

    /// Read back the whole sample memory.
    ///
    /// A short read is reported as an error; no partial buffer is returned and
    /// nothing is retried. The link's framing is undefined afterwards.
    #[tracing::instrument(level = "debug", skip(self), fields(sample_count = self.sample_count))]
    pub fn read_data(&mut self) -> Result<SampleBuffer, LogicAnalyzerError> {
        let samples = self.query(Command::ReadData)?;
        Ok(SampleBuffer::new(samples))
    }

    /// Start a capture, wait for it to complete and read it back.
    pub fn capture(
        &mut self,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<SampleBuffer, LogicAnalyzerError> {
        self.start()?;
        self.wait_until_idle(poll_interval, timeout)?;
        self.read_data()
    }

    /// Read the captured samples and the divider and write them as a change dump.
    #[tracing::instrument(level = "debug", skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn save_vcd<P: AsRef<Path>>(&mut self, path: P) -> Result<(), LogicAnalyzerError> {
        let samples = self.read_data()?;
        let divider = self.get_divider()?;

        let file = File::create(path.as_ref())?;
        samples.write_vcd(divider, BufWriter::new(file))?;
        log::debug!(
            "Wrote {} samples to {}",
            samples.len(),
            path.as_ref().display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Simulated instrument answering the wire protocol from a register file.
    #[derive(Default)]
    struct FakeInstrument {
        divide: u8,
        position: u8,
        trigger: u8,
        status: u8,
        samples: Vec<u8>,
        /// Bytes handed back by `receive`, in order.
        rx: VecDeque<u8>,
        /// Every byte the driver wrote.
        written: Vec<u8>,
        discards: usize,
        /// Truncate the next sample block to this many bytes.
        short_block: Option<usize>,
        /// Run polls left before `status` drops to idle.
        busy_polls: usize,
        /// Swallow every request without answering.
        mute: bool,
    }

    impl FakeInstrument {
        fn handle(&mut self, frame: &[u8]) {
            match frame {
                [0x81, v] => self.divide = *v,
                [0x82, v] => self.position = *v,
                [0x83, v] => self.trigger = *v,
                [0x84, v] => self.status |= *v & RUNNING_BIT,
                [0x01] => self.rx.push_back(self.divide),
                [0x02] => self.rx.push_back(self.position),
                [0x03] => self.rx.push_back(self.trigger),
                [0x04] => {
                    if self.busy_polls > 0 {
                        self.busy_polls -= 1;
                    } else {
                        self.status &= !RUNNING_BIT;
                    }
                    self.rx.push_back(self.status);
                }
                [0x05] => {
                    let len = self.short_block.take().unwrap_or(self.samples.len());
                    self.rx.extend(&self.samples[..len]);
                }
                _ => unreachable!("unexpected frame {:02x?}", frame),
            }
        }
    }

    impl Transport for FakeInstrument {
        fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
            self.written.extend_from_slice(bytes);
            if !self.mute {
                self.handle(bytes);
            }
            Ok(())
        }

        fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
            let mut n = 0;
            while n < buf.len() {
                match self.rx.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }

        fn discard_input(&mut self) -> Result<(), LinkError> {
            self.discards += 1;
            self.rx.clear();
            Ok(())
        }
    }

    fn analyzer() -> LogicAnalyzer<FakeInstrument> {
        LogicAnalyzer::new(FakeInstrument::default())
    }

    #[test]
    fn test_divider_round_trip() {
        let mut la = analyzer();
        for v in 0..=255u8 {
            la.set_divider(v).unwrap();
            assert_eq!(la.get_divider().unwrap(), v);
        }
    }

    #[test]
    fn test_position_round_trip() {
        let mut la = analyzer();
        for v in 0..=255u8 {
            la.set_position(v).unwrap();
            assert_eq!(la.get_position().unwrap(), v);
        }
    }

    #[test]
    fn test_trigger_round_trip() {
        let mut la = analyzer();
        for edge in [Edge::Rising, Edge::Falling] {
            for channel in 0..CHANNEL_COUNT {
                la.set_trigger(edge, channel).unwrap();
                let trigger = la.get_trigger().unwrap();
                assert_eq!(trigger.edge(), edge);
                assert_eq!(trigger.channel(), channel);
            }
        }
    }

    #[test]
    fn test_wire_bytes() {
        let mut la = analyzer();
        la.set_divider(9).unwrap();
        la.get_divider().unwrap();
        la.set_trigger(Edge::Rising, 2).unwrap();
        la.start().unwrap();
        la.is_running().unwrap();

        let link = la.into_transport();
        assert_eq!(link.written, [0x81, 9, 0x01, 0x83, 0x82, 0x84, 0x01, 0x04]);
    }

    #[test]
    fn test_invalid_trigger_channel_writes_nothing() {
        let mut la = analyzer();
        let err = la.set_trigger(Edge::Falling, 8).unwrap_err();
        assert!(matches!(
            err,
            LogicAnalyzerError::InvalidArgument(TriggerConfigError::ChannelOutOfRange {
                channel: 8
            })
        ));
        assert!(la.into_transport().written.is_empty());
    }

    #[test]
    fn test_is_running_reflects_bit_zero() {
        let mut la = analyzer();
        for (status, running) in [(0x01, true), (0x00, false), (0x02, false), (0xff, true)] {
            la.link.status = status;
            la.link.busy_polls = 1;
            assert_eq!(la.is_running().unwrap(), running, "status 0x{:02x}", status);
        }
    }

    #[test]
    fn test_stale_bytes_are_discarded_before_query() {
        let mut la = analyzer();
        la.set_divider(42).unwrap();
        la.link.rx.extend([0xde, 0xad]);
        assert_eq!(la.get_divider().unwrap(), 42);
        assert_eq!(la.link.discards, 1);
    }

    #[test]
    fn test_set_commands_do_not_discard() {
        let mut la = analyzer();
        la.set_divider(1).unwrap();
        la.set_position(2).unwrap();
        la.start().unwrap();
        assert_eq!(la.link.discards, 0);
    }

    #[test]
    fn test_empty_sample_block_is_short_read() {
        let mut la = analyzer();
        la.link.short_block = Some(0);
        la.link.samples = vec![0; 4];
        let err = la.with_sample_count(4).read_data().unwrap_err();
        assert!(matches!(
            err,
            LogicAnalyzerError::ShortRead {
                command: Command::ReadData,
                expected: 4,
                received: 0
            }
        ));
    }

    #[test]
    fn test_missing_register_reply_is_short_read() {
        let mut la = analyzer();
        la.link.mute = true;

        let results = [
            (Command::GetDivide, la.get_divider().map(|_| ())),
            (Command::GetPosition, la.get_position().map(|_| ())),
            (Command::GetTrigger, la.get_trigger().map(|_| ())),
            (
                Command::Control(ControlRequest::Status),
                la.is_running().map(|_| ()),
            ),
        ];
        for (sent, result) in results {
            assert!(
                matches!(
                    result,
                    Err(LogicAnalyzerError::ShortRead {
                        command,
                        expected: 1,
                        received: 0,
                    }) if command == sent
                ),
                "{} did not report a short read",
                sent
            );
        }
        assert_eq!(la.link.written, [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(la.link.discards, 4);
    }

    #[test]
    fn test_read_data() {
        let samples: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        let mut la = analyzer().with_sample_count(1024);
        la.link.samples = samples.clone();
        la.link.rx.push_back(0x99);

        let buffer = la.read_data().unwrap();
        assert_eq!(buffer.as_slice(), samples.as_slice());
        assert_eq!(la.link.written, [0x05]);
    }

    #[test]
    fn test_read_data_short_block_returns_no_buffer() {
        let mut la = analyzer().with_sample_count(16);
        la.link.samples = vec![0xaa; 16];
        la.link.short_block = Some(10);

        let err = la.read_data().unwrap_err();
        assert!(matches!(
            err,
            LogicAnalyzerError::ShortRead {
                expected: 16,
                received: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_default_sample_count() {
        assert_eq!(analyzer().sample_count(), SAMPLE_COUNT);
    }

    #[test]
    fn test_capture_polls_until_idle() {
        let mut la = analyzer().with_sample_count(4);
        la.link.samples = vec![1, 2, 3, 4];
        la.link.busy_polls = 3;

        let buffer = la
            .capture(Duration::from_millis(1), Duration::from_secs(5))
            .unwrap();
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 4]);

        let polls = la.link.written.iter().filter(|&&b| b == 0x04).count();
        assert_eq!(polls, 4);
    }

    #[test]
    fn test_wait_until_idle_times_out() {
        let mut la = analyzer();
        la.link.status = RUNNING_BIT;
        la.link.busy_polls = usize::MAX;

        let err = la
            .wait_until_idle(Duration::from_millis(1), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, LogicAnalyzerError::CaptureTimeout { .. }));
    }

    #[test]
    fn test_channel_levels() {
        let buffer = SampleBuffer::new(vec![0b0000_0100, 0b0000_0000, 0b1000_0100]);
        let ch2: Vec<bool> = buffer.channel(2).unwrap().collect();
        assert_eq!(ch2, [true, false, true]);
        assert!(buffer.channel(8).is_err());
    }

    #[test]
    fn test_to_dataframe() {
        let buffer = SampleBuffer::new(vec![0x00, 0x01, 0x80]);
        let df = buffer.to_dataframe(4).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 9);

        let time: Vec<u64> = df
            .column(TIME_COLUMN_NAME)
            .unwrap()
            .u64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(time, [0, 5, 10]);

        let ch7: Vec<bool> = df
            .column("CH7")
            .unwrap()
            .bool()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(ch7, [false, false, true]);
    }

    #[test]
    fn test_save_vcd() {
        let dir = std::env::temp_dir().join(format!("logiana-rs-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("capture.vcd");

        let mut la = analyzer().with_sample_count(8);
        la.link.samples = vec![0x00, 0x00, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00];
        la.set_divider(0).unwrap();
        la.save_vcd(&path).unwrap();

        let dump = std::fs::read_to_string(&path).unwrap();
        assert!(dump.starts_with("$timescale 10 ns $end\n"));
        assert!(dump.ends_with("$end\n#2\n1a\n#5\n0a\n#8\n"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
