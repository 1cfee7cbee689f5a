//! Change-dump (VCD) encoding of captured sample buffers.
//!
//! Every sample byte holds the levels of the eight channels at one instant,
//! bit `i` being channel `i`. Runs of identical samples produce no output;
//! only the instants where at least one channel flips get a timestamp.

use crate::trigger_config::CHANNEL_COUNT;
use std::io::{self, Write};

/// Resolution of one clock unit on the instrument.
pub const TIMESCALE: &str = "10 ns";

pub const SCOPE_NAME: &str = "capdata";

const IDENTIFIERS: [char; CHANNEL_COUNT as usize] = ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h'];

/// Single character identifier of a channel in the dump, `a` for CH0 through `h` for CH7.
pub fn identifier(channel: u8) -> Option<char> {
    IDENTIFIERS.get(usize::from(channel)).copied()
}

/// Clock units between two consecutive samples for a divider register value.
pub fn steps_per_sample(divider: u8) -> u64 {
    u64::from(divider) + 1
}

fn level(sample: u8, channel: u8) -> u8 {
    (sample >> channel) & 0x01
}

/// A sample that differs from the last one reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub index: usize,
    pub previous: u8,
    pub current: u8,
}

impl Change {
    /// Bitmap of the channels that flipped.
    pub fn flipped(&self) -> u8 {
        self.previous ^ self.current
    }

    pub fn flipped_channels(&self) -> impl Iterator<Item = u8> {
        let flipped = self.flipped();
        (0..CHANNEL_COUNT).filter(move |ch| flipped & (1 << ch) != 0)
    }
}

/// Iterator over the transitions of a sample buffer, see [`changes`].
#[derive(Debug, Clone)]
pub struct Changes<'a> {
    samples: &'a [u8],
    index: usize,
    previous: u8,
}

/// Walk `samples` and yield every index whose value differs from the last
/// reported one. The first sample is the baseline and is never yielded.
pub fn changes(samples: &[u8]) -> Changes<'_> {
    Changes {
        samples,
        index: 1,
        previous: samples.first().copied().unwrap_or(0),
    }
}

impl Iterator for Changes<'_> {
    type Item = Change;

    fn next(&mut self) -> Option<Change> {
        while let Some(&current) = self.samples.get(self.index) {
            let index = self.index;
            self.index += 1;
            if current != self.previous {
                let change = Change {
                    index,
                    previous: self.previous,
                    current,
                };
                self.previous = current;
                return Some(change);
            }
        }
        None
    }
}

pub struct VcdWriter<W: Write> {
    out: W,
    steps_per_sample: u64,
}

impl<W: Write> VcdWriter<W> {
    pub fn new(out: W, divider: u8) -> Self {
        Self {
            out,
            steps_per_sample: steps_per_sample(divider),
        }
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.out, "$timescale {TIMESCALE} $end")?;
        writeln!(self.out, "$scope module {SCOPE_NAME} $end")?;
        for ch in 0..CHANNEL_COUNT {
            writeln!(self.out, "$var wire 1 {} CH{} $end", IDENTIFIERS[usize::from(ch)], ch)?;
        }
        writeln!(self.out, "$upscope $end")?;
        writeln!(self.out, "$enddefinitions $end")
    }

    /// Dump the levels of all channels of the baseline sample.
    pub fn write_initial(&mut self, sample: u8) -> io::Result<()> {
        writeln!(self.out, "$dumpvars")?;
        for ch in 0..CHANNEL_COUNT {
            self.write_level(sample, ch)?;
        }
        writeln!(self.out, "$end")
    }

    pub fn write_change(&mut self, change: &Change) -> io::Result<()> {
        self.write_timestamp(change.index)?;
        for ch in change.flipped_channels() {
            self.write_level(change.current, ch)?;
        }
        Ok(())
    }

    /// Close the capture at `sample_count` samples.
    pub fn write_end(&mut self, sample_count: usize) -> io::Result<()> {
        self.write_timestamp(sample_count)
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_timestamp(&mut self, index: usize) -> io::Result<()> {
        writeln!(self.out, "#{}", index as u64 * self.steps_per_sample)
    }

    fn write_level(&mut self, sample: u8, channel: u8) -> io::Result<()> {
        let id = IDENTIFIERS[usize::from(channel)];
        writeln!(self.out, "{}{}", level(sample, channel), id)
    }
}

/// Encode `samples` captured with `divider` as a change dump into `out`.
///
/// The final timestamp marks the end of the buffer actually passed in.
#[tracing::instrument(level = "debug", skip_all, fields(samples = samples.len(), divider = divider))]
pub fn encode<W: Write>(samples: &[u8], divider: u8, out: W) -> io::Result<()> {
    let mut writer = VcdWriter::new(out, divider);
    writer.write_header()?;

    if let Some(&first) = samples.first() {
        writer.write_initial(first)?;
        for change in changes(samples) {
            writer.write_change(&change)?;
        }
    }

    writer.write_end(samples.len())?;
    writer.into_inner().flush()
}
