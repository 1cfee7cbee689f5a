/// Number of digital inputs sampled by the instrument.
pub const CHANNEL_COUNT: u8 = 8;

const EDGE_BIT: u8 = 0x80;
const CHANNEL_MASK: u8 = 0x07;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TriggerConfigError {
    #[error("Trigger channel {channel} out of range, must be between 0 and 7")]
    ChannelOutOfRange { channel: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Edge::Rising => "rising",
            Edge::Falling => "falling",
        }
    }
}

/// Edge and channel the instrument arms its trigger on.
///
/// Packs into one register byte: bit 7 selects the rising edge, bits 2..0
/// hold the channel index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConfig {
    edge: Edge,
    channel: u8,
}

impl TriggerConfig {
    pub fn new(edge: Edge, channel: u8) -> Result<Self, TriggerConfigError> {
        if channel >= CHANNEL_COUNT {
            return Err(TriggerConfigError::ChannelOutOfRange { channel });
        }
        Ok(Self { edge, channel })
    }

    pub fn rising_edge(channel: u8) -> Result<Self, TriggerConfigError> {
        Self::new(Edge::Rising, channel)
    }

    pub fn falling_edge(channel: u8) -> Result<Self, TriggerConfigError> {
        Self::new(Edge::Falling, channel)
    }

    pub fn edge(&self) -> Edge {
        self.edge
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn to_byte(self) -> u8 {
        let edge = match self.edge {
            Edge::Rising => EDGE_BIT,
            Edge::Falling => 0,
        };
        edge | self.channel
    }

    /// Decode a register byte. Bits 6..3 are ignored.
    pub fn from_byte(value: u8) -> Self {
        let edge = if value & EDGE_BIT != 0 {
            Edge::Rising
        } else {
            Edge::Falling
        };
        Self {
            edge,
            channel: value & CHANNEL_MASK,
        }
    }
}

impl From<TriggerConfig> for u8 {
    fn from(trigger: TriggerConfig) -> Self {
        trigger.to_byte()
    }
}

impl From<u8> for TriggerConfig {
    fn from(value: u8) -> Self {
        Self::from_byte(value)
    }
}

impl std::fmt::Display for TriggerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} edge on CH{}", self.edge.as_str(), self.channel)
    }
}
