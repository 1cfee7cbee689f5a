//! # LogiAna RS
//!
//! A Rust library for driving a simple eight channel logic analyzer over a serial link
//! and turning its captures into change-dump (VCD) files for waveform viewers.
//!
//! ## Features
//!
//! - **Typed register access**: sample clock divider, trigger position and trigger edge/channel
//! - **Capture control**: start a run, poll the run state, read back the sample memory
//! - **Stale data protection**: every query drops leftover input before asking the device
//! - **VCD output**: streaming change-dump encoder, identical samples collapse to nothing
//! - **DataFrame output**: per-channel levels as a `polars` table
//! - **Pluggable transport**: anything implementing [`Transport`], [`SerialLink`] for real ports
//!
//! ## Examples
//!
//! ### Capture to a VCD file
//!
//! ```rust,no_run
//! use logiana_rs::{Edge, LinkSettings, LogicAnalyzer};
//! use std::time::Duration;
//!
//! let mut la = LogicAnalyzer::open(&LinkSettings::new("/dev/ttyUSB0"))?;
//!
//! la.set_divider(9)?; // one sample every 100 ns
//! la.set_position(128)?;
//! la.set_trigger(Edge::Rising, 0)?;
//!
//! la.start()?;
//! la.wait_until_idle(Duration::from_millis(100), Duration::from_secs(10))?;
//! la.save_vcd("capture.vcd")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Encoding a buffer
//!
//! ```rust
//! let samples = [0x00, 0x00, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00];
//!
//! let mut out = Vec::new();
//! logiana_rs::vcd::encode(&samples, 0, &mut out)?;
//!
//! let dump = String::from_utf8(out)?;
//! assert!(dump.ends_with("#2\n1a\n#5\n0a\n#8\n"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Trigger configuration
//!
//! ```rust
//! use logiana_rs::TriggerConfig;
//!
//! let trigger = TriggerConfig::falling_edge(3)?;
//! assert_eq!(trigger.to_byte(), 0x03);
//! assert!(TriggerConfig::rising_edge(8).is_err());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod logic_analyzer;
pub mod protocol;
pub mod serial_link;
pub mod trigger_config;
pub mod vcd;

// Re-export the main types for convenience
pub use trigger_config::{Edge, TriggerConfig, TriggerConfigError, CHANNEL_COUNT};

pub use serial_link::{LinkError, LinkSettings, SerialLink, Transport};

pub use protocol::{Command, ControlRequest, SAMPLE_COUNT};

pub use logic_analyzer::{LogicAnalyzer, LogicAnalyzerError, SampleBuffer};
