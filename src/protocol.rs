use crate::trigger_config::TriggerConfig;

/// Number of samples the instrument captures per run.
pub const SAMPLE_COUNT: usize = 128 * 1024;

const WRITE_FLAG: u8 = 0x80;
const START_BIT: u8 = 0x01;
const READ_DATA_OPCODE: u8 = 5;

/// Instrument registers addressed by the get/set command pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Divide,
    Position,
    Trigger,
    Control,
}

impl Register {
    pub fn opcode(&self) -> u8 {
        match self {
            Register::Divide => 1,
            Register::Position => 2,
            Register::Trigger => 3,
            Register::Control => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Arm the capture.
    Start,
    /// Query the status byte; bit 0 is the running flag.
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetDivide(u8),
    GetDivide,
    SetPosition(u8),
    GetPosition,
    SetTrigger(TriggerConfig),
    GetTrigger,
    Control(ControlRequest),
    ReadData,
}

/// Request bytes for one command, at most an opcode and a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; 2],
    len: usize,
}

impl Frame {
    fn bare(opcode: u8) -> Self {
        Self {
            bytes: [opcode, 0],
            len: 1,
        }
    }

    fn write(register: Register, payload: u8) -> Self {
        Self {
            bytes: [WRITE_FLAG | register.opcode(), payload],
            len: 2,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Length of the reply a command provokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    None,
    Byte,
    SampleBlock,
}

impl Reply {
    /// Bytes to read back, given the instrument's capture depth.
    pub fn len(&self, sample_count: usize) -> usize {
        match self {
            Reply::None => 0,
            Reply::Byte => 1,
            Reply::SampleBlock => sample_count,
        }
    }
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::SetDivide(_) | Command::GetDivide => Register::Divide.opcode(),
            Command::SetPosition(_) | Command::GetPosition => Register::Position.opcode(),
            Command::SetTrigger(_) | Command::GetTrigger => Register::Trigger.opcode(),
            Command::Control(_) => Register::Control.opcode(),
            Command::ReadData => READ_DATA_OPCODE,
        }
    }

    pub fn encode(&self) -> Frame {
        match *self {
            Command::SetDivide(v) => Frame::write(Register::Divide, v),
            Command::SetPosition(v) => Frame::write(Register::Position, v),
            Command::SetTrigger(trigger) => Frame::write(Register::Trigger, trigger.to_byte()),
            Command::Control(ControlRequest::Start) => Frame::write(Register::Control, START_BIT),
            Command::GetDivide
            | Command::GetPosition
            | Command::GetTrigger
            | Command::Control(ControlRequest::Status)
            | Command::ReadData => Frame::bare(self.opcode()),
        }
    }

    pub fn reply(&self) -> Reply {
        match self {
            Command::SetDivide(_)
            | Command::SetPosition(_)
            | Command::SetTrigger(_)
            | Command::Control(ControlRequest::Start) => Reply::None,
            Command::GetDivide
            | Command::GetPosition
            | Command::GetTrigger
            | Command::Control(ControlRequest::Status) => Reply::Byte,
            Command::ReadData => Reply::SampleBlock,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::SetDivide(_) => "set-divide",
            Command::GetDivide => "get-divide",
            Command::SetPosition(_) => "set-position",
            Command::GetPosition => "get-position",
            Command::SetTrigger(_) => "set-trigger",
            Command::GetTrigger => "get-trigger",
            Command::Control(ControlRequest::Start) => "control-start",
            Command::Control(ControlRequest::Status) => "control-status",
            Command::ReadData => "read-data",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
