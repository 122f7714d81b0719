//! Command protocol between controller and worker.
//!
//! Commands travel on their own channel as a single `u32` tag. The tag set
//! is closed: adding a command means adding a variant here and a branch in
//! the worker loop. Tags the loop does not recognize are ignored.

use crate::shm::Record;

/// Command from controller to worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Leave the loop and exit the process.
    Stop = 1,
}

impl Command {
    /// Wire tag of this command.
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Decode a wire tag, `None` if unknown.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Command record as stored on the command channel: `{cmd: tag}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRecord {
    pub cmd: u32,
}

impl CommandRecord {
    pub fn command(&self) -> Option<Command> {
        Command::from_tag(self.cmd)
    }
}

impl From<Command> for CommandRecord {
    fn from(command: Command) -> Self {
        Self { cmd: command.tag() }
    }
}

impl Record for CommandRecord {
    type Descriptor = ();

    fn descriptor(&self) {}

    fn encoded_len(_: &()) -> usize {
        std::mem::size_of::<u32>()
    }

    fn encode(&self, slot: &mut [u8]) {
        slot.copy_from_slice(&self.cmd.to_ne_bytes());
    }

    fn decode(_: &(), slot: &[u8]) -> Self {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(slot);
        Self {
            cmd: u32::from_ne_bytes(bytes),
        }
    }
}
