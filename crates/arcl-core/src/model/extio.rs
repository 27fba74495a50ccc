// ── External I/O sets ──

use serde::{Deserialize, Serialize};

/// One external I/O set as mirrored from `extIODump`.
///
/// Bitfields are least significant byte first. `pending_update` marks a
/// set whose values were written or re-requested and not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtIoSet {
    pub name: String,
    pub inputs: Vec<u8>,
    pub outputs: Vec<u8>,
    pub pending_update: bool,
}

impl ExtIoSet {
    pub fn new(name: impl Into<String>, inputs: Vec<u8>, outputs: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            pending_update: false,
        }
    }

    pub fn is_dump(&self) -> bool {
        self.has_inputs() && self.has_outputs()
    }

    pub fn has_inputs(&self) -> bool {
        !self.inputs.is_empty()
    }

    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }

    pub fn is_remove(&self) -> bool {
        !self.has_inputs() && !self.has_outputs()
    }

    /// Value of input bit `bit`, if the set has that many inputs.
    pub fn input(&self, bit: usize) -> Option<bool> {
        bit_at(&self.inputs, bit)
    }

    pub fn output(&self, bit: usize) -> Option<bool> {
        bit_at(&self.outputs, bit)
    }
}

fn bit_at(bytes: &[u8], bit: usize) -> Option<bool> {
    bytes.get(bit / 8).map(|b| b & (1 << (bit % 8)) != 0)
}
