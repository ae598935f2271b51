use serde::{Deserialize, Serialize};

/// Logical role a physical recording column can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelRole {
    Voltage,
    Current,
}

impl ChannelRole {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelRole::Voltage => "Voltage",
            ChannelRole::Current => "Current",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ChannelRole::Voltage => "mV",
            ChannelRole::Current => "pA",
        }
    }
}

/// Maps the voltage/current roles onto physical column indices.
///
/// The two roles always point at distinct columns; `swap` exchanges them
/// atomically so the invariant cannot be observed broken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMap {
    voltage: usize,
    current: usize,
    swapped: bool,
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            voltage: 0,
            current: 1,
            swapped: false,
        }
    }
}

impl ChannelMap {
    pub fn new(voltage: usize, current: usize) -> Self {
        Self {
            voltage,
            current,
            swapped: false,
        }
    }

    pub fn voltage_channel(&self) -> usize {
        self.voltage
    }

    pub fn current_channel(&self) -> usize {
        self.current
    }

    pub fn channel_for(&self, role: ChannelRole) -> usize {
        match role {
            ChannelRole::Voltage => self.voltage,
            ChannelRole::Current => self.current,
        }
    }

    /// Exchange the two role bindings and toggle the swapped flag.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.voltage, &mut self.current);
        self.swapped = !self.swapped;
    }

    pub fn is_swapped(&self) -> bool {
        self.swapped
    }
}
