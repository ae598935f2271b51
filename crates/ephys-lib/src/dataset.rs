use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("sweep {id}: expected {expected} channels, got {got}")]
    ChannelMismatch {
        id: String,
        expected: usize,
        got: usize,
    },
    #[error("sweep {id}: time vector has {time_len} samples, channel {channel} has {data_len}")]
    LengthMismatch {
        id: String,
        channel: usize,
        time_len: usize,
        data_len: usize,
    },
}

/// One recording trial: a time vector (milliseconds) plus one sample vector
/// per physical channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sweep {
    pub time_ms: Vec<f64>,
    pub channels: Vec<Vec<f64>>,
}

impl Sweep {
    pub fn sample_count(&self) -> usize {
        self.time_ms.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.channels.get(index).map(|c| c.as_slice())
    }
}

/// Ordered collection of sweeps keyed by identifier.
///
/// All sweeps share the same channel layout (count and meaning of columns);
/// sample counts may differ between sweeps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepDataset {
    sweeps: Vec<(String, Sweep)>,
}

impl SweepDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a sweep, replacing in place if the identifier already exists.
    pub fn add_sweep(
        &mut self,
        id: impl Into<String>,
        time_ms: Vec<f64>,
        channels: Vec<Vec<f64>>,
    ) -> Result<(), DatasetError> {
        let id = id.into();
        let expected = self.channel_count();
        if expected != 0 && channels.len() != expected {
            return Err(DatasetError::ChannelMismatch {
                id,
                expected,
                got: channels.len(),
            });
        }
        for (channel, samples) in channels.iter().enumerate() {
            if samples.len() != time_ms.len() {
                return Err(DatasetError::LengthMismatch {
                    id,
                    channel,
                    time_len: time_ms.len(),
                    data_len: samples.len(),
                });
            }
        }
        let sweep = Sweep { time_ms, channels };
        if let Some(slot) = self.sweeps.iter_mut().find(|(sid, _)| *sid == id) {
            slot.1 = sweep;
        } else {
            self.sweeps.push((id, sweep));
        }
        Ok(())
    }

    /// Sweep identifiers in insertion order.
    pub fn sweeps(&self) -> impl Iterator<Item = &str> {
        self.sweeps.iter().map(|(id, _)| id.as_str())
    }

    pub fn get_sweep(&self, id: &str) -> Option<&Sweep> {
        self.sweeps
            .iter()
            .find(|(sid, _)| sid == id)
            .map(|(_, sweep)| sweep)
    }

    /// Time vector plus one channel's samples, or `None` if either the sweep
    /// or the channel is missing.
    pub fn get_channel_vector(&self, id: &str, channel: usize) -> Option<(&[f64], &[f64])> {
        let sweep = self.get_sweep(id)?;
        let data = sweep.channel(channel)?;
        Some((sweep.time_ms.as_slice(), data))
    }

    pub fn sweep_count(&self) -> usize {
        self.sweeps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sweeps.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.sweeps
            .first()
            .map(|(_, sweep)| sweep.channels.len())
            .unwrap_or(0)
    }
}
