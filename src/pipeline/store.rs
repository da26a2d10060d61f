//! Port store: the only place pipeline state lives.
//!
//! Every port owns a ring of materializations. Slot 0 is the current wave,
//! slot `k` is `k` waves ago. The ring depth is fixed at build time to the
//! largest wave offset any consumer asks for, plus one.
//!
//! Writes never go through the store directly from a job: the executor checks
//! a producer's output slots out for the duration of its main call and hands
//! them over as [`OutputPort`]s, so a job can only mutate what it declared.

use crate::pipeline::error::{ConfigError, ConfigResult, PortError};
use crate::pipeline::id::{JobId, PortId};
use crate::pipeline::port::{DType, PortBuffer, PortKey};
use std::collections::{HashMap, VecDeque};

/// One materialization of a port.
#[derive(Debug, Clone)]
pub struct PortSlot {
    buffer: PortBuffer,
    valid: bool,
    wave: u64,
}

impl PortSlot {
    fn fresh(dtype: DType, shape: &[usize], wave: u64) -> Self {
        Self {
            buffer: PortBuffer::zeros(dtype, shape),
            valid: false,
            wave,
        }
    }

    pub fn buffer(&self) -> &PortBuffer {
        &self.buffer
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Wave this slot was materialized for.
    pub fn wave(&self) -> u64 {
        self.wave
    }
}

/// Write handle to one of the running job's own outputs.
#[derive(Debug)]
pub struct OutputPort {
    key: PortKey,
    slot: PortSlot,
}

impl OutputPort {
    pub fn key(&self) -> &PortKey {
        &self.key
    }

    pub fn buffer(&self) -> &PortBuffer {
        &self.slot.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut PortBuffer {
        &mut self.slot.buffer
    }

    pub fn set_valid(&mut self) {
        self.slot.valid = true;
    }

    pub fn is_valid(&self) -> bool {
        self.slot.valid
    }

    pub(crate) fn invalidate(&mut self) {
        self.slot.valid = false;
    }
}

#[derive(Debug)]
struct PortEntry {
    key: PortKey,
    dtype: DType,
    shape: Vec<usize>,
    color: bool,
    producer: JobId,
    depth: usize,
    history: VecDeque<PortSlot>,
    checked_out: bool,
}

/// Process-wide store of named, leveled, time-buffered ports.
#[derive(Debug, Default)]
pub struct PortStore {
    ports: Vec<PortEntry>,
    index: HashMap<PortKey, PortId>,
    current_wave: Option<u64>,
}

impl PortStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a port with its producer. Buffers are allocated on the first wave.
    ///
    /// Registering the same key again for the same producer returns the existing id.
    pub fn register(
        &mut self,
        key: PortKey,
        shape: Vec<usize>,
        dtype: DType,
        color: bool,
        producer: JobId,
    ) -> ConfigResult<PortId> {
        if let Some(&id) = self.index.get(&key) {
            let existing = &self.ports[id.index()];
            if existing.producer == producer
                && existing.dtype == dtype
                && existing.shape == shape
            {
                return Ok(id);
            }
            return Err(ConfigError::DuplicateProducer {
                port: key,
                first: existing.producer.to_string(),
                second: producer.to_string(),
            });
        }

        let id = PortId(self.ports.len() as u32);
        self.index.insert(key.clone(), id);
        self.ports.push(PortEntry {
            key,
            dtype,
            shape,
            color,
            producer,
            depth: 1,
            history: VecDeque::new(),
            checked_out: false,
        });
        Ok(id)
    }

    /// Grow the history of `key` so `wave_offset` can be served.
    pub fn retain(&mut self, key: &PortKey, wave_offset: u32) -> Result<(), PortError> {
        let id = self.id_of(key)?;
        let entry = &mut self.ports[id.index()];
        entry.depth = entry.depth.max(wave_offset as usize + 1);
        Ok(())
    }

    pub fn id_of(&self, key: &PortKey) -> Result<PortId, PortError> {
        self.index
            .get(key)
            .copied()
            .ok_or_else(|| PortError::NotFound(key.clone()))
    }

    pub fn contains(&self, key: &PortKey) -> bool {
        self.index.contains_key(key)
    }

    /// Read `key` as it was `wave_offset` waves ago.
    pub fn get(&self, key: &PortKey, wave_offset: u32) -> Result<&PortSlot, PortError> {
        let entry = &self.ports[self.id_of(key)?.index()];
        let offset = wave_offset as usize;
        if offset >= entry.history.len() {
            return Err(PortError::HistoryUnavailable {
                key: key.clone(),
                requested: wave_offset,
                available: entry.history.len(),
            });
        }
        if offset == 0 && entry.checked_out {
            return Err(PortError::WriteInProgress(key.clone()));
        }
        Ok(&entry.history[offset])
    }

    pub fn set_valid(&mut self, key: &PortKey) -> Result<(), PortError> {
        let id = self.id_of(key)?;
        let entry = &mut self.ports[id.index()];
        match entry.history.front_mut() {
            Some(slot) if !entry.checked_out => {
                slot.valid = true;
                Ok(())
            }
            Some(_) => Err(PortError::WriteInProgress(key.clone())),
            None => Err(PortError::HistoryUnavailable {
                key: key.clone(),
                requested: 0,
                available: 0,
            }),
        }
    }

    /// Validity of the current wave's materialization.
    pub fn is_valid(&self, key: &PortKey) -> bool {
        self.get(key, 0).map(PortSlot::is_valid).unwrap_or(false)
    }

    pub fn depth(&self, key: &PortKey) -> Option<usize> {
        self.id_of(key).ok().map(|id| self.ports[id.index()].depth)
    }

    pub fn producer(&self, key: &PortKey) -> Option<JobId> {
        self.id_of(key).ok().map(|id| self.ports[id.index()].producer)
    }

    /// Resolved buffer shape of `key`.
    pub fn shape(&self, key: &PortKey) -> Option<&[usize]> {
        self.id_of(key)
            .ok()
            .map(|id| self.ports[id.index()].shape.as_slice())
    }

    pub fn dtype(&self, key: &PortKey) -> Option<DType> {
        self.id_of(key).ok().map(|id| self.ports[id.index()].dtype)
    }

    pub fn is_color(&self, key: &PortKey) -> bool {
        self.id_of(key)
            .map(|id| self.ports[id.index()].color)
            .unwrap_or(false)
    }

    pub fn current_wave(&self) -> Option<u64> {
        self.current_wave
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PortKey> {
        self.ports.iter().map(|entry| &entry.key)
    }

    /// Current-wave slots that are valid, with their producer.
    pub fn valid_current(&self) -> impl Iterator<Item = (&PortKey, JobId, &PortSlot)> {
        self.ports.iter().filter_map(|entry| {
            entry
                .history
                .front()
                .filter(|slot| slot.valid && !entry.checked_out)
                .map(|slot| (&entry.key, entry.producer, slot))
        })
    }

    /// Rotate every ring: the oldest slot past the depth becomes the new
    /// current slot, invalidated. Allocates lazily until the ring is full.
    pub(crate) fn begin_wave(&mut self, wave: u64) {
        for entry in &mut self.ports {
            let recycled = if entry.history.len() >= entry.depth {
                entry.history.pop_back()
            } else {
                None
            };
            let slot = match recycled {
                Some(mut slot) => {
                    slot.valid = false;
                    slot.wave = wave;
                    slot
                }
                None => PortSlot::fresh(entry.dtype, &entry.shape, wave),
            };
            entry.history.push_front(slot);
            entry.history.truncate(entry.depth);
        }
        self.current_wave = Some(wave);
    }

    /// Take the current slot of `id` out of the store for its producer.
    pub(crate) fn checkout(&mut self, id: PortId) -> OutputPort {
        let wave = self.current_wave.unwrap_or(0);
        let entry = &mut self.ports[id.index()];
        if entry.history.is_empty() {
            entry
                .history
                .push_front(PortSlot::fresh(entry.dtype, &entry.shape, wave));
        }
        let placeholder = PortSlot {
            buffer: PortBuffer::empty(),
            valid: false,
            wave,
        };
        let mut slot = std::mem::replace(&mut entry.history[0], placeholder);
        slot.valid = false;
        entry.checked_out = true;
        OutputPort {
            key: entry.key.clone(),
            slot,
        }
    }

    pub(crate) fn checkin(&mut self, id: PortId, port: OutputPort) {
        let entry = &mut self.ports[id.index()];
        entry.history[0] = port.slot;
        entry.checked_out = false;
    }
}
