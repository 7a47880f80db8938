//! Microphone registry shared by every observation of a localization run

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::constants::QUAD_SIZE;
use crate::core::types::{Microphone, MicrophoneHandle, MicrophoneId, Position2, Tdoa4};
use crate::utils::config::MicrophoneConfig;
use crate::validation::error::{LocalizationError, LocalizationResult};

/// Ordered set of microphones with unique ids.
///
/// Observations borrow microphones from the array through `Arc` handles, so
/// geometry is stored once no matter how many observations reference it.
#[derive(Debug, Clone, Default)]
pub struct MicrophoneArray {
    microphones: Vec<MicrophoneHandle>,
    index: HashMap<MicrophoneId, usize>,
}

impl MicrophoneArray {
    pub fn new(microphones: Vec<Microphone>) -> LocalizationResult<Self> {
        let mut array = Self::default();
        for mic in microphones {
            array.insert(mic)?;
        }
        Ok(array)
    }

    pub fn from_config(configs: &[MicrophoneConfig]) -> LocalizationResult<Self> {
        Self::new(
            configs
                .iter()
                .map(|c| Microphone::new(c.id, c.name.clone(), c.position))
                .collect(),
        )
    }

    fn insert(&mut self, mic: Microphone) -> LocalizationResult<()> {
        if self.index.contains_key(&mic.id()) {
            return Err(LocalizationError::DuplicateMicrophone { id: mic.id() });
        }
        self.index.insert(mic.id(), self.microphones.len());
        self.microphones.push(Arc::new(mic));
        Ok(())
    }

    pub fn get(&self, id: MicrophoneId) -> Option<&MicrophoneHandle> {
        self.index.get(&id).map(|&i| &self.microphones[i])
    }

    pub fn len(&self) -> usize {
        self.microphones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.microphones.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MicrophoneHandle> {
        self.microphones.iter()
    }

    /// Build an observation over four registered microphones
    pub fn observation(&self, ids: [MicrophoneId; QUAD_SIZE], tdoa: f64) -> LocalizationResult<Tdoa4> {
        if let Some(&id) = ids.iter().find(|id| !self.index.contains_key(*id)) {
            return Err(LocalizationError::UnknownMicrophone { id });
        }
        let microphones = ids.map(|id| Arc::clone(&self.microphones[self.index[&id]]));
        Tdoa4::new(microphones, tdoa)
    }

    /// Mean microphone position, `None` for an empty array
    pub fn centroid(&self) -> Option<Position2> {
        if self.microphones.is_empty() {
            return None;
        }
        let n = self.microphones.len() as f64;
        let (sx, sy) = self.microphones.iter().fold((0.0, 0.0), |(sx, sy), mic| {
            let p = mic.position();
            (sx + p.x, sy + p.y)
        });
        Some(Position2::new(sx / n, sy / n))
    }

    /// Largest distance between any two microphones (meters)
    pub fn aperture(&self) -> f64 {
        let mut largest: f64 = 0.0;
        for (i, a) in self.microphones.iter().enumerate() {
            for b in &self.microphones[i + 1..] {
                largest = largest.max(a.distance_to(b));
            }
        }
        largest
    }
}
