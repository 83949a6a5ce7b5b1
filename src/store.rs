//! Seam to the height/content store.
//!
//! The store itself lives outside this crate. The transport only needs the
//! local data heights to put in outbound `version` announcements.

use std::sync::RwLock;

use crate::core::heights::DataHeights;

/// Source of this node's current synchronisation progress.
pub trait HeightSource: Send + Sync {
    fn current_heights(&self) -> DataHeights;
}

/// In-memory heights, updated by whoever owns the real store.
#[derive(Debug, Default)]
pub struct FixedHeights {
    heights: RwLock<DataHeights>,
}

impl FixedHeights {
    pub fn new(heights: DataHeights) -> Self {
        Self {
            heights: RwLock::new(heights),
        }
    }

    pub fn set(&self, heights: DataHeights) {
        match self.heights.write() {
            Ok(mut guard) => *guard = heights,
            Err(poisoned) => *poisoned.into_inner() = heights,
        }
    }
}

impl HeightSource for FixedHeights {
    fn current_heights(&self) -> DataHeights {
        match self.heights.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
