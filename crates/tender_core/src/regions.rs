use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Pending,
    Fetching,
    Retrying,
    Success,
    Failed,
    Recovered,
}

impl RegionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RegionState::Success | RegionState::Failed | RegionState::Recovered
        )
    }

    /// `recovered` counts the same as `success` for aggregation.
    pub fn is_successful(self) -> bool {
        matches!(self, RegionState::Success | RegionState::Recovered)
    }
}

/// Inbound status change for one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionUpdate {
    pub region: String,
    pub state: RegionState,
    pub count: Option<u64>,
    /// Server-side retry number for this region.
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionEntry {
    pub state: RegionState,
    pub count: Option<u64>,
    pub attempt: u32,
}

impl RegionEntry {
    fn pending() -> Self {
        Self {
            state: RegionState::Pending,
            count: None,
            attempt: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchProgress {
    pub batch: u32,
    pub total_batches: u32,
    pub regions: Vec<String>,
}

/// Per-region status slots for the current attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegionTracker {
    entries: BTreeMap<String, RegionEntry>,
    batch: Option<BatchProgress>,
}

impl RegionTracker {
    /// Clears all slots and seeds one `pending` entry per distinct region.
    pub fn seed<S: AsRef<str>>(&mut self, regions: &[S]) {
        self.entries.clear();
        self.batch = None;
        for region in regions {
            self.entries
                .insert(region.as_ref().to_string(), RegionEntry::pending());
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.batch = None;
    }

    /// Applies an update; returns whether anything changed.
    ///
    /// Stale updates (lower region attempt) and updates to regions that
    /// already finished successfully are dropped, which keeps
    /// [`RegionTracker::total_found`] monotone.
    pub fn apply(&mut self, update: RegionUpdate) -> bool {
        let Some(entry) = self.entries.get_mut(&update.region) else {
            tender_logging::tender_debug!("ignoring status for unselected region {}", update.region);
            return false;
        };
        if update.attempt < entry.attempt || entry.state.is_successful() {
            return false;
        }
        let count = if update.state.is_successful() {
            Some(update.count.unwrap_or(0))
        } else {
            None
        };
        let next = RegionEntry {
            state: update.state,
            count,
            attempt: update.attempt,
        };
        if *entry == next {
            return false;
        }
        *entry = next;
        true
    }

    pub fn set_batch(&mut self, batch: BatchProgress) -> bool {
        if self.batch.as_ref() == Some(&batch) {
            return false;
        }
        self.batch = Some(batch);
        true
    }

    pub fn total_found(&self) -> u64 {
        self.entries
            .values()
            .filter(|entry| entry.state.is_successful())
            .filter_map(|entry| entry.count)
            .sum()
    }

    /// True iff every seeded region is terminal. An empty tracker is not complete.
    pub fn all_complete(&self) -> bool {
        !self.entries.is_empty() && self.entries.values().all(|entry| entry.state.is_terminal())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, region: &str) -> Option<&RegionEntry> {
        self.entries.get(region)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RegionEntry)> {
        self.entries.iter()
    }

    pub fn batch(&self) -> Option<&BatchProgress> {
        self.batch.as_ref()
    }
}
