//! Cache statistics tracking.

/// Counters for one cache chain, split by stage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    // Memory stage
    pub memory_hits: u64,
    pub memory_misses: u64,
    pub memory_evictions: u64,

    // File stage
    pub file_hits: u64,
    pub file_misses: u64,
    pub file_writes: u64,
    pub file_write_failures: u64,
    pub purged_tiles: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory-stage hit rate in the range 0.0 to 1.0.
    pub fn memory_hit_rate(&self) -> f64 {
        let total = self.memory_hits + self.memory_misses;
        if total == 0 {
            0.0
        } else {
            self.memory_hits as f64 / total as f64
        }
    }

    /// File-stage hit rate in the range 0.0 to 1.0.
    pub fn file_hit_rate(&self) -> f64 {
        let total = self.file_hits + self.file_misses;
        if total == 0 {
            0.0
        } else {
            self.file_hits as f64 / total as f64
        }
    }

    /// Combined hit rate across both stages.
    pub fn overall_hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.file_hits;
        let total = hits + self.file_misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Merge two stage-local counters into chain totals.
    pub fn merged(memory: &CacheStats, file: &CacheStats) -> Self {
        Self {
            memory_hits: memory.memory_hits,
            memory_misses: memory.memory_misses,
            memory_evictions: memory.memory_evictions,
            file_hits: file.file_hits,
            file_misses: file.file_misses,
            file_writes: file.file_writes,
            file_write_failures: file.file_write_failures,
            purged_tiles: file.purged_tiles,
        }
    }
}
