//! # Cache Module
//!
//! Resolution cache shared by every guild session.
//!
//! Resolving a query (search or URL) into a playable source means running
//! yt-dlp, which is slow and rate limited. The cache stores the outcome keyed
//! by the *normalized* query so the same song requested from two servers, or
//! twice in a row, only hits the extractor once per TTL window.
//!
//! ## Features
//!
//! - **TTL Support**: entries are never returned after they expire
//! - **Thread Safety**: concurrent lookups/updates through [`DashMap`]
//! - **Memory Bounded**: oldest entry evicted once capacity is reached
//!
//! ## Configuration
//!
//! ```env
//! CACHE_SIZE=500              # Maximum number of resolved entries
//! CACHE_TTL=3600              # Time-to-live in seconds (1 hour)
//! CACHE_SWEEP_INTERVAL=600    # Maintenance interval in seconds
//! ```
//!
//! [`DashMap`]: dashmap::DashMap

pub mod ttl_cache;

use std::{collections::HashSet, path::PathBuf};
use tracing::info;
use ttl_cache::TtlCache;

use crate::audio::resolver::ResolvedAudio;

/// Cache of resolved audio keyed by normalized query.
pub type ResolutionCache = TtlCache<String, ResolvedAudio>;

impl ResolutionCache {
    /// Removes expired entries; called from the maintenance loop.
    pub fn cleanup_old_entries(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        let removed = self.cleanup_expired();
        if removed > 0 {
            info!("🧹 Cache cleanup: removed {} expired entries", removed);
        }
        removed
    }

    /// Local files still referenced by a live entry.
    pub fn referenced_files(&self) -> HashSet<PathBuf> {
        self.live_values()
            .into_iter()
            .filter_map(|audio| audio.source.local_path().map(PathBuf::from))
            .collect()
    }
}
