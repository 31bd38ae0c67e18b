//! # Audio Cache Module
//!
//! Persistent, size-bounded, content-addressable store for downloaded audio.
//!
//! Repeat requests for the same track replay a local file instead of paying
//! the network/download cost again. The cache is the authority on whether a
//! request streams remotely or plays from disk.
//!
//! ## Design
//!
//! - **Content addressing**: every source URL maps to a stable cache key
//!   (the platform video ID when recognizable, a truncated hash otherwise),
//!   which also names the payload file on disk.
//! - **Per-key locking**: at most one in-flight download per key; unrelated
//!   keys download fully in parallel.
//! - **LRU eviction**: when the configured budget would be exceeded, the
//!   least recently accessed entries are removed first, before downloading.
//! - **Self-healing**: records whose file disappeared are purged on lookup;
//!   a startup reconciliation pass removes stale records and orphan files
//!   left behind by a crash mid-download.
//!
//! ## Persisted layout
//!
//! One payload file per key (`<key>.<ext>`, extension chosen by the
//! extractor) plus `index.json` holding the entry table, all inside the
//! cache directory.
//!
//! ## Configuration
//!
//! ```env
//! CACHE_DIR=./cache           # Cache directory
//! CACHE_LIMIT_MB=2048         # Total size budget
//! MAX_CACHE_DURATION=1800     # Longest cacheable track, in seconds
//! DOWNLOAD_TIMEOUT=300        # Per-download bound, in seconds
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use resonance::cache::{AudioCacheManager, ResolvedAudio};
//! use resonance::config::Config;
//! use resonance::sources::YtDlpFetcher;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let cache = AudioCacheManager::new(&config, Arc::new(YtDlpFetcher::new())).await?;
//!
//! match cache.resolve_audio("https://youtu.be/dQw4w9WgXcQ", 212, false).await {
//!     ResolvedAudio::Local(path) => println!("replaying {}", path.display()),
//!     ResolvedAudio::Remote => println!("streaming directly"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod manager;
pub mod store;

pub use manager::{AudioCacheManager, CacheStats, DownloadError, ResolvedAudio};
pub use store::{CacheEntry, CacheStore};
