//! Local persistence for smart-room samples and actuator events.
//!
//! This crate provides SQLite-based storage for the telemetry bridge.
//!
//! # Features
//!
//! - Store complete samples, decomposed into one row per channel, atomically
//! - Store actuator state changes
//! - Look up the latest sample and the latest event per actuator
//! - Query the combined activity log with filters and pagination
//!
//! # Example
//!
//! ```
//! use smartroom_store::Store;
//! use smartroom_types::Sample;
//! use time::OffsetDateTime;
//!
//! let store = Store::open_in_memory()?;
//!
//! let sample = Sample {
//!     temperature: 24.5,
//!     humidity: 55.0,
//!     light_intensity: 80.0,
//!     current_status: true,
//! };
//! let stored = store.insert_sample(&sample, OffsetDateTime::now_utc())?;
//!
//! assert_eq!(store.latest_sample()?, Some(stored));
//! # Ok::<(), smartroom_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{ActivityEntry, ActivityPage, StoredActuatorEvent, StoredSample};
pub use queries::{ActivityFilter, ActivityQuery, DEFAULT_PAGE_SIZE, StatusFilter};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/smartroom/data.db`
/// - macOS: `~/Library/Application Support/smartroom/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\smartroom\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("smartroom")
        .join("data.db")
}
