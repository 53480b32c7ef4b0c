pub mod config;
pub mod errors;
pub mod render;
pub mod sync;
pub mod telemetry;

pub use errors::{SyncError, SyncResult};
