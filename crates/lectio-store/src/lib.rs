//! Filesystem artifact store and durable job registry.
//!
//! Owns the on-disk layout (`outputs_root`, `uploads_root`,
//! `job_data_root`), atomic JSON writes, wrapped/flat script I/O, the
//! bounded-cache job manager, and the persistent `video_info.json` records.

pub mod atomic;
pub mod error;
pub mod job_manager;
pub mod paths;
pub mod scripts;
pub mod video_info;

pub use error::{StoreError, StoreResult};
pub use job_manager::JobManager;
pub use paths::{JobWorkspace, StoreLayout};
