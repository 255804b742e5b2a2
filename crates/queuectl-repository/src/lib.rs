//! # QueueCtl Repository
//!
//! Durable job storage on SQLx.
//!
//! ```text
//! Worker / JobQueue
//!   ↓  Arc<dyn JobStore>      (storage interface)
//! SqliteJobStore | MySqlJobStore
//!   ↓
//! SQLite | MySQL
//! ```
//!
//! [`DatabasePool`] picks the backend from the URL scheme, runs the embedded
//! migrations and hands out the matching [`JobStore`].

pub mod mysql;
pub mod pool;
pub mod sqlite;
pub mod traits;

pub use mysql::MySqlJobStore;
pub use pool::*;
pub use sqlite::SqliteJobStore;
pub use traits::JobStore;
