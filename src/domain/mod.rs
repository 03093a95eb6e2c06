//! Domain Layer
//!
//! Value objects and port traits shared by the pipeline and the adapters.
//!
//! # Usage
//!
//! ```ignore
//! use kvwindow::domain::{IndexEntry, TimeWindowStore, WindowScore};
//!
//! async fn newest<S: TimeWindowStore>(store: &S, index: &str) -> Result<Vec<IndexEntry>> {
//!     store
//!         .range_index_descending(index, WindowScore::MIN, None, 10)
//!         .await
//! }
//! ```

pub mod ports;

pub use ports::{Clock, IndexEntry, OwnerId, SequenceKey, TimeWindowStore, WindowScore};
