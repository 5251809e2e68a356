#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Server-side search core: the job entity, the dispatch engine that owns
//! the search cursor, and the durable JSON checkpoint store.

pub mod checkpoint;
pub mod engine;

mod job;

pub use checkpoint::{CheckpointData, CheckpointStore};
pub use engine::SearchEngine;
