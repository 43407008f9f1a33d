//! src/dataloader/common/mod.rs
//!
//! Utilities shared by the single-threaded and worker iteration paths.

pub mod thread;
