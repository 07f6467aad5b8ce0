//! Background maintenance for the RAG engine.

pub mod cache_sweeper;

pub use cache_sweeper::{CacheSweeper, SweepStats};
