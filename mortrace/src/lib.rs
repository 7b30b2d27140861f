// Expose modules for testing
pub mod analysis;
pub mod cli;
pub mod domain;
pub mod export;
pub mod heap;
pub mod reorder;
pub mod tracking;
