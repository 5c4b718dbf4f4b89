//! Audio processing modules
//!
//! - Audio output (WAV saving, peak limiting)
//! - Filter-chain construction for the external audio tool
//! - Batch post-processing on a bounded worker pool

mod filter_chain;
mod output;
mod post_executor;

pub use filter_chain::{FilterOptions, FilterStage};
pub use output::{normalize_peak, AudioOutput};
pub use post_executor::{worker_count, PostExecutor, PostJob};
