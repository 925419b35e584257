//! Progress-callback trait for per-stage and per-item pipeline events.
//!
//! Inject an [`Arc<dyn StageProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as each stage walks its periods (stages 1–3) or statement files
//! (stages 4–5).
//!
//! # Example
//!
//! ```rust
//! use edgequake_finstat::{PipelineConfig, Stage, StageProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl StageProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, stage: Stage, label: &str) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{stage}: {label} done ({n} so far)");
//!     }
//! }
//!
//! let config = PipelineConfig::builder("ACME", ["2023"])
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::Stage;
use std::sync::Arc;

/// Called by the pipeline as it processes each stage and item.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Stages run sequentially, but implementations must
/// still be `Send + Sync` because the text-extraction stage reports from a
/// blocking worker thread.
pub trait StageProgressCallback: Send + Sync {
    /// Called once before a stage touches its first item.
    ///
    /// # Arguments
    /// * `stage`      : the stage about to run
    /// * `total_items`: periods or files the stage will attempt
    fn on_stage_start(&self, stage: Stage, total_items: usize) {
        let _ = (stage, total_items);
    }

    /// Called when one period/file produced its output.
    fn on_item_complete(&self, stage: Stage, label: &str) {
        let _ = (stage, label);
    }

    /// Called when one period/file was skipped.
    ///
    /// # Arguments
    /// * `reason`: human-readable description of the [`crate::error::ItemError`]
    fn on_item_skipped(&self, stage: Stage, label: &str, reason: &str) {
        let _ = (stage, label, reason);
    }

    /// Called once after the stage attempted every item, before any fatal
    /// error is returned.
    fn on_stage_complete(&self, stage: Stage, total_items: usize, success_count: usize) {
        let _ = (stage, total_items, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl StageProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn StageProgressCallback>;
