//! Batch conversion for iwbridge
//!
//! Expands input paths into source assets, runs each through
//! `Queued → Parsing → Converting → Committing → Done` on a worker pool and
//! records the result in the asset catalog. One asset's failure never
//! affects another's.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use iwbridge_pipeline::{convert_batch, TargetConfig};
//!
//! let config = TargetConfig {
//!     output_dir: PathBuf::from("converted"),
//!     ..Default::default()
//! };
//! let result = convert_batch(&[PathBuf::from("assets")], &config).unwrap();
//! println!(
//!     "{} converted, {} failed, {} skipped",
//!     result.succeeded, result.failed, result.skipped
//! );
//! ```

pub mod config;
pub mod control;
pub mod discovery;
pub mod events;
pub mod report;
pub mod runner;

pub use config::{MismatchPolicy, RetryPolicy, TargetConfig};
pub use control::{with_retry, CancellationToken, KeyedLocks};
pub use discovery::{discover, DiscoveredSource, Discovery, DiscoveryFailure, SourceOrigin};
pub use events::{AssetState, ChannelSink, NullSink, ProgressEvent, ProgressSink, SkipReason, TracingSink};
pub use report::{AssetReport, BatchResult};
pub use runner::{convert_batch, convert_batch_with, Pipeline, REPORT_FILE};
