//! Data models for foodset-collector

pub mod image_record;
pub mod partition;
pub mod pass_summary;

pub use image_record::{
    DatasetStatistics, ImageRecord, LabeledSample, RecordOutcome, SYSTEM_DESCRIPTION,
    SYSTEM_OWNER_ID,
};
pub use partition::Partition;
pub use pass_summary::{PassMode, PassSummary};
