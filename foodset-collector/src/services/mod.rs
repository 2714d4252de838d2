//! Collection pipeline services

pub mod dataset_recorder;
pub mod fetch_coordinator;
pub mod http_image_provider;
pub mod image_provider;
pub mod image_validator;
pub mod inventory_scanner;
pub mod quota_calculator;
pub mod reconciler;

pub use dataset_recorder::DatasetRecorder;
pub use fetch_coordinator::{FetchCoordinator, FetchJob, JobOutcome, JobStatus};
pub use http_image_provider::HttpImageProvider;
pub use image_provider::{FetchRequest, ImageProvider, ProviderError};
pub use image_validator::{FileVerdict, ImageValidator, ValidationReport};
pub use inventory_scanner::{InventoryScanner, ScanError};
pub use quota_calculator::{DeficitMap, DeficitReport, QuotaCalculator};
pub use reconciler::{Reconciler, SyncReport};
