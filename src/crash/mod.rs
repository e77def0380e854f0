// src/crash/mod.rs

//! Crash artifact harvesting.
//!
//! - [`artifact`] finds artifacts on disk and parses their filenames.
//! - [`upload`] builds the upload request and holds the HTTP uploader.
//! - [`harvest`] runs harvest passes on a dedicated thread.

pub mod artifact;
pub mod harvest;
pub mod upload;

pub use artifact::CrashArtifact;
pub use harvest::{CrashHarvester, HarvestHandle, HarvestReport, HarvestWorker};
pub use upload::{CrashUploader, HttpUploader, UploadRequest, UploadResponse};
