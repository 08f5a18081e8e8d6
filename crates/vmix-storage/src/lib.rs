//! Upload collaborator for finished videos.
//!
//! Provides the [`Uploader`] trait with an R2 (S3-compatible) implementation
//! and a local-directory implementation for development.

pub mod client;
pub mod error;
pub mod uploader;

pub use client::{R2Client, R2Config, DEFAULT_KEY_PREFIX};
pub use error::{StorageError, StorageResult};
pub use uploader::{object_key, LocalUploader, R2Uploader, Uploader};
