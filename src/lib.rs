//! Video frame fingerprinting and duplicate tracking.
//!
//! Frames are sampled from a video at a fixed interval, reduced to a DCT
//! perceptual hash and recorded in a SQLite relation that keeps each hash
//! once. Later uploads are checked against that history by exact hash.

pub mod config;
pub mod core;
pub mod database;

pub use crate::config::AppConfig;
pub use crate::core::{
    Classifier, Fingerprint, Fingerprinter, FrameArtifact, FrameRef, FrameSampler, Label,
    Pipeline, PipelineReport,
};
pub use crate::database::{HashRecord, HashStore};
