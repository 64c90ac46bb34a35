use super::classifier::{Classifier, Label};
use super::decoder::{FfmpegDecoder, VideoDecoder};
use super::fingerprint::{Fingerprint, FingerprintError, Fingerprinter};
use super::frame::{video_name_from, FrameArtifact, FrameRef};
use super::sampler::{FrameSampler, SampleError};
use crate::config::AppConfig;
use crate::database::{HashStore, StoreError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Sampling failed: {0}")]
    Sample(#[from] SampleError),

    #[error("Hash store error: {0}")]
    Store(#[from] StoreError),

    #[error("Fingerprint setup failed: {0}")]
    Fingerprint(#[from] FingerprintError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fingerprint,
    Classify,
}

/// A single frame that could not be fully processed. The rest of the batch carries on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameFailure {
    pub frame: FrameRef,
    pub stage: FailureStage,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineReport {
    pub video_name: String,
    /// False when the video could not be opened; everything else is then empty.
    pub opened: bool,
    /// Sampled frames in presentation order.
    pub sampled: Vec<FrameRef>,
    pub hashes: BTreeMap<FrameRef, Fingerprint>,
    /// Frames whose hash was already stored before this run.
    pub duplicates: BTreeSet<FrameRef>,
    /// For each duplicate, the video that first stored its hash.
    pub duplicate_sources: BTreeMap<FrameRef, String>,
    pub labels: BTreeMap<FrameRef, Label>,
    pub errors: Vec<FrameFailure>,
}

impl PipelineReport {
    pub fn label_counts(&self) -> BTreeMap<Label, usize> {
        let mut counts = BTreeMap::new();
        for label in self.labels.values() {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

struct FrameOutcome<'a> {
    frame: &'a FrameArtifact,
    hash: Result<Fingerprint, FingerprintError>,
    label: Option<Result<Label, String>>,
}

/// Drives sampling, fingerprinting and storage for one video at a time.
pub struct Pipeline<D = FfmpegDecoder> {
    sampler: FrameSampler<D>,
    fingerprinter: Fingerprinter,
    store: HashStore,
    classifier: Option<Arc<dyn Classifier>>,
    parallel: bool,
}

impl Pipeline<FfmpegDecoder> {
    /// Build the FFmpeg-backed pipeline and initialize its store.
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let mut sampler = FrameSampler::new(config.interval);
        if config.persist_frames {
            sampler = sampler.persist_to(&config.frames_dir);
        }
        let fingerprinter = Fingerprinter::new(config.hash_size)?;
        let store = HashStore::open(&config.database_path)?;

        Ok(Self::new(sampler, fingerprinter, store).parallel(config.parallel_hashing))
    }
}

impl<D: VideoDecoder> Pipeline<D> {
    pub fn new(sampler: FrameSampler<D>, fingerprinter: Fingerprinter, store: HashStore) -> Self {
        Self {
            sampler,
            fingerprinter,
            store,
            classifier: None,
            parallel: false,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn store(&self) -> &HashStore {
        &self.store
    }

    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.fingerprinter
    }

    /// Sample, fingerprint and record one video.
    ///
    /// Duplicates are judged against what was stored before this call; two
    /// frames of the same video sharing a hash are not duplicates of each
    /// other. The whole batch is then stored.
    pub fn process(
        &self,
        video_path: &Path,
        original_filename: &str,
    ) -> Result<PipelineReport, PipelineError> {
        let start = Instant::now();
        let video_name = video_name_from(original_filename);
        let sampling = self.sampler.sample(video_path, original_filename)?;

        let mut report = PipelineReport {
            video_name: video_name.clone(),
            opened: sampling.opened,
            ..Default::default()
        };

        let fingerprinter = &self.fingerprinter;
        let classifier = self.classifier.as_ref();
        let outcomes: Vec<FrameOutcome<'_>> = if self.parallel {
            sampling
                .frames
                .par_iter()
                .map(|f| analyse(fingerprinter, classifier, f))
                .collect()
        } else {
            sampling
                .frames
                .iter()
                .map(|f| analyse(fingerprinter, classifier, f))
                .collect()
        };

        for outcome in outcomes {
            let reference = outcome.frame.reference.clone();
            report.sampled.push(reference.clone());

            match outcome.hash {
                Ok(hash) => {
                    if self.store.check_duplicate(&hash)? {
                        if let Some(owner) = self.store.find(&hash)? {
                            report
                                .duplicate_sources
                                .insert(reference.clone(), owner.video_name);
                        }
                        report.duplicates.insert(reference.clone());
                    }
                    report.hashes.insert(reference.clone(), hash);
                }
                Err(e) => {
                    log::warn!("Could not fingerprint {}: {}", reference, e);
                    report.errors.push(FrameFailure {
                        frame: reference.clone(),
                        stage: FailureStage::Fingerprint,
                        message: e.to_string(),
                    });
                }
            }

            match outcome.label {
                Some(Ok(label)) => {
                    report.labels.insert(reference, label);
                }
                Some(Err(message)) => {
                    log::warn!("Could not classify {}: {}", reference, message);
                    report.errors.push(FrameFailure {
                        frame: reference,
                        stage: FailureStage::Classify,
                        message,
                    });
                }
                None => {}
            }
        }

        let batch: Vec<(FrameRef, Fingerprint)> = report
            .sampled
            .iter()
            .filter_map(|frame| {
                report
                    .hashes
                    .get(frame)
                    .map(|hash| (frame.clone(), hash.clone()))
            })
            .collect();
        self.store.store(&video_name, &batch)?;

        log::info!(
            "Processed {}: {} frames hashed, {} duplicates, {} errors in {:.2?}",
            video_name,
            report.hashes.len(),
            report.duplicates.len(),
            report.errors.len(),
            start.elapsed()
        );

        Ok(report)
    }
}

fn analyse<'a>(
    fingerprinter: &Fingerprinter,
    classifier: Option<&Arc<dyn Classifier>>,
    frame: &'a FrameArtifact,
) -> FrameOutcome<'a> {
    let hash = fingerprinter.fingerprint(frame);
    let label = classifier.map(|c| c.classify(frame).map_err(|e| e.to_string()));
    FrameOutcome { frame, hash, label }
}
