pub mod classifier;
pub mod decoder;
pub mod fingerprint;
pub mod frame;
pub mod pipeline;
pub mod sampler;

pub use classifier::{Classifier, ClassifyError, CommandClassifier, Label};
pub use decoder::{DecodeError, FfmpegDecoder, FrameSource, RawFrame, VideoDecoder};
pub use fingerprint::{Fingerprint, FingerprintError, Fingerprinter};
pub use frame::{video_name_from, FrameArtifact, FrameRef};
pub use pipeline::{FailureStage, FrameFailure, Pipeline, PipelineError, PipelineReport};
pub use sampler::{FrameSampler, SampleError, Sampling};
