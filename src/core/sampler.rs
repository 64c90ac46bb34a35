use super::decoder::{FfmpegDecoder, FrameSource, VideoDecoder};
use super::frame::{frame_file_stem, video_name_from, FrameArtifact, FrameRef};
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_INTERVAL: u64 = 10;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Sampling interval must be at least 1")]
    InvalidInterval,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write frame {path}: {source}")]
    WriteFrame {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Result of sampling one video.
///
/// `opened == false` means the decoder could not open the video at all;
/// `frames` is then empty. An opened video may still yield no frames.
#[derive(Debug, Default)]
pub struct Sampling {
    pub frames: Vec<FrameArtifact>,
    pub opened: bool,
}

/// Emits every `interval`-th frame of a video, starting with frame 0.
pub struct FrameSampler<D = FfmpegDecoder> {
    decoder: D,
    interval: u64,
    frames_dir: Option<PathBuf>,
}

impl FrameSampler<FfmpegDecoder> {
    pub fn new(interval: u64) -> Self {
        Self::with_decoder(FfmpegDecoder::new(), interval)
    }
}

impl<D: VideoDecoder> FrameSampler<D> {
    pub fn with_decoder(decoder: D, interval: u64) -> Self {
        Self {
            decoder,
            interval,
            frames_dir: None,
        }
    }

    /// Write emitted frames as JPEG under `<frames_dir>/<video_name>/`.
    pub fn persist_to(mut self, frames_dir: impl Into<PathBuf>) -> Self {
        self.frames_dir = Some(frames_dir.into());
        self
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn frames_dir(&self) -> Option<&Path> {
        self.frames_dir.as_deref()
    }

    /// Sample `video_path`, naming frames after `original_filename`.
    pub fn sample(
        &self,
        video_path: &Path,
        original_filename: &str,
    ) -> Result<Sampling, SampleError> {
        if self.interval == 0 {
            return Err(SampleError::InvalidInterval);
        }

        let video_name = video_name_from(original_filename);

        let mut source = match self.decoder.open(video_path) {
            Ok(source) => source,
            Err(e) => {
                log::warn!("Could not open {}: {}", video_path.display(), e);
                return Ok(Sampling::default());
            }
        };

        let output_dir = match &self.frames_dir {
            Some(root) => {
                let dir = root.join(&video_name);
                fs::create_dir_all(&dir)?;
                Some(dir)
            }
            None => None,
        };

        let mut frames = Vec::new();
        let mut index: u64 = 0;

        while let Some(raw) = source.next_frame() {
            if index % self.interval == 0 {
                match RgbImage::from_raw(raw.width, raw.height, raw.data) {
                    Some(image) => {
                        let reference = match &output_dir {
                            Some(dir) => self.write_frame(dir, index, &image)?,
                            None => FrameRef::in_memory(&video_name, index),
                        };
                        frames.push(FrameArtifact {
                            video_name: video_name.clone(),
                            index,
                            reference,
                            image,
                        });
                    }
                    None => {
                        log::warn!(
                            "Skipping frame {} of {}: buffer does not match {}x{}",
                            index,
                            video_path.display(),
                            raw.width,
                            raw.height
                        );
                    }
                }
            }
            index += 1;
        }

        log::debug!(
            "Decoded {} frames from {}, kept {}",
            index,
            video_path.display(),
            frames.len()
        );

        Ok(Sampling {
            frames,
            opened: true,
        })
    }

    fn write_frame(
        &self,
        dir: &Path,
        index: u64,
        image: &RgbImage,
    ) -> Result<FrameRef, SampleError> {
        let path = dir.join(format!("{}.jpg", frame_file_stem(index)));
        image.save(&path).map_err(|source| SampleError::WriteFrame {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
        Ok(FrameRef::from_path(&path))
    }
}
