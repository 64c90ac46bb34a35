use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Video not found: {path}")]
    NotFound { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start decoder: {0}")]
    Spawn(String),

    #[error("Could not decode {path}: {message}")]
    Unreadable { path: String, message: String },
}

/// A decoded frame as packed rgb24 bytes.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Sequential access to the frames of an opened video.
pub trait FrameSource {
    /// Next frame in presentation order, `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Option<RawFrame>;
}

pub trait VideoDecoder {
    type Source: FrameSource;

    fn open(&self, path: &Path) -> Result<Self::Source, DecodeError>;
}

/// Decodes through an `ffmpeg` process piping rawvideo to stdout.
#[derive(Debug, Clone, Default)]
pub struct FfmpegDecoder;

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn is_available() -> bool {
        ffmpeg_sidecar::command::ffmpeg_is_installed()
    }
}

impl VideoDecoder for FfmpegDecoder {
    type Source = FfmpegSource;

    fn open(&self, path: &Path) -> Result<FfmpegSource, DecodeError> {
        if !path.is_file() {
            return Err(DecodeError::NotFound {
                path: path.to_string_lossy().to_string(),
            });
        }

        let mut child = FfmpegCommand::new()
            .hide_banner()
            .input(path)
            // one output frame per decoded frame, no duplication or dropping
            .args(["-vsync", "passthrough"])
            .rawvideo()
            .spawn()?;

        let events = child
            .iter()
            .map_err(|e| DecodeError::Spawn(e.to_string()))?;

        let mut source = FfmpegSource {
            child,
            events,
            pending: None,
            last_error: None,
        };

        // Pull the first frame so an unreadable container surfaces here
        // rather than as an empty stream.
        source.pending = source.pull();
        if source.pending.is_none() {
            if let Some(message) = source.last_error.take() {
                return Err(DecodeError::Unreadable {
                    path: path.to_string_lossy().to_string(),
                    message,
                });
            }
        }

        Ok(source)
    }
}

pub struct FfmpegSource {
    child: FfmpegChild,
    events: FfmpegIterator,
    pending: Option<RawFrame>,
    last_error: Option<String>,
}

impl FfmpegSource {
    fn pull(&mut self) -> Option<RawFrame> {
        for event in self.events.by_ref() {
            match event {
                FfmpegEvent::OutputFrame(frame) => {
                    return Some(RawFrame {
                        width: frame.width,
                        height: frame.height,
                        data: frame.data,
                    });
                }
                FfmpegEvent::Error(message)
                | FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, message) => {
                    log::debug!("ffmpeg: {}", message);
                    self.last_error = Some(message);
                }
                _ => {}
            }
        }
        None
    }
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Option<RawFrame> {
        self.pending.take().or_else(|| self.pull())
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        // The process has usually exited already; both calls may fail harmlessly.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
