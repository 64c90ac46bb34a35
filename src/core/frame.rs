use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Opaque handle naming a sampled frame.
///
/// When frames are written to disk this is the file path; otherwise it is a
/// `<video>/frame_<index>` handle. Nothing downstream interprets it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameRef(pub String);

impl FrameRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Handle used when the frame only lives in memory.
    pub fn in_memory(video_name: &str, index: u64) -> Self {
        Self(format!("{}/{}", video_name, frame_file_stem(index)))
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One decoded frame, tagged with its position in the source video.
#[derive(Debug, Clone)]
pub struct FrameArtifact {
    pub video_name: String,
    pub index: u64,
    pub reference: FrameRef,
    pub image: RgbImage,
}

impl FrameArtifact {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Derive the video name from an uploaded filename: `clip.final.mp4` -> `clip.final`.
pub fn video_name_from(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());

    Path::new(&base)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or(base)
}

pub fn frame_file_stem(index: u64) -> String {
    format!("frame_{}", index)
}
