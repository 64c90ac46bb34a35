use super::frame::FrameArtifact;
use image::{DynamicImage, GrayImage, ImageReader};
use image_hasher::{HashAlg, Hasher, HasherConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_HASH_SIZE: u32 = 8;
pub const MIN_HASH_SIZE: u32 = 2;
pub const MAX_HASH_SIZE: u32 = 64;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Hash size must be between 2 and 64, got {0}")]
    InvalidHashSize(u32),
}

/// Hex-encoded perceptual hash of a frame.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of differing bits, or `None` when the two are not comparable.
    ///
    /// Informational only: duplicates are decided by exact equality.
    pub fn distance(&self, other: &Fingerprint) -> Option<u32> {
        let a = hex::decode(&self.0).ok()?;
        let b = hex::decode(&other.0).ok()?;
        if a.len() != b.len() {
            return None;
        }
        Some(a.iter().zip(&b).map(|(x, y)| (x ^ y).count_ones()).sum())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// DCT-based perceptual hash over the grayscale frame.
///
/// Stateless apart from the configured hasher, so a single instance can be
/// shared across threads.
pub struct Fingerprinter {
    hasher: Hasher,
    hash_size: u32,
}

impl Fingerprinter {
    pub fn new(hash_size: u32) -> Result<Self, FingerprintError> {
        if !(MIN_HASH_SIZE..=MAX_HASH_SIZE).contains(&hash_size) {
            return Err(FingerprintError::InvalidHashSize(hash_size));
        }

        Ok(Self {
            hasher: build_hasher(hash_size),
            hash_size,
        })
    }

    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }

    /// Length of every fingerprint this instance produces.
    pub fn hex_len(&self) -> usize {
        let bits = (self.hash_size * self.hash_size) as usize;
        bits.div_ceil(8) * 2
    }

    pub fn fingerprint(&self, frame: &FrameArtifact) -> Result<Fingerprint, FingerprintError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(FingerprintError::EmptyImage {
                width: frame.width(),
                height: frame.height(),
            });
        }
        Ok(self.hash_gray(&image::imageops::grayscale(&frame.image)))
    }

    pub fn fingerprint_image(&self, image: &DynamicImage) -> Result<Fingerprint, FingerprintError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(FingerprintError::EmptyImage {
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(self.hash_gray(&image.to_luma8()))
    }

    pub fn fingerprint_file(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        self.fingerprint_image(&image)
    }

    fn hash_gray(&self, gray: &GrayImage) -> Fingerprint {
        let hash = self.hasher.hash_image(gray);
        Fingerprint(hex::encode(hash.as_bytes()))
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self {
            hasher: build_hasher(DEFAULT_HASH_SIZE),
            hash_size: DEFAULT_HASH_SIZE,
        }
    }
}

// Median of the low-frequency DCT coefficients, the classic pHash.
fn build_hasher(hash_size: u32) -> Hasher {
    HasherConfig::new()
        .hash_size(hash_size, hash_size)
        .hash_alg(HashAlg::Median)
        .preproc_dct()
        .to_hasher()
}
