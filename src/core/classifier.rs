use super::frame::FrameArtifact;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Classifier needs a frame on disk, got {reference}")]
    NotOnDisk { reference: String },

    #[error("Classifier exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Unrecognised classifier output: {0:?}")]
    UnknownLabel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Label {
    Deepfake,
    Real,
}

impl Label {
    /// Parse the first recognisable word of a classifier's output.
    pub fn parse(output: &str) -> Option<Self> {
        output
            .split(|c: char| !c.is_ascii_alphanumeric())
            .find_map(|word| match word.to_ascii_lowercase().as_str() {
                "deepfake" | "fake" | "synthetic" => Some(Label::Deepfake),
                "real" | "authentic" => Some(Label::Real),
                _ => None,
            })
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Deepfake => f.write_str("Deepfake"),
            Label::Real => f.write_str("Real"),
        }
    }
}

/// A pretrained image classifier, loaded once and shared for the life of the process.
pub trait Classifier: Send + Sync {
    fn classify(&self, frame: &FrameArtifact) -> Result<Label, ClassifyError>;
}

/// Runs an external program per frame: `<program> [args..] <frame path>`.
///
/// The program prints `Deepfake` or `Real` on stdout. Only works on frames
/// that were persisted to disk.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandClassifier {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Split a shell-like command line on whitespace into program and arguments.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: PathBuf::from(program),
            args: parts.map(str::to_string).collect(),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl Classifier for CommandClassifier {
    fn classify(&self, frame: &FrameArtifact) -> Result<Label, ClassifyError> {
        let path = Path::new(frame.reference.as_str());
        if !path.is_file() {
            return Err(ClassifyError::NotOnDisk {
                reference: frame.reference.to_string(),
            });
        }

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output()?;

        if !output.status.success() {
            return Err(ClassifyError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Label::parse(&stdout).ok_or_else(|| ClassifyError::UnknownLabel(stdout.trim().to_string()))
    }
}
