use frameprint::core::{DecodeError, FrameSource, RawFrame, VideoDecoder};
use frameprint::{Fingerprinter, FrameRef, FrameSampler, HashStore, Label, Pipeline};
use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct Frames(VecDeque<RawFrame>);

impl FrameSource for Frames {
    fn next_frame(&mut self) -> Option<RawFrame> {
        self.0.pop_front()
    }
}

/// A "video" whose frame `i` is a bar that moves one block per ten frames.
struct MovingBar {
    frame_count: u32,
}

impl VideoDecoder for MovingBar {
    type Source = Frames;

    fn open(&self, path: &Path) -> Result<Frames, DecodeError> {
        if path.extension().and_then(|e| e.to_str()) != Some("mp4") {
            return Err(DecodeError::NotFound {
                path: path.display().to_string(),
            });
        }
        let (w, h) = (48u32, 48u32);
        let frames = (0..self.frame_count)
            .map(|i| {
                let bar = (i / 10) % 6;
                let mut data = Vec::with_capacity((w * h * 3) as usize);
                for y in 0..h {
                    for x in 0..w {
                        let lit = x / 8 == bar || (bar % 2 == 1 && y / 8 == bar);
                        let v = if lit { 230 } else { 20 };
                        data.extend_from_slice(&[v, v / 2, 255 - v]);
                    }
                }
                RawFrame {
                    width: w,
                    height: h,
                    data,
                }
            })
            .collect();
        Ok(Frames(frames))
    }
}

fn build(temp_dir: &TempDir, frame_count: u32) -> Pipeline<MovingBar> {
    let sampler = FrameSampler::with_decoder(MovingBar { frame_count }, 10)
        .persist_to(temp_dir.path().join("frames"));
    let store = HashStore::open(temp_dir.path().join("hashes.db")).unwrap();
    Pipeline::new(sampler, Fingerprinter::default(), store)
}

#[test]
fn upload_then_reupload() {
    let temp_dir = TempDir::new().unwrap();
    let pipeline = build(&temp_dir, 25);

    let first = pipeline
        .process(Path::new("/uploads/abc123.mp4"), "interview.mp4")
        .unwrap();

    assert!(first.opened);
    assert_eq!(first.video_name, "interview");
    assert_eq!(first.sampled.len(), 3);
    for index in [0, 10, 20] {
        let path = temp_dir
            .path()
            .join("frames")
            .join("interview")
            .join(format!("frame_{}.jpg", index));
        assert!(path.exists(), "missing {}", path.display());
        assert!(first.hashes.contains_key(&FrameRef::from_path(&path)));
    }
    assert!(first.duplicates.is_empty());

    let distinct: BTreeSet<_> = first.hashes.values().cloned().collect();
    let store = pipeline.store();
    assert_eq!(store.count().unwrap(), distinct.len() as u64);
    for hash in &distinct {
        assert!(store.check_duplicate(hash).unwrap());
    }

    // Same content under another name: every frame is a duplicate, nothing new stored
    let second = pipeline
        .process(Path::new("/uploads/def456.mp4"), "interview-copy.mp4")
        .unwrap();
    assert_eq!(second.duplicates.len(), second.hashes.len());
    assert!(
        second
            .duplicate_sources
            .values()
            .all(|owner| owner == "interview")
    );
    assert_eq!(store.count().unwrap(), distinct.len() as u64);
    assert!(store.records(Some("interview-copy")).unwrap().is_empty());
}

#[test]
fn unreadable_upload_is_empty_not_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let pipeline = build(&temp_dir, 25);

    let report = pipeline
        .process(Path::new("/uploads/garbage.bin"), "garbage.bin")
        .unwrap();

    assert!(!report.opened);
    assert!(report.hashes.is_empty());
    assert!(report.duplicates.is_empty());
    assert_eq!(pipeline.store().count().unwrap(), 0);
}

#[cfg(unix)]
#[test]
fn external_classifier_labels_persisted_frames() {
    use frameprint::core::CommandClassifier;

    let temp_dir = TempDir::new().unwrap();
    let classifier = CommandClassifier::new("sh").arg("-c").arg("echo Deepfake");
    let pipeline = build(&temp_dir, 12).with_classifier(Arc::new(classifier));

    let report = pipeline.process(Path::new("clip.mp4"), "clip.mp4").unwrap();

    assert_eq!(report.labels.len(), 2);
    assert_eq!(report.label_counts().get(&Label::Deepfake), Some(&2));
    assert!(report.errors.is_empty());
}
