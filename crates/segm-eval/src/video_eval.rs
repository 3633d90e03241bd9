//! Video evaluation: match exported tracks against DAVIS-style label rasters.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::error::{EvalError, Result};
use crate::loader;
use crate::params::VideoParams;
use crate::track::{self, LabelFrame, ObjectScore, Track};
use crate::types::VideoExport;

/// Ground-truth label rasters, looked up by sequence name.
pub trait FrameSource {
    /// All frames of `sequence` in playback order, or `None` if the source
    /// has no such sequence.
    fn frames(&self, sequence: &str) -> Result<Option<Vec<LabelFrame>>>;
}

/// Label rasters stored as `<root>/<sequence>/<frame>.<ext>`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    extension: String,
}

impl DirectorySource {
    /// Open the annotation tree of a dataset root.
    ///
    /// The tree `<dataset_root>/<params.annotations_subdir>` must exist.
    pub fn new(dataset_root: &Path, params: &VideoParams) -> Result<Self> {
        let root = dataset_root.join(&params.annotations_subdir);
        if !root.is_dir() {
            return Err(EvalError::NotFound(format!(
                "ground-truth annotations {}",
                root.display()
            )));
        }
        Ok(DirectorySource {
            root,
            extension: params.frame_extension.clone(),
        })
    }
}

impl FrameSource for DirectorySource {
    fn frames(&self, sequence: &str) -> Result<Option<Vec<LabelFrame>>> {
        let dir = self.root.join(sequence);
        if !dir.is_dir() {
            return Ok(None);
        }
        let files = loader::list_frames(&dir, &self.extension)?;
        debug!("{}: {} frames", sequence, files.len());
        let frames = files
            .iter()
            .map(|f| loader::read_label_frame(f))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(frames))
    }
}

impl FrameSource for HashMap<String, Vec<LabelFrame>> {
    fn frames(&self, sequence: &str) -> Result<Option<Vec<LabelFrame>>> {
        Ok(self.get(sequence).cloned())
    }
}

/// Candidate tracks grouped by sequence name, in export order.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracks {
    sequences: IndexMap<String, Vec<Track>>,
}

impl SequenceTracks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a track to `sequence`, creating the sequence if needed.
    pub fn push(&mut self, sequence: impl Into<String>, track: Track) {
        self.sequences.entry(sequence.into()).or_default().push(track);
    }

    /// Group an export's tracks by sequence.
    ///
    /// A video's sequence name is the stem of its `name` (`bear.mp4` →
    /// `bear`). Tracks referring to an unknown video are dropped.
    pub fn from_export(export: &VideoExport) -> Result<Self> {
        let names: HashMap<u64, String> = export
            .videos
            .iter()
            .map(|v| (v.id, sequence_name(&v.name)))
            .collect();

        let mut grouped = SequenceTracks::new();
        for ann in &export.annotations {
            let Some(name) = names.get(&ann.video_id) else {
                debug!("dropping track of unknown video {}", ann.video_id);
                continue;
            };
            grouped.push(name.clone(), Track::from_annotation(ann)?);
        }
        Ok(grouped)
    }

    pub fn get(&self, sequence: &str) -> Option<&[Track]> {
        self.sequences.get(sequence).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Track])> {
        self.sequences
            .iter()
            .map(|(name, tracks)| (name.as_str(), tracks.as_slice()))
    }
}

fn sequence_name(video_name: &str) -> String {
    Path::new(video_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| video_name.to_string())
}

/// Best match of one ground-truth object within a named sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceObjectScore {
    pub sequence: String,
    pub object_id: u16,
    pub score: f64,
}

/// Outcome of a video evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoReport {
    /// Per-object best scores, grouped by sequence in export order.
    pub objects: Vec<SequenceObjectScore>,
    /// Predicted sequences with no ground truth.
    pub skipped: Vec<String>,
}

impl VideoReport {
    /// Mean of all per-object scores, approximating the DAVIS J measure.
    /// `None` when no object was scored.
    pub fn j_score(&self) -> Option<f64> {
        if self.objects.is_empty() {
            return None;
        }
        Some(self.objects.iter().map(|o| o.score).sum::<f64>() / self.objects.len() as f64)
    }
}

impl fmt::Display for VideoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for o in &self.objects {
            writeln!(f, "  {} obj {}: IoU = {:.3}", o.sequence, o.object_id, o.score)?;
        }
        writeln!(f, "{}", "-".repeat(30))?;
        match self.j_score() {
            Some(j) => writeln!(f, "Mean IoU (J-score approximation): {:.4}", j)?,
            None => writeln!(f, "No IoUs computed. Check if video names match.")?,
        }
        write!(f, "{}", "-".repeat(30))
    }
}

enum SequenceOutcome {
    NoGroundTruth,
    NoFrames,
    Scored(Vec<ObjectScore>),
}

/// Score every predicted sequence against `source`.
///
/// Sequences missing from the source are skipped with a warning, and
/// sequences with zero frames are skipped silently. Sequences are matched in
/// parallel; any load or decode error aborts the evaluation.
pub fn evaluate<S>(predictions: &SequenceTracks, source: &S) -> Result<VideoReport>
where
    S: FrameSource + Sync,
{
    let sequences: Vec<(&str, &[Track])> = predictions.iter().collect();

    let outcomes = sequences
        .par_iter()
        .map(|&(name, tracks)| {
            let outcome = match source.frames(name)? {
                None => SequenceOutcome::NoGroundTruth,
                Some(frames) if frames.is_empty() => SequenceOutcome::NoFrames,
                Some(frames) => SequenceOutcome::Scored(track::match_sequence(&frames, tracks)),
            };
            Ok(outcome)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut report = VideoReport::default();
    for (&(name, _), outcome) in sequences.iter().zip(outcomes) {
        match outcome {
            SequenceOutcome::NoGroundTruth => {
                warn!("no ground truth for {}", name);
                report.skipped.push(name.to_string());
            }
            SequenceOutcome::NoFrames => {}
            SequenceOutcome::Scored(scores) => {
                for s in scores {
                    info!("{} obj {}: IoU = {:.3}", name, s.object_id, s.score);
                    report.objects.push(SequenceObjectScore {
                        sequence: name.to_string(),
                        object_id: s.object_id,
                        score: s.score,
                    });
                }
            }
        }
    }
    Ok(report)
}

/// Evaluate a zipped export against a DAVIS-style dataset root.
pub fn evaluate_export(
    dataset_root: &Path,
    export_zip: &Path,
    params: &VideoParams,
) -> Result<VideoReport> {
    info!(
        "evaluating {} against {}",
        export_zip.display(),
        dataset_root.display()
    );
    let export = loader::load_video_export(export_zip, &params.export_entry)?;
    let predictions = SequenceTracks::from_export(&export)?;
    let source = DirectorySource::new(dataset_root, params)?;
    evaluate(&predictions, &source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{encode, rle_to_segmentation, Mask};
    use crate::types::{TrackAnnotation, Video};

    fn frame(rows: &[[u16; 2]]) -> LabelFrame {
        LabelFrame::from_rows(rows).unwrap()
    }

    fn source() -> HashMap<String, Vec<LabelFrame>> {
        let mut gt = HashMap::new();
        gt.insert(
            "bear".to_string(),
            vec![
                frame(&[[1, 0], [0, 0]]),
                frame(&[[0, 1], [0, 0]]),
                frame(&[[0, 0], [0, 0]]),
            ],
        );
        gt.insert("empty".to_string(), Vec::new());
        gt
    }

    fn bear_track() -> Track {
        Track::new(vec![
            Some(Mask::from_rows(&[[true, false], [false, false]]).unwrap()),
            Some(Mask::from_rows(&[[false, false], [true, false]]).unwrap()),
        ])
    }

    #[test]
    fn test_sequence_tracks_push_groups() {
        let mut tracks = SequenceTracks::new();
        tracks.push("b", Track::default());
        tracks.push("a", Track::default());
        tracks.push("b", Track::default());
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks.get("b").unwrap().len(), 2);
        let order: Vec<&str> = tracks.iter().map(|(n, _)| n).collect();
        assert_eq!(order, ["b", "a"]);
    }

    #[test]
    fn test_from_export() {
        let seg = rle_to_segmentation(&encode(&Mask::from_fn(2, 2, |y, x| y == x)));
        let export = VideoExport {
            videos: vec![
                Video {
                    id: 3,
                    name: "videos/bear.mp4".into(),
                },
                Video {
                    id: 4,
                    name: "dog".into(),
                },
            ],
            annotations: vec![
                TrackAnnotation {
                    video_id: 3,
                    segmentations: vec![Some(seg.clone()), None],
                },
                TrackAnnotation {
                    video_id: 9,
                    segmentations: vec![Some(seg)],
                },
                TrackAnnotation {
                    video_id: 3,
                    segmentations: vec![],
                },
            ],
        };
        let tracks = SequenceTracks::from_export(&export).unwrap();
        assert_eq!(tracks.len(), 1);
        let bear = tracks.get("bear").unwrap();
        assert_eq!(bear.len(), 2);
        assert_eq!(bear[0].len(), 2);
        assert!(tracks.get("dog").is_none());
    }

    #[test]
    fn test_evaluate_scores_and_skips() {
        let mut predictions = SequenceTracks::new();
        predictions.push("bear", bear_track());
        predictions.push("missing", bear_track());
        predictions.push("empty", bear_track());

        let report = evaluate(&predictions, &source()).unwrap();
        assert_eq!(
            report.objects,
            vec![SequenceObjectScore {
                sequence: "bear".into(),
                object_id: 1,
                score: 0.5,
            }]
        );
        assert_eq!(report.skipped, ["missing"]);
        assert_eq!(report.j_score(), Some(0.5));
    }

    #[test]
    fn test_j_score_is_flat_mean_over_objects() {
        let report = VideoReport {
            objects: vec![
                SequenceObjectScore {
                    sequence: "a".into(),
                    object_id: 1,
                    score: 1.0,
                },
                SequenceObjectScore {
                    sequence: "a".into(),
                    object_id: 2,
                    score: 0.0,
                },
                SequenceObjectScore {
                    sequence: "b".into(),
                    object_id: 1,
                    score: 0.5,
                },
            ],
            skipped: vec![],
        };
        assert_eq!(report.j_score(), Some(0.5));
        assert_eq!(VideoReport::default().j_score(), None);
        assert!(VideoReport::default()
            .to_string()
            .contains("No IoUs computed"));
    }

    #[test]
    fn test_display() {
        let mut predictions = SequenceTracks::new();
        predictions.push("bear", bear_track());
        let text = evaluate(&predictions, &source()).unwrap().to_string();
        assert!(text.contains("  bear obj 1: IoU = 0.500"));
        assert!(text.contains("Mean IoU (J-score approximation): 0.5000"));
    }

    #[test]
    fn test_sequence_name() {
        assert_eq!(sequence_name("clips/bear.mp4"), "bear");
        assert_eq!(sequence_name("bear"), "bear");
    }
}
