//! Matching predicted tracks against ground-truth object volumes.
//!
//! For each ground-truth object in a sequence every candidate track is scored
//! independently by mean per-frame IoU, and the object keeps its best score.
//! The match is greedy, not a one-to-one assignment: several objects may
//! claim the same track, which overstates quality when a prediction merges
//! neighbouring objects. Scores therefore approximate the DAVIS J measure
//! rather than reproduce it.

use std::collections::BTreeSet;

use crate::error::{EvalError, Result};
use crate::mask::{self, Mask};
use crate::metric;
use crate::types::TrackAnnotation;

/// One ground-truth raster: an object id per pixel, `0` is background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFrame {
    h: u32,
    w: u32,
    /// Row-major labels.
    labels: Vec<u16>,
}

impl LabelFrame {
    pub fn new(h: u32, w: u32, labels: Vec<u16>) -> Result<Self> {
        if labels.len() != h as usize * w as usize {
            return Err(EvalError::Raster(format!(
                "frame has {} labels, expected {}x{}",
                labels.len(),
                h,
                w
            )));
        }
        Ok(LabelFrame { h, w, labels })
    }

    /// Build a frame from row-major rows of equal length.
    pub fn from_rows<R: AsRef<[u16]>>(rows: &[R]) -> Result<Self> {
        let h = rows.len() as u32;
        let w = rows.first().map_or(0, |r| r.as_ref().len()) as u32;
        let mut labels = Vec::with_capacity(h as usize * w as usize);
        for row in rows {
            labels.extend_from_slice(row.as_ref());
        }
        LabelFrame::new(h, w, labels)
    }

    /// `(height, width)`.
    pub fn shape(&self) -> (u32, u32) {
        (self.h, self.w)
    }

    pub fn labels(&self) -> &[u16] {
        &self.labels
    }

    /// Foreground mask of pixels labelled `id`.
    pub fn object_mask(&self, id: u16) -> Mask {
        let w = self.w as usize;
        Mask::from_fn(self.h, self.w, |y, x| {
            self.labels[y as usize * w + x as usize] == id
        })
    }
}

/// A predicted object across a sequence; `None` marks frames with no prediction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    frames: Vec<Option<Mask>>,
}

impl Track {
    pub fn new(frames: Vec<Option<Mask>>) -> Self {
        Track { frames }
    }

    /// Decode every per-frame segmentation of an exported track.
    pub fn from_annotation(ann: &TrackAnnotation) -> Result<Self> {
        let frames = ann
            .segmentations
            .iter()
            .map(|seg| seg.as_ref().map(mask::decode_segmentation).transpose())
            .collect::<Result<Vec<_>>>()?;
        Ok(Track { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Option<Mask>] {
        &self.frames
    }
}

/// Best match of one ground-truth object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectScore {
    pub object_id: u16,
    pub score: f64,
}

/// Non-background ids present anywhere in the sequence, ascending.
pub fn object_ids(frames: &[LabelFrame]) -> Vec<u16> {
    let ids: BTreeSet<u16> = frames
        .iter()
        .flat_map(|f| f.labels.iter().copied())
        .filter(|&id| id != 0)
        .collect();
    ids.into_iter().collect()
}

/// Per-frame masks of object `id`, one per frame.
pub fn object_volume(frames: &[LabelFrame], id: u16) -> Vec<Mask> {
    frames.iter().map(|f| f.object_mask(id)).collect()
}

/// Score of one frame.
///
/// An absent prediction is right only when the object is not in the frame. A
/// present prediction is resampled to the ground-truth grid if needed and
/// scored by IoU; when both are empty the frame counts as correct.
pub fn frame_score(gt: &Mask, pred: Option<&Mask>) -> f64 {
    match pred {
        None if gt.is_blank() => 1.0,
        None => 0.0,
        Some(pred) => metric::resampled_iou(gt, pred).unwrap_or(1.0),
    }
}

/// Mean frame score over the first `min(volume.len(), track.len())` frames.
///
/// `None` when that overlap is empty, in which case the track does not
/// compete for the object.
pub fn track_score(volume: &[Mask], track: &Track) -> Option<f64> {
    let len = volume.len().min(track.len());
    if len == 0 {
        return None;
    }
    let total: f64 = volume
        .iter()
        .zip(track.frames())
        .map(|(gt, pred)| frame_score(gt, pred.as_ref()))
        .sum();
    Some(total / len as f64)
}

/// Highest track score for one object, `0.0` if no track competes.
pub fn best_score(volume: &[Mask], tracks: &[Track]) -> f64 {
    tracks
        .iter()
        .filter_map(|t| track_score(volume, t))
        .fold(0.0, f64::max)
}

/// Best score of every ground-truth object of a sequence.
pub fn match_sequence(frames: &[LabelFrame], tracks: &[Track]) -> Vec<ObjectScore> {
    object_ids(frames)
        .into_iter()
        .map(|object_id| ObjectScore {
            object_id,
            score: best_score(&object_volume(frames, object_id), tracks),
        })
        .collect()
}
