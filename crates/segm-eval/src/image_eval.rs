//! Image-set evaluation: one merged foreground mask per image, joined on key.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use log::debug;
use rayon::prelude::*;

use crate::error::Result;
use crate::index::{AnnotationIndex, IndexedMask};
use crate::metric::{self, PairScore};
use crate::types::Species;

/// Scores of one evaluated image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageScore {
    pub key: String,
    pub category_id: u64,
    pub score: PairScore,
}

/// Outcome of an image-set evaluation.
///
/// Means leave out undefined (empty vs. empty) pairs; they are `None` when no
/// pair had a defined value.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageReport {
    /// Number of ground-truth images that had a prediction.
    pub evaluated: usize,
    /// Number of ground-truth images without a prediction.
    pub missing: usize,
    pub mean_iou: Option<f64>,
    pub mean_dice: Option<f64>,
    /// Mean IoU per ground-truth category; only categories with at least one
    /// evaluated image appear.
    pub per_category_iou: BTreeMap<u64, Option<f64>>,
    /// Per-image scores in ground-truth order.
    pub images: Vec<ImageScore>,
}

/// Score every ground-truth image against the prediction with the same key.
///
/// A missing prediction is counted and skipped. A shape disagreement aborts
/// the whole evaluation with [`EvalError::ShapeMismatch`].
///
/// [`EvalError::ShapeMismatch`]: crate::error::EvalError::ShapeMismatch
pub fn evaluate<K>(gt: &AnnotationIndex<K>, pred: &AnnotationIndex<K>) -> Result<ImageReport>
where
    K: Hash + Eq + fmt::Display + Sync,
{
    let pairs: Vec<(&K, &IndexedMask, &IndexedMask)> = gt
        .iter()
        .filter_map(|(key, g)| pred.get(key).map(|p| (key, g, p)))
        .collect();
    let missing = gt.len() - pairs.len();
    debug!(
        "evaluating {} image pairs ({} without prediction)",
        pairs.len(),
        missing
    );

    let images = pairs
        .par_iter()
        .map(|&(key, g, p)| {
            let key = key.to_string();
            let score = metric::iou_dice(&g.mask, &p.mask, &key)?;
            Ok(ImageScore {
                key,
                category_id: g.category_id,
                score,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut per_category: BTreeMap<u64, Vec<Option<f64>>> = BTreeMap::new();
    for img in &images {
        per_category
            .entry(img.category_id)
            .or_default()
            .push(img.score.iou);
    }

    Ok(ImageReport {
        evaluated: images.len(),
        missing,
        mean_iou: metric::mean_defined(images.iter().map(|i| i.score.iou)),
        mean_dice: metric::mean_defined(images.iter().map(|i| i.score.dice)),
        per_category_iou: per_category
            .into_iter()
            .map(|(cat, ious)| (cat, metric::mean_defined(ious)))
            .collect(),
        images,
    })
}

fn fmt_score(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{:.4}", v),
        None => "nan".into(),
    }
}

impl fmt::Display for ImageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Images evaluated    : {}", self.evaluated)?;
        writeln!(f, "Missing predictions : {}", self.missing)?;
        writeln!(f, "Mean IoU            : {}", fmt_score(self.mean_iou))?;
        write!(f, "Mean Dice           : {}", fmt_score(self.mean_dice))?;
        for (&cat, &iou) in &self.per_category_iou {
            let label = Species::from_id(cat)
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| cat.to_string());
            write!(f, "\n{:<20}: {}", format!("IoU ({})", label), fmt_score(iou))?;
        }
        Ok(())
    }
}
