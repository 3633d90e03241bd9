//! Pairwise overlap metrics between same-shaped masks.
//!
//! Both metrics are undefined when the two masks are entirely background.
//! Undefined values are `None` and are left out of averages by
//! [`mean_defined`], so empty/empty comparisons are neither rewarded nor
//! penalised.

use crate::error::{EvalError, Result};
use crate::mask::Mask;

/// IoU and Dice of one mask pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    pub iou: Option<f64>,
    pub dice: Option<f64>,
}

/// Pixel counts shared by both metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Overlap {
    inter: u64,
    union: u64,
    area_a: u64,
    area_b: u64,
}

fn overlap(a: &Mask, b: &Mask, key: &str) -> Result<Overlap> {
    if a.shape() != b.shape() {
        return Err(EvalError::ShapeMismatch {
            key: key.to_string(),
            expected: a.shape(),
            found: b.shape(),
        });
    }
    Ok(count(a, b))
}

fn count(a: &Mask, b: &Mask) -> Overlap {
    let mut o = Overlap {
        inter: 0,
        union: 0,
        area_a: 0,
        area_b: 0,
    };
    for (&pa, &pb) in a.as_col_major().iter().zip(b.as_col_major()) {
        o.inter += u64::from(pa && pb);
        o.union += u64::from(pa || pb);
        o.area_a += u64::from(pa);
        o.area_b += u64::from(pb);
    }
    o
}

impl Overlap {
    fn iou(&self) -> Option<f64> {
        (self.union > 0).then(|| self.inter as f64 / self.union as f64)
    }

    fn dice(&self) -> Option<f64> {
        (self.union > 0).then(|| 2.0 * self.inter as f64 / (self.area_a + self.area_b) as f64)
    }
}

/// Intersection over union. `None` when both masks are empty.
pub fn iou(a: &Mask, b: &Mask) -> Result<Option<f64>> {
    Ok(overlap(a, b, "iou")?.iou())
}

/// Dice coefficient. `None` when both masks are empty.
pub fn dice(a: &Mask, b: &Mask) -> Result<Option<f64>> {
    Ok(overlap(a, b, "dice")?.dice())
}

/// IoU and Dice in one pass. `key` names the pair in a shape-mismatch error.
pub fn iou_dice(gt: &Mask, pred: &Mask, key: &str) -> Result<PairScore> {
    let o = overlap(gt, pred, key)?;
    Ok(PairScore {
        iou: o.iou(),
        dice: o.dice(),
    })
}

/// IoU after resampling `pred` onto the grid of `gt` by nearest neighbour.
/// `None` when both masks are empty.
pub fn resampled_iou(gt: &Mask, pred: &Mask) -> Option<f64> {
    if gt.shape() == pred.shape() {
        count(gt, pred).iou()
    } else {
        let (h, w) = gt.shape();
        count(gt, &pred.resize_nearest(h, w)).iou()
    }
}

/// Mean of the defined values; `None` when there are none.
pub fn mean_defined<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, n) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}
