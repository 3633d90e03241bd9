//! Boolean masks and the COCO run-length codec.
//!
//! Masks are stored column-major (Fortran order): pixel `(x, y)` lives at
//! index `y + h * x`, the same order in which RLE runs are counted, so
//! encoding and decoding are single linear scans.

use crate::error::{EvalError, Result};
use crate::types::{Annotation, Rle, Segmentation};

/// A binary mask of fixed `height × width`; `true` is foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    h: u32,
    w: u32,
    data: Vec<bool>,
}

impl Mask {
    /// An all-background mask.
    pub fn new(h: u32, w: u32) -> Self {
        Mask {
            h,
            w,
            data: vec![false; h as usize * w as usize],
        }
    }

    /// Wrap column-major pixel data. `data.len()` must equal `h * w`.
    pub fn from_col_major(h: u32, w: u32, data: Vec<bool>) -> Result<Self> {
        if data.len() != h as usize * w as usize {
            return Err(EvalError::Raster(format!(
                "mask data has {} pixels, expected {}x{}",
                data.len(),
                h,
                w
            )));
        }
        Ok(Mask { h, w, data })
    }

    /// Build a mask from row-major rows. All rows must have the same length.
    pub fn from_rows<R: AsRef<[bool]>>(rows: &[R]) -> Result<Self> {
        let h = rows.len() as u32;
        let w = rows.first().map_or(0, |r| r.as_ref().len()) as u32;
        if rows.iter().any(|r| r.as_ref().len() != w as usize) {
            return Err(EvalError::Raster("mask rows have unequal lengths".into()));
        }
        Ok(Mask::from_fn(h, w, |y, x| rows[y as usize].as_ref()[x as usize]))
    }

    pub fn from_fn(h: u32, w: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity(h as usize * w as usize);
        for x in 0..w {
            for y in 0..h {
                data.push(f(y, x));
            }
        }
        Mask { h, w, data }
    }

    pub fn height(&self) -> u32 {
        self.h
    }

    pub fn width(&self) -> u32 {
        self.w
    }

    /// `(height, width)`.
    pub fn shape(&self) -> (u32, u32) {
        (self.h, self.w)
    }

    pub fn get(&self, y: u32, x: u32) -> bool {
        self.data[self.index(y, x)]
    }

    pub fn set(&mut self, y: u32, x: u32, value: bool) {
        let i = self.index(y, x);
        self.data[i] = value;
    }

    fn index(&self, y: u32, x: u32) -> usize {
        assert!(y < self.h && x < self.w, "pixel ({x}, {y}) out of bounds");
        y as usize + self.h as usize * x as usize
    }

    pub fn as_col_major(&self) -> &[bool] {
        &self.data
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> u64 {
        self.data.iter().filter(|&&v| v).count() as u64
    }

    /// True when no pixel is foreground.
    pub fn is_blank(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    /// Resample to `h × w` by nearest neighbour.
    ///
    /// Source coordinates are `floor(dst * src_len / dst_len)`, the same
    /// sampling as OpenCV's `INTER_NEAREST`.
    pub fn resize_nearest(&self, h: u32, w: u32) -> Mask {
        if (h, w) == self.shape() {
            return self.clone();
        }
        if self.h == 0 || self.w == 0 {
            return Mask::new(h, w);
        }
        let src_h = self.h as u64;
        let src_w = self.w as u64;
        let rows: Vec<u32> = (0..h as u64)
            .map(|y| ((y * src_h / h as u64).min(src_h - 1)) as u32)
            .collect();
        let cols: Vec<u32> = (0..w as u64)
            .map(|x| ((x * src_w / w as u64).min(src_w - 1)) as u32)
            .collect();
        Mask::from_fn(h, w, |y, x| self.get(rows[y as usize], cols[x as usize]))
    }
}

/// Encode a mask into RLE.
pub fn encode(mask: &Mask) -> Rle {
    let mut counts = Vec::new();
    let mut p = false;
    let mut c: u32 = 0;

    for &v in &mask.data {
        if v != p {
            counts.push(c);
            c = 0;
            p = v;
        }
        c += 1;
    }
    counts.push(c);

    Rle {
        h: mask.h,
        w: mask.w,
        counts,
    }
}

/// Decode an RLE back to a mask.
///
/// Fails if the runs do not cover exactly `h * w` pixels.
pub fn decode(rle: &Rle) -> Result<Mask> {
    let n = rle.h as usize * rle.w as usize;
    let mut data = Vec::with_capacity(n);
    let mut v = false;
    for &c in &rle.counts {
        let c = c as usize;
        if data.len() + c > n {
            return Err(EvalError::Rle(format!(
                "runs overflow {}x{} mask",
                rle.h, rle.w
            )));
        }
        data.resize(data.len() + c, v);
        v = !v;
    }
    if data.len() != n {
        return Err(EvalError::Rle(format!(
            "runs cover {} pixels but {}x{} mask has {}",
            data.len(),
            rle.h,
            rle.w,
            n
        )));
    }
    Ok(Mask {
        h: rle.h,
        w: rle.w,
        data,
    })
}

/// Compute the area (number of foreground pixels) of an RLE mask.
///
/// Only sums the odd-indexed runs (which represent 1s).
pub fn area(rle: &Rle) -> u64 {
    rle.counts.iter().skip(1).step_by(2).map(|&c| c as u64).sum()
}

/// Compute the bounding box `[x, y, w, h]` of an RLE mask.
pub fn to_bbox(rle: &Rle) -> [f64; 4] {
    let h = rle.h as usize;
    if h == 0 || rle.w == 0 {
        return [0.0; 4];
    }

    let mut xs = rle.w as usize;
    let mut xe = 0usize;
    let mut ys = h;
    let mut ye = 0usize;
    let mut has_any = false;

    let mut cc = 0usize;
    for (i, &c) in rle.counts.iter().enumerate() {
        let c = c as usize;
        if i % 2 == 1 && c > 0 {
            has_any = true;
            let (x1, y1) = (cc / h, cc % h);
            let end = cc + c - 1;
            let (x2, y2) = (end / h, end % h);

            xs = xs.min(x1);
            xe = xe.max(x2 + 1);
            ys = ys.min(y1);
            // a run that wraps into the next column covers every row in between
            if x1 != x2 {
                ys = 0;
                ye = h;
            }
            ye = ye.max(y2 + 1);
        }
        cc += c;
    }

    if !has_any {
        return [0.0; 4];
    }
    [xs as f64, ys as f64, (xe - xs) as f64, (ye - ys) as f64]
}

/// Union of same-shaped RLE masks, computed run by run without decoding.
pub fn union(rles: &[Rle]) -> Result<Rle> {
    let Some(first) = rles.first() else {
        return Err(EvalError::Rle("union of zero masks".into()));
    };
    let mut result = first.clone();
    for rle in &rles[1..] {
        if rle.shape() != result.shape() {
            return Err(EvalError::ShapeMismatch {
                key: "union".into(),
                expected: result.shape(),
                found: rle.shape(),
            });
        }
        result = union_two(&result, rle);
    }
    Ok(result)
}

fn union_two(a: &Rle, b: &Rle) -> Rle {
    let n = a.h as u64 * a.w as u64;

    let mut counts: Vec<u32> = Vec::new();
    let (mut ca, mut cb) = (0u64, 0u64); // remaining in the current run
    let (mut va, mut vb) = (false, false);
    let (mut ai, mut bi) = (0usize, 0usize);
    let mut total = 0u64;
    let mut prev: Option<bool> = None;

    while total < n {
        while ca == 0 && ai < a.counts.len() {
            ca = a.counts[ai] as u64;
            va = ai % 2 == 1;
            ai += 1;
        }
        while cb == 0 && bi < b.counts.len() {
            cb = b.counts[bi] as u64;
            vb = bi % 2 == 1;
            bi += 1;
        }

        let step = match (ca, cb) {
            (0, 0) => break,
            (0, _) => cb,
            (_, 0) => ca,
            _ => ca.min(cb),
        };

        let v = va || vb;
        if prev == Some(v) {
            if let Some(last) = counts.last_mut() {
                *last += step as u32;
            }
        } else {
            if counts.is_empty() && v {
                counts.push(0);
            }
            counts.push(step as u32);
        }
        prev = Some(v);

        ca = ca.saturating_sub(step);
        cb = cb.saturating_sub(step);
        total += step;
    }

    if counts.is_empty() {
        counts.push(n as u32);
    }

    Rle {
        h: a.h,
        w: a.w,
        counts,
    }
}

/// Compress an RLE into the COCO `maskApi` string form.
///
/// Each count is written as little-endian 5-bit groups offset by 48, with
/// `0x20` as the continuation bit and `0x10` as the sign bit of the last
/// group. From the fourth count on, the value written is the difference to
/// the count two positions earlier.
pub fn rle_to_string(rle: &Rle) -> String {
    let mut s = String::new();
    for (i, &cnt) in rle.counts.iter().enumerate() {
        let mut x = cnt as i64;
        if i > 2 {
            x -= rle.counts[i - 2] as i64;
        }
        loop {
            let mut c = (x & 0x1f) as u8;
            x >>= 5;
            let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
            if more {
                c |= 0x20;
            }
            s.push((c + 48) as char);
            if !more {
                break;
            }
        }
    }
    s
}

/// Parse the COCO `maskApi` string form into a validated RLE of size `h × w`.
pub fn rle_from_string(s: &str, h: u32, w: u32) -> Result<Rle> {
    // 12 groups hold 60 bits, far beyond any u32 count or delta
    const MAX_GROUPS: u32 = 12;

    let bytes = s.as_bytes();
    let mut counts: Vec<u32> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let mut x: i64 = 0;
        let mut k: u32 = 0;
        let mut more = true;
        while more {
            let Some(&b) = bytes.get(i) else {
                return Err(EvalError::Rle("truncated counts string".into()));
            };
            if !(48..48 + 64).contains(&b) {
                return Err(EvalError::Rle(format!(
                    "invalid character {:?} at offset {}",
                    b as char, i
                )));
            }
            if k == MAX_GROUPS {
                return Err(EvalError::Rle(format!("count too long at offset {}", i)));
            }
            let c = (b - 48) as i64;
            x |= (c & 0x1f) << (5 * k);
            more = c & 0x20 != 0;
            i += 1;
            k += 1;
            if !more && c & 0x10 != 0 {
                x |= -1i64 << (5 * k);
            }
        }
        if counts.len() > 2 {
            x += counts[counts.len() - 2] as i64;
        }
        let count = u32::try_from(x)
            .map_err(|_| EvalError::Rle(format!("run length {} out of range", x)))?;
        counts.push(count);
    }

    Rle::new(h, w, counts)
}

/// Turn a wire segmentation into a validated RLE.
pub fn rle_from_segmentation(seg: &Segmentation) -> Result<Rle> {
    match seg {
        Segmentation::CompressedRle { size, counts } => rle_from_string(counts, size[0], size[1]),
        Segmentation::UncompressedRle { size, counts } => Rle::new(size[0], size[1], counts.clone()),
    }
}

/// Wire form of an RLE with string-encoded counts.
pub fn rle_to_segmentation(rle: &Rle) -> Segmentation {
    Segmentation::CompressedRle {
        size: [rle.h, rle.w],
        counts: rle_to_string(rle),
    }
}

pub fn decode_segmentation(seg: &Segmentation) -> Result<Mask> {
    decode(&rle_from_segmentation(seg)?)
}

/// Build a complete ground-truth annotation record from a mask.
pub fn annotation_from_mask(mask: &Mask, id: u64, image_id: u64, category_id: u64) -> Annotation {
    let rle = encode(mask);
    Annotation {
        id,
        image_id,
        category_id,
        area: Some(area(&rle) as f64),
        bbox: Some(to_bbox(&rle)),
        segmentation: Some(rle_to_segmentation(&rle)),
        iscrowd: false,
        score: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col_major(h: u32, w: u32, bits: &[u8]) -> Mask {
        Mask::from_col_major(h, w, bits.iter().map(|&b| b != 0).collect()).unwrap()
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mask = col_major(3, 4, &[0, 0, 0, 1, 1, 1, 0, 0, 1, 1, 0, 0]);
        let rle = encode(&mask);
        assert_eq!(rle.counts, vec![3, 3, 2, 2, 2]);
        assert_eq!(decode(&rle).unwrap(), mask);
    }

    #[test]
    fn test_encode_all_zeros() {
        let rle = encode(&Mask::new(3, 4));
        assert_eq!(rle.counts, vec![12]);
    }

    #[test]
    fn test_encode_all_ones() {
        let rle = encode(&Mask::from_fn(3, 4, |_, _| true));
        assert_eq!(rle.counts, vec![0, 12]);
    }

    #[test]
    fn test_from_rows_is_column_major() {
        let mask = Mask::from_rows(&[[true, false], [false, false]]).unwrap();
        assert_eq!(mask.as_col_major(), &[true, false, false, false]);
        assert_eq!(encode(&mask).counts, vec![0, 1, 3]);
        assert!(Mask::from_rows(&[vec![true], vec![true, false]]).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_totals() {
        let short = Rle {
            h: 2,
            w: 2,
            counts: vec![1, 1],
        };
        assert!(decode(&short).is_err());
        let long = Rle {
            h: 2,
            w: 2,
            counts: vec![1, 4],
        };
        assert!(decode(&long).is_err());
    }

    #[test]
    fn test_area() {
        let mask = col_major(3, 4, &[0, 0, 0, 1, 1, 1, 0, 0, 1, 1, 0, 0]);
        assert_eq!(area(&encode(&mask)), 5);
        assert_eq!(mask.area(), 5);
    }

    #[test]
    fn test_to_bbox() {
        // Col 0: [0,0,0], Col 1: [1,1,1], Col 2: [0,0,1], Col 3: [1,0,0]
        let mask = col_major(3, 4, &[0, 0, 0, 1, 1, 1, 0, 0, 1, 1, 0, 0]);
        assert_eq!(to_bbox(&encode(&mask)), [1.0, 0.0, 3.0, 3.0]);
        assert_eq!(to_bbox(&encode(&Mask::new(3, 3))), [0.0; 4]);
    }

    #[test]
    fn test_union() {
        let m1 = col_major(3, 4, &[0, 0, 0, 1, 1, 1, 0, 0, 0, 0, 0, 0]);
        let m2 = col_major(3, 4, &[0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 0]);
        let merged = union(&[encode(&m1), encode(&m2)]).unwrap();
        let expected = col_major(3, 4, &[0, 0, 0, 1, 1, 1, 0, 0, 1, 1, 1, 0]);
        assert_eq!(decode(&merged).unwrap(), expected);
    }

    #[test]
    fn test_union_leading_foreground() {
        let m1 = col_major(2, 2, &[1, 0, 0, 0]);
        let m2 = col_major(2, 2, &[0, 0, 0, 1]);
        let merged = union(&[encode(&m1), encode(&m2)]).unwrap();
        assert_eq!(merged.counts, vec![0, 1, 2, 1]);
    }

    #[test]
    fn test_union_shape_mismatch() {
        let a = encode(&Mask::new(2, 2));
        let b = encode(&Mask::new(2, 3));
        assert!(matches!(
            union(&[a, b]),
            Err(EvalError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rle_string_known_values() {
        let rle = Rle::new(10, 10, vec![5, 3, 2, 90]).unwrap();
        assert_eq!(rle_to_string(&rle), "532g2");
        assert_eq!(rle_from_string("532g2", 10, 10).unwrap(), rle);

        // 1 - 3 is a negative delta
        let rle = Rle::new(10, 10, vec![5, 3, 2, 1, 89]).unwrap();
        assert_eq!(rle_to_string(&rle), "532Ng2");
        assert_eq!(rle_from_string("532Ng2", 10, 10).unwrap(), rle);
    }

    #[test]
    fn test_rle_string_large_counts() {
        let rle = Rle::new(100, 100, vec![100, 200, 9700]).unwrap();
        let s = rle_to_string(&rle);
        assert_eq!(rle_from_string(&s, 100, 100).unwrap(), rle);
    }

    #[test]
    fn test_rle_string_malformed() {
        // '~' is outside the 64-character alphabet
        assert!(rle_from_string("0~", 1, 1).is_err());
        // continuation bit set on the final character
        assert!(rle_from_string("P", 1, 1).is_err());
        // well-formed but wrong total
        assert!(rle_from_string("03", 2, 2).is_err());
        // negative first count
        assert!(rle_from_string("N", 1, 1).is_err());
    }

    #[test]
    fn test_segmentation_roundtrip() {
        let mask = Mask::from_rows(&[[true, true], [false, true]]).unwrap();
        let seg = rle_to_segmentation(&encode(&mask));
        assert_eq!(decode_segmentation(&seg).unwrap(), mask);

        let raw = Segmentation::UncompressedRle {
            size: [2, 2],
            counts: vec![0, 1, 3],
        };
        assert!(decode_segmentation(&raw).unwrap().get(0, 0));
    }

    #[test]
    fn test_annotation_from_mask() {
        let mask = Mask::from_rows(&[[false, false, false], [false, true, true]]).unwrap();
        let ann = annotation_from_mask(&mask, 4, 2, 1);
        assert_eq!(ann.area, Some(2.0));
        assert_eq!(ann.bbox, Some([1.0, 1.0, 2.0, 1.0]));
        assert!(!ann.iscrowd);
        let seg = ann.segmentation.unwrap();
        assert_eq!(decode_segmentation(&seg).unwrap(), mask);
    }

    #[test]
    fn test_resize_nearest() {
        let mask = Mask::from_rows(&[[true, false], [false, true]]).unwrap();
        let up = mask.resize_nearest(4, 4);
        assert_eq!(up.shape(), (4, 4));
        assert!(up.get(0, 0) && up.get(1, 1));
        assert!(!up.get(0, 2) && !up.get(1, 3));
        assert!(up.get(3, 3) && up.get(2, 2));
        assert_eq!(up.area(), 8);

        let down = up.resize_nearest(2, 2);
        assert_eq!(down, mask);

        assert_eq!(Mask::new(0, 0).resize_nearest(2, 3), Mask::new(2, 3));
    }
}
