//! Per-image merged masks built from COCO-style annotation records.

use std::collections::HashMap;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::error::{EvalError, Result};
use crate::mask::{self, Mask};
use crate::types::{Annotation, Dataset, Image};

/// The merged foreground of one image and the category it is reported under.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedMask {
    pub mask: Mask,
    /// Category of the first annotation seen for the image.
    pub category_id: u64,
}

/// Merged masks keyed by image, in the dataset's image order.
///
/// All annotations of an image are OR-ed into one mask. Images without
/// annotations are left out.
#[derive(Debug, Clone)]
pub struct AnnotationIndex<K> {
    entries: IndexMap<K, IndexedMask>,
}

impl AnnotationIndex<String> {
    /// Index by `file_name`.
    ///
    /// Ground truth and prediction files may number the same image
    /// differently, so image-set evaluation joins on file names.
    pub fn by_file_name(dataset: &Dataset) -> Result<Self> {
        Self::build(dataset, |img| img.file_name.clone())
    }
}

impl AnnotationIndex<u64> {
    /// Index by numeric image id, for exports whose ids are known to agree.
    pub fn by_image_id(dataset: &Dataset) -> Result<Self> {
        Self::build(dataset, |img| img.id)
    }
}

impl<K: Hash + Eq> AnnotationIndex<K> {
    /// Merge every image's annotations and index the result by `key(image)`.
    ///
    /// Each annotation's RLE must have the image's `height × width`; a
    /// disagreement is a shape mismatch, and a missing or malformed
    /// segmentation is a format error.
    pub fn build<F>(dataset: &Dataset, key: F) -> Result<Self>
    where
        F: Fn(&Image) -> K,
    {
        let mut img_to_anns: HashMap<u64, Vec<&Annotation>> = HashMap::new();
        for ann in &dataset.annotations {
            img_to_anns.entry(ann.image_id).or_default().push(ann);
        }

        let mut entries = IndexMap::with_capacity(dataset.images.len());
        for img in &dataset.images {
            let Some(anns) = img_to_anns.get(&img.id) else {
                continue;
            };
            let rles = anns
                .iter()
                .map(|ann| {
                    let seg = ann.segmentation.as_ref().ok_or_else(|| {
                        EvalError::Rle(format!("annotation {} has no segmentation", ann.id))
                    })?;
                    let rle = mask::rle_from_segmentation(seg)?;
                    if rle.shape() != (img.height, img.width) {
                        return Err(EvalError::ShapeMismatch {
                            key: img.file_name.clone(),
                            expected: (img.height, img.width),
                            found: rle.shape(),
                        });
                    }
                    Ok(rle)
                })
                .collect::<Result<Vec<_>>>()?;

            let merged = mask::decode(&mask::union(&rles)?)?;
            entries.insert(
                key(img),
                IndexedMask {
                    mask: merged,
                    category_id: anns[0].category_id,
                },
            );
        }

        Ok(AnnotationIndex { entries })
    }

    pub fn get(&self, key: &K) -> Option<&IndexedMask> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &IndexedMask)> {
        self.entries.iter()
    }
}

impl<K: Hash + Eq> FromIterator<(K, IndexedMask)> for AnnotationIndex<K> {
    fn from_iter<I: IntoIterator<Item = (K, IndexedMask)>>(iter: I) -> Self {
        AnnotationIndex {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::annotation_from_mask;

    fn image(id: u64, file_name: &str, h: u32, w: u32) -> Image {
        Image {
            id,
            file_name: file_name.into(),
            width: w,
            height: h,
        }
    }

    fn make_dataset() -> Dataset {
        let left = Mask::from_rows(&[[true, false], [true, false]]).unwrap();
        let corner = Mask::from_rows(&[[false, false], [false, true]]).unwrap();
        Dataset {
            images: vec![
                image(10, "a.jpg", 2, 2),
                image(11, "empty.jpg", 2, 2),
                image(12, "b.jpg", 2, 2),
            ],
            annotations: vec![
                annotation_from_mask(&left, 1, 10, 2),
                annotation_from_mask(&corner, 2, 12, 1),
                annotation_from_mask(&corner, 3, 10, 1),
            ],
            categories: crate::types::Species::categories(),
        }
    }

    #[test]
    fn test_merges_by_union() {
        let index = AnnotationIndex::by_file_name(&make_dataset()).unwrap();
        let a = index.get(&"a.jpg".to_string()).unwrap();
        let expected = Mask::from_rows(&[[true, false], [true, true]]).unwrap();
        assert_eq!(a.mask, expected);
        // first annotation wins
        assert_eq!(a.category_id, 2);
    }

    #[test]
    fn test_skips_images_without_annotations() {
        let index = AnnotationIndex::by_file_name(&make_dataset()).unwrap();
        assert_eq!(index.len(), 2);
        assert!(!index.contains_key(&"empty.jpg".to_string()));
        let keys: Vec<&String> = index.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_by_image_id() {
        let index = AnnotationIndex::by_image_id(&make_dataset()).unwrap();
        assert_eq!(index.get(&12).unwrap().category_id, 1);
        assert!(index.get(&11).is_none());
    }

    #[test]
    fn test_size_disagreement_is_shape_mismatch() {
        let mut ds = make_dataset();
        ds.images[0].height = 3;
        let err = AnnotationIndex::by_file_name(&ds).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ShapeMismatch);
    }

    #[test]
    fn test_missing_segmentation_is_format_error() {
        let mut ds = make_dataset();
        ds.annotations[1].segmentation = None;
        let err = AnnotationIndex::by_file_name(&ds).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Format);
    }
}
