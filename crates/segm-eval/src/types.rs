use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EvalError, Result};

/// Top-level COCO-style image-set dataset.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Dataset {
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    pub id: u64,
    #[serde(default)]
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Annotation {
    #[serde(default)]
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    #[serde(default)]
    pub segmentation: Option<Segmentation>,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    #[serde(
        default,
        deserialize_with = "deserialize_iscrowd",
        serialize_with = "serialize_iscrowd"
    )]
    pub iscrowd: bool,
    /// Confidence, present only in some prediction exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

fn deserialize_iscrowd<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IsCrowd {
        Bool(bool),
        Int(u8),
    }
    match IsCrowd::deserialize(deserializer)? {
        IsCrowd::Bool(b) => Ok(b),
        IsCrowd::Int(i) => Ok(i != 0),
    }
}

fn serialize_iscrowd<S>(iscrowd: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u8(u8::from(*iscrowd))
}

/// Wire form of a mask: `{size: [h, w], counts}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    /// Compressed RLE, counts in the COCO string codec.
    CompressedRle { size: [u32; 2], counts: String },
    /// Uncompressed RLE, raw run lengths.
    UncompressedRle { size: [u32; 2], counts: Vec<u32> },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supercategory: Option<String>,
}

/// The fixed category set of the pet image-set domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Species {
    Cat = 1,
    Dog = 2,
}

impl Species {
    pub fn from_id(id: u64) -> Option<Self> {
        match id {
            1 => Some(Species::Cat),
            2 => Some(Species::Dog),
            _ => None,
        }
    }

    pub fn id(self) -> u64 {
        self as u64
    }

    pub fn name(self) -> &'static str {
        match self {
            Species::Cat => "cat",
            Species::Dog => "dog",
        }
    }

    /// The category list written into ground-truth files.
    pub fn categories() -> Vec<Category> {
        [Species::Cat, Species::Dog]
            .into_iter()
            .map(|s| Category {
                id: s.id(),
                name: s.name().into(),
                supercategory: None,
            })
            .collect()
    }
}

/// Run-length encoding for masks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rle {
    pub h: u32,
    pub w: u32,
    /// Run counts: alternating runs of 0s and 1s, starting with 0s.
    pub counts: Vec<u32>,
}

impl Rle {
    /// Build an RLE, checking that the runs cover exactly `h * w` pixels.
    pub fn new(h: u32, w: u32, counts: Vec<u32>) -> Result<Self> {
        let n = h as u64 * w as u64;
        let total: u64 = counts.iter().map(|&c| c as u64).sum();
        if total != n {
            return Err(EvalError::Rle(format!(
                "runs cover {} pixels but size {}x{} has {}",
                total, h, w, n
            )));
        }
        Ok(Rle { h, w, counts })
    }

    /// `(height, width)`.
    pub fn shape(&self) -> (u32, u32) {
        (self.h, self.w)
    }
}

/// Prediction export for the video path (`train.json` inside the export archive).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VideoExport {
    #[serde(default)]
    pub videos: Vec<Video>,
    #[serde(default)]
    pub annotations: Vec<TrackAnnotation>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Video {
    pub id: u64,
    pub name: String,
}

/// One predicted track: a segmentation (or null) per frame.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackAnnotation {
    pub video_id: u64,
    #[serde(default)]
    pub segmentations: Vec<Option<Segmentation>>,
}
