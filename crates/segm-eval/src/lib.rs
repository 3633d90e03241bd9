//! Segmentation mask evaluation.
//!
//! Two regimes share one mask engine:
//!
//! - **Image sets**: every image's annotations are merged into one foreground
//!   mask, ground truth and prediction are joined on file name, and IoU/Dice
//!   are averaged overall and per category ([`image_eval`]).
//! - **Video sequences**: each ground-truth object of a DAVIS-style sequence
//!   is matched against every exported track by mean per-frame IoU, and the
//!   best scores are averaged into a J-score approximation ([`video_eval`]).
//!
//! Masks travel as COCO run-length encodings ([`mask`]).

pub mod error;
pub mod image_eval;
pub mod index;
pub mod loader;
pub mod mask;
pub mod metric;
pub mod params;
pub mod track;
pub mod types;
pub mod video_eval;

pub use error::{ErrorKind, EvalError, Result};
pub use image_eval::ImageReport;
pub use index::{AnnotationIndex, IndexedMask};
pub use mask::Mask;
pub use params::VideoParams;
pub use track::{LabelFrame, ObjectScore, Track};
pub use types::{Annotation, Category, Dataset, Image, Rle, Segmentation, Species, VideoExport};
pub use video_eval::{FrameSource, SequenceTracks, VideoReport};
