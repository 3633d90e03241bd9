//! Reading datasets, prediction exports, and ground-truth rasters from disk.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::debug;
use zip::result::ZipError;

use crate::error::{EvalError, Result};
use crate::track::LabelFrame;
use crate::types::{Dataset, VideoExport};

/// Load a COCO-style image-set dataset from a JSON file.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let path = path.as_ref();
    debug!("loading dataset from {}", path.display());
    let reader = BufReader::new(File::open(path)?);
    let dataset: Dataset = serde_json::from_reader(reader)?;
    debug!(
        "{} images, {} annotations",
        dataset.images.len(),
        dataset.annotations.len()
    );
    Ok(dataset)
}

pub fn load_dataset_from_str(json: &str) -> Result<Dataset> {
    Ok(serde_json::from_str(json)?)
}

/// Read the export JSON stored as `entry` inside a zip archive.
pub fn load_video_export<P: AsRef<Path>>(path: P, entry: &str) -> Result<VideoExport> {
    let path = path.as_ref();
    debug!("reading {} from {}", entry, path.display());
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    let file = match archive.by_name(entry) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => {
            return Err(EvalError::NotFound(format!(
                "{} in {}",
                entry,
                path.display()
            )))
        }
        Err(err) => return Err(err.into()),
    };
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Files in `dir` with the given extension, sorted by file name.
pub fn list_frames(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Decode a label raster.
///
/// Palette images yield their raw palette indices; greyscale images yield
/// their grey levels. Any other colour type is rejected.
pub fn read_label_frame(path: &Path) -> Result<LabelFrame> {
    let mut decoder = png::Decoder::new(BufReader::new(File::open(path)?));
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;

    match info.color_type {
        png::ColorType::Indexed | png::ColorType::Grayscale => {}
        other => {
            return Err(EvalError::Raster(format!(
                "{}: unsupported colour type {:?}",
                path.display(),
                other
            )))
        }
    }
    let bits = match info.bit_depth {
        png::BitDepth::One => 1,
        png::BitDepth::Two => 2,
        png::BitDepth::Four => 4,
        png::BitDepth::Eight => 8,
        png::BitDepth::Sixteen => 16,
    };

    let (w, h) = (info.width as usize, info.height as usize);
    if w == 0 || h == 0 {
        return LabelFrame::new(info.height, info.width, Vec::new());
    }
    let mut labels = Vec::with_capacity(w * h);
    for line in buf.chunks(info.line_size).take(h) {
        labels.extend((0..w).map(|x| unpack(line, x, bits)));
    }
    LabelFrame::new(info.height, info.width, labels)
}

/// Sample `x` of a packed scanline, most significant bits first.
fn unpack(line: &[u8], x: usize, bits: usize) -> u16 {
    if bits == 16 {
        return u16::from_be_bytes([line[2 * x], line[2 * x + 1]]);
    }
    let bit = x * bits;
    let shift = 8 - bits - bit % 8;
    ((line[bit / 8] >> shift) & ((1u16 << bits) - 1) as u8) as u16
}
