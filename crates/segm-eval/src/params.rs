use std::path::PathBuf;

/// Where video evaluation finds its inputs.
///
/// Defaults follow the DAVIS 2017 layout and the annotation tool's export
/// archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoParams {
    /// Directory, relative to the dataset root, holding one sub-directory of
    /// label rasters per sequence (default: `Annotations/480p`).
    pub annotations_subdir: PathBuf,
    /// Extension of label raster files (default: `png`).
    pub frame_extension: String,
    /// Archive entry holding the export JSON (default: `train.json`).
    pub export_entry: String,
}

impl Default for VideoParams {
    fn default() -> Self {
        VideoParams {
            annotations_subdir: PathBuf::from("Annotations").join("480p"),
            frame_extension: "png".into(),
            export_entry: "train.json".into(),
        }
    }
}
