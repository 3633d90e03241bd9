use std::path::PathBuf;

use clap::{Parser, Subcommand};
use segm_eval::{image_eval, loader, video_eval, AnnotationIndex, VideoParams};

#[derive(Parser)]
#[command(name = "segm-eval")]
#[command(about = "Segmentation evaluation: IoU/Dice for image sets, J-score approximation for videos")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a COCO-style prediction JSON against image-set ground truth
    Images {
        /// Path to the prediction JSON file
        pred_json: PathBuf,

        /// Ground-truth JSON (defaults to ground_truth.json next to the predictions)
        #[arg(long)]
        gt_json: Option<PathBuf>,
    },

    /// Evaluate an exported project archive against DAVIS ground truth
    Video {
        /// Path to the DAVIS root (or subset)
        #[arg(long)]
        davis: PathBuf,

        /// Path to the exported project zip
        #[arg(long)]
        export: PathBuf,

        /// Annotation directory relative to the DAVIS root
        #[arg(long)]
        annotations_subdir: Option<PathBuf>,

        /// Name of the export JSON inside the archive
        #[arg(long)]
        export_entry: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Images { pred_json, gt_json } => {
            let gt_json = gt_json.unwrap_or_else(|| pred_json.with_file_name("ground_truth.json"));

            eprintln!("Loading ground truth from {:?}...", gt_json);
            let gt = AnnotationIndex::by_file_name(&loader::load_dataset(&gt_json)?)?;

            eprintln!("Loading predictions from {:?}...", pred_json);
            let pred = AnnotationIndex::by_file_name(&loader::load_dataset(&pred_json)?)?;

            let report = image_eval::evaluate(&gt, &pred)?;
            println!("{}", report);
        }
        Command::Video {
            davis,
            export,
            annotations_subdir,
            export_entry,
        } => {
            let mut params = VideoParams::default();
            if let Some(subdir) = annotations_subdir {
                params.annotations_subdir = subdir;
            }
            if let Some(entry) = export_entry {
                params.export_entry = entry;
            }

            eprintln!("Evaluating {:?} against {:?}...", export, davis);
            let report = video_eval::evaluate_export(&davis, &export, &params)?;
            println!("{}", report);
        }
    }

    Ok(())
}
