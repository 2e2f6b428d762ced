use std::path::PathBuf;

use clap::{ArgAction, Parser};

use markeval::dataset::ListDataset;
use markeval::eval::{evaluate, EvalOptions};
use markeval::landmark::Estimator;
use markeval::pfld::PfldNetwork;
use markeval::source::{CameraSource, FrameSource, ListSource};

/// Evaluates a facial landmark model against a labeled dataset or a live camera feed.
#[derive(Debug, Parser)]
#[command(name = "markeval", version)]
struct Args {
    /// Path to the ONNX landmark model checkpoint.
    #[arg(long, default_value = "./checkpoint/pfld.onnx")]
    model_path: PathBuf,

    /// Path to the test dataset list file.
    #[arg(long, default_value = "./data/test_data/list.txt")]
    test_dataset: PathBuf,

    /// Write annotated frames and the CED curve to the results directory.
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    save_image: bool,

    /// Display each annotated frame in a window, waiting for a key press.
    #[arg(
        long,
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    show_image: bool,

    /// Read frames from the first available webcam instead of the dataset.
    #[arg(long)]
    camera: bool,

    /// Directory annotated frames are written to.
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    markeval::init_logger!();
    let args = Args::parse();

    let network = PfldNetwork::load(&args.model_path)?;
    let mut estimator = Estimator::new(network);

    let mut source: Box<dyn FrameSource> = if args.camera {
        Box::new(CameraSource::open()?)
    } else {
        let dataset = ListDataset::open(&args.test_dataset, estimator.num_landmarks())?;
        Box::new(ListSource::new(dataset))
    };

    let opts = EvalOptions {
        save_images: args.save_image,
        show_images: args.show_image,
        results_dir: args.results_dir,
        ..Default::default()
    };

    let report = evaluate(source.as_mut(), &mut estimator, &opts)?;

    if let (Some(mean), Some(curve)) = (report.mean_error, report.curve) {
        println!("nme: {:.4}", mean);
        println!(
            "auc @ {:.1} failure threshold: {:.4}",
            opts.failure_threshold, curve.auc
        );
        println!("failure_rate: {:.4}", curve.failure_rate);
    } else {
        log::info!(
            "no labeled samples among {} frames; skipping metrics",
            report.frames
        );
    }
    if let Some(mean) = report.mean_inference_time {
        println!("inference_cost_time: {:.4}", mean.as_secs_f32());
    }

    Ok(())
}
