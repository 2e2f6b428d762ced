//! The evaluation loop.
//!
//! Drives a [`FrameSource`] through an [`Estimator`], collecting per-sample normalized errors
//! for every labeled frame. The error list grows monotonically during the run and is finalized
//! once the source is exhausted; the curve summary is derived from it exactly once. Frames
//! without ground truth (live camera feeds) are predicted and visualized only.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::gui::Viewer;
use crate::image::{draw_marker, Color};
use crate::landmark::Estimator;
use crate::metrics::{self, normalized_error, CedCurve, CurveSummary};
use crate::nn::point_to_img;
use crate::resolution::Resolution;
use crate::source::{Frame, FrameSource};
use crate::timer::FpsCounter;

/// Startup configuration for an evaluation run.
///
/// Everything influencing a run is passed in here explicitly; nothing is configured through
/// ambient global state.
pub struct EvalOptions {
    /// Error threshold above which a sample counts as a failure. The standard reporting
    /// threshold for landmark benchmarks is 0.1.
    pub failure_threshold: f32,
    /// Threshold spacing used to discretize the CED curve.
    pub curve_step: f32,
    /// Write annotated frames (and the CED curve) to [`EvalOptions::results_dir`].
    pub save_images: bool,
    /// Display each annotated frame in a blocking viewer window.
    pub show_images: bool,
    /// Output directory for annotated frames.
    pub results_dir: PathBuf,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 0.1,
            curve_step: metrics::DEFAULT_STEP,
            save_images: true,
            show_images: false,
            results_dir: "results".into(),
        }
    }
}

/// Summary of a finished evaluation run.
#[derive(Debug)]
pub struct EvalReport {
    /// Total number of frames processed.
    pub frames: usize,
    /// Mean normalized error over all labeled samples, if any were seen.
    pub mean_error: Option<f32>,
    /// CED curve summary over all labeled samples, if any were seen.
    pub curve: Option<CurveSummary>,
    /// Mean per-sample network inference time.
    pub mean_inference_time: Option<Duration>,
}

/// Runs the model over every frame the source yields and reports the collected metrics.
///
/// Each frame is fully processed (inference, metric computation, optional visualization) before
/// the next one is read. Source exhaustion is the only regular termination condition; any
/// collaborator error (unreadable image, failed inference) aborts the run.
pub fn evaluate(
    source: &mut dyn FrameSource,
    estimator: &mut Estimator,
    opts: &EvalOptions,
) -> anyhow::Result<EvalReport> {
    let mut viewer = match opts.show_images {
        true => Some(Viewer::new()?),
        false => None,
    };
    if opts.save_images {
        std::fs::create_dir_all(&opts.results_dir).with_context(|| {
            format!(
                "failed to create results directory '{}'",
                opts.results_dir.display()
            )
        })?;
    }

    let mut errors = Vec::new();
    let mut fps = FpsCounter::new("eval");
    let mut frames = 0usize;

    while let Some(Frame { mut image, truth }) = source.next_frame()? {
        let prediction = estimator.estimate(&image)?;

        if let Some(truth) = &truth {
            errors.push(normalized_error(prediction, truth)?);
        }

        if opts.save_images || opts.show_images {
            let res = image.resolution();
            for [x, y] in prediction.iter() {
                let (px, py) = point_to_img(x, y, res);
                draw_marker(&mut image, px, py).color(Color::BLUE);
            }

            if opts.save_images {
                let path = opts.results_dir.join(format!("image_{frames:03}.png"));
                image.save(&path)?;
            }
            if let Some(viewer) = &mut viewer {
                viewer.show("markeval", &image)?;
            }
        }

        fps.tick();
        frames += 1;
    }

    let (mean_error, curve) = match errors.as_slice() {
        [] => (None, None),
        errors => {
            let mean = errors.iter().sum::<f32>() / errors.len() as f32;
            let curve = CedCurve::with_step(errors, opts.failure_threshold, opts.curve_step);

            // Presentation only; the summary is computed from the curve either way.
            if opts.save_images || opts.show_images {
                let plot = curve.render(Resolution::new(512, 384));
                if opts.save_images {
                    plot.save(opts.results_dir.join("ced.png"))?;
                }
                if let Some(viewer) = &mut viewer {
                    viewer.show("ced curve", &plot)?;
                }
            }

            (Some(mean), Some(curve.summary()))
        }
    };

    Ok(EvalReport {
        frames,
        mean_error,
        curve,
        mean_inference_time: estimator.inference_timer().mean(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_the_reporting_convention() {
        let opts = EvalOptions::default();
        assert_eq!(opts.failure_threshold, 0.1);
        assert_eq!(opts.curve_step, metrics::DEFAULT_STEP);
        assert!(opts.save_images);
        assert!(!opts.show_images);
    }
}
