//! Landmark localization error metrics.
//!
//! Two pieces live here:
//!
//! - [`normalized_errors`]: per-sample normalized mean error (NME) of predicted landmarks against
//!   ground truth, normalized by the dataset's interocular reference distance.
//! - [`CedCurve`]: the cumulative error distribution built from all per-sample errors of a run,
//!   summarized as area-under-curve and failure rate via [`CedCurve::summary`].
//!
//! Both operate on plain `f32` data and have no side effects; rendering a curve to an [`Image`]
//! is presentation only and does not feed back into the numbers.

use std::fmt;

use nalgebra::{distance, Point2};

use crate::image::{draw_line, draw_text, Color, Image};
use crate::iter::zip_exact;
use crate::landmark::Landmarks;
use crate::resolution::Resolution;

/// Default threshold spacing used when discretizing the CED curve.
pub const DEFAULT_STEP: f32 = 1e-4;

/// The AFLW protocol evaluates against a fixed box size instead of a per-sample eye distance.
/// Inherited from the reference evaluation code and kept for comparability with published
/// numbers, even though a per-sample measurement would be more principled.
const AFLW_BOX_SIZE: f32 = 34.0;

/// Error returned when a landmark set's point count matches no known dataset convention.
///
/// This aborts an evaluation run; there is no partial result to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedLandmarkCount(pub usize);

impl fmt::Display for UnsupportedLandmarkCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsupported number of landmarks: {} (supported: 19, 29, 68, 98)",
            self.0
        )
    }
}

impl std::error::Error for UnsupportedLandmarkCount {}

/// Returns the reference distance used to normalize errors for a ground-truth landmark set.
///
/// The landmark indices are fixed dataset conventions (AFLW, COFW, 300W, WFLW) and not tunable.
fn interocular_distance(gt: &Landmarks) -> Result<f32, UnsupportedLandmarkCount> {
    let dist = |a: usize, b: usize| {
        distance(
            &Point2::from(gt.position(a)),
            &Point2::from(gt.position(b)),
        )
    };

    match gt.len() {
        19 => Ok(AFLW_BOX_SIZE),
        29 => Ok(dist(8, 9)),
        68 => Ok(dist(36, 45)),
        98 => Ok(dist(60, 72)),
        len => Err(UnsupportedLandmarkCount(len)),
    }
}

/// Computes the normalized mean error of a single prediction against its ground truth.
///
/// The error is the sum of per-point Euclidean distances divided by `interocular * L`, where the
/// interocular reference distance is measured on the *ground truth* set. The result is always
/// non-negative.
///
/// # Panics
///
/// Panics if `pred` and `gt` contain different numbers of points; a batch of predictions must
/// have the same shape as its ground truth.
pub fn normalized_error(pred: &Landmarks, gt: &Landmarks) -> Result<f32, UnsupportedLandmarkCount> {
    let interocular = interocular_distance(gt)?;

    let sum: f32 = zip_exact(pred.positions(), gt.positions())
        .map(|(p, g)| distance(&Point2::from(*p), &Point2::from(*g)))
        .sum();

    Ok(sum / (interocular * gt.len() as f32))
}

/// Computes per-sample normalized mean errors for a batch of predictions.
///
/// Returns one error value per sample, in batch order. Fails with [`UnsupportedLandmarkCount`]
/// if the landmark count matches none of the supported dataset conventions.
///
/// # Panics
///
/// Panics if `preds` and `targets` have different lengths.
pub fn normalized_errors(
    preds: &[Landmarks],
    targets: &[Landmarks],
) -> Result<Vec<f32>, UnsupportedLandmarkCount> {
    zip_exact(preds, targets)
        .map(|(pred, gt)| normalized_error(pred, gt))
        .collect()
}

/// Summary statistics derived from a [`CedCurve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveSummary {
    /// Area under the CED curve, normalized by the failure threshold. In `[0, 1]` up to
    /// discretization error.
    pub auc: f32,
    /// Fraction of samples whose error exceeds the failure threshold. In `[0, 1]`.
    pub failure_rate: f32,
}

/// Cumulative error distribution over a finalized list of per-sample errors.
///
/// The curve is discretized at thresholds `0.0, step, 2*step, ..` up to the failure threshold
/// inclusive. A smaller `step` increases integration accuracy at a cost of
/// `O(M * failure_threshold / step)` work for `M` samples.
pub struct CedCurve {
    thresholds: Vec<f32>,
    fractions: Vec<f32>,
    failure_threshold: f32,
}

impl CedCurve {
    /// Builds the CED curve with the default threshold spacing of [`DEFAULT_STEP`].
    pub fn new(errors: &[f32], failure_threshold: f32) -> Self {
        Self::with_step(errors, failure_threshold, DEFAULT_STEP)
    }

    /// Builds the CED curve with an explicit threshold spacing.
    ///
    /// # Panics
    ///
    /// Panics if `errors` is empty or if `failure_threshold` or `step` is not positive.
    pub fn with_step(errors: &[f32], failure_threshold: f32, step: f32) -> Self {
        assert!(!errors.is_empty(), "CED curve requires at least one error");
        assert!(failure_threshold > 0.0);
        assert!(step > 0.0);

        let steps = (failure_threshold / step + 0.5) as usize;
        let mut thresholds: Vec<f32> = (0..=steps).map(|i| i as f32 * step).collect();

        // Make sure the grid ends exactly on the failure threshold, so the failure rate is
        // evaluated at the threshold itself rather than at the nearest multiple of `step`.
        let last = thresholds.last_mut().unwrap();
        if *last >= failure_threshold - step * 1e-3 {
            *last = failure_threshold;
        } else {
            thresholds.push(failure_threshold);
        }

        let num = errors.len() as f32;
        let fractions = thresholds
            .iter()
            .map(|&x| errors.iter().filter(|&&err| err <= x).count() as f32 / num)
            .collect();

        Self {
            thresholds,
            fractions,
            failure_threshold,
        }
    }

    /// Returns the discretized `(threshold, fraction)` points making up the curve.
    pub fn points(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        zip_exact(&self.thresholds, &self.fractions).map(|(&x, &y)| (x, y))
    }

    /// Derives the [`CurveSummary`] from the curve.
    ///
    /// The AUC is the trapezoidal integral of the discretized curve divided by the failure
    /// threshold; the failure rate is one minus the curve value at the threshold.
    pub fn summary(&self) -> CurveSummary {
        let mut area = 0.0f64;
        for i in 1..self.thresholds.len() {
            let dx = f64::from(self.thresholds[i] - self.thresholds[i - 1]);
            let avg = f64::from(self.fractions[i] + self.fractions[i - 1]) * 0.5;
            area += dx * avg;
        }

        CurveSummary {
            auc: (area / f64::from(self.failure_threshold)) as f32,
            failure_rate: 1.0 - self.fractions.last().unwrap(),
        }
    }

    /// Renders the curve into an [`Image`] for inspection.
    ///
    /// This is presentation only; nothing computed here feeds back into [`CedCurve::summary`].
    pub fn render(&self, res: Resolution) -> Image {
        const MARGIN: i32 = 24;

        let mut image = Image::new(res.width(), res.height());
        let (w, h) = (res.width() as i32, res.height() as i32);
        let (x0, y0) = (MARGIN, h - MARGIN);
        let (x1, y1) = (w - MARGIN / 2, MARGIN / 2);

        // axes
        draw_line(&mut image, x0, y0, x1, y0).color(Color::WHITE);
        draw_line(&mut image, x0, y0, x0, y1).color(Color::WHITE);

        let map = |(x, y): (f32, f32)| {
            let px = x0 as f32 + x / self.failure_threshold * (x1 - x0) as f32;
            let py = y0 as f32 - y * (y0 - y1) as f32;
            (px as i32, py as i32)
        };

        let mut prev = None;
        for point in self.points() {
            let (px, py) = map(point);
            if let Some((qx, qy)) = prev {
                draw_line(&mut image, qx, qy, px, py).color(Color::GREEN);
            }
            prev = Some((px, py));
        }

        let summary = self.summary();
        let label = format!(
            "auc {:.4} / failure rate {:.4}",
            summary.auc, summary.failure_rate
        );
        draw_text(&mut image, x0 + 4, y1 + 4, &label)
            .align_top()
            .align_left()
            .color(Color::WHITE);

        image
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn constant_set(len: usize, pos: [f32; 2]) -> Landmarks {
        Landmarks::from_positions(vec![pos; len])
    }

    fn random_set(rng: &mut fastrand::Rng, len: usize) -> Landmarks {
        Landmarks::from_positions(
            (0..len)
                .map(|_| [rng.f32() * 112.0, rng.f32() * 112.0])
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn identical_predictions_have_zero_error() {
        let mut rng = fastrand::Rng::with_seed(0x5EED);
        for len in [19, 29, 68, 98] {
            let gt = random_set(&mut rng, len);
            let errors = normalized_errors(&[gt.clone()], &[gt]).unwrap();
            assert_eq!(errors.len(), 1);
            assert_relative_eq!(errors[0], 0.0);
        }
    }

    #[test]
    fn error_count_matches_batch_size() {
        let mut rng = fastrand::Rng::with_seed(1);
        let preds: Vec<_> = (0..7).map(|_| random_set(&mut rng, 68)).collect();
        let targets: Vec<_> = (0..7).map(|_| random_set(&mut rng, 68)).collect();
        let errors = normalized_errors(&preds, &targets).unwrap();
        assert_eq!(errors.len(), 7);
        assert!(errors.iter().all(|&e| e >= 0.0));
    }

    #[test]
    fn unsupported_landmark_count_is_rejected() {
        let gt = constant_set(10, [1.0, 1.0]);
        let pred = constant_set(10, [1.0, 1.0]);
        assert_eq!(
            normalized_error(&pred, &gt),
            Err(UnsupportedLandmarkCount(10))
        );
    }

    #[test]
    fn uniform_offset_error_is_sqrt2_over_interocular() {
        let mut rng = fastrand::Rng::with_seed(0xFACE);
        for _ in 0..4 {
            let gt = random_set(&mut rng, 68);
            let mut pred = gt.clone();
            pred.map_positions(|[x, y]| [x + 1.0, y + 1.0]);

            let [ax, ay] = gt.position(36);
            let [bx, by] = gt.position(45);
            let interocular = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();

            let err = normalized_error(&pred, &gt).unwrap();
            assert_relative_eq!(err, 2f32.sqrt() / interocular, max_relative = 1e-4);
        }
    }

    #[test]
    fn all_zero_errors_saturate_the_curve() {
        let summary = CedCurve::new(&[0.0; 5], 0.1).summary();
        assert_relative_eq!(summary.auc, 1.0, epsilon = 1e-3);
        assert_relative_eq!(summary.failure_rate, 0.0);
    }

    #[test]
    fn all_failing_errors_zero_the_curve() {
        let summary = CedCurve::new(&[0.2; 5], 0.1).summary();
        assert_relative_eq!(summary.auc, 0.0, epsilon = 1e-3);
        assert_relative_eq!(summary.failure_rate, 1.0);
    }

    #[test]
    fn uniform_errors_give_half_auc() {
        // 100 errors spread uniformly over [0, 0.1]; the CED is (close to) a straight line, so
        // the normalized integral is 0.5 regardless of discretization.
        let errors: Vec<f32> = (0..100).map(|i| (i as f32 + 0.5) * 0.001).collect();

        let coarse = CedCurve::with_step(&errors, 0.1, 0.01).summary();
        let fine = CedCurve::with_step(&errors, 0.1, 0.0001).summary();

        assert_relative_eq!(coarse.auc, 0.5, epsilon = 0.02);
        assert_relative_eq!(fine.auc, 0.5, epsilon = 0.02);
        // Refining the grid must not move the result away from the analytic value.
        assert!((fine.auc - 0.5).abs() <= (coarse.auc - 0.5).abs() + 1e-3);
        assert_relative_eq!(coarse.failure_rate, 0.0);
    }

    #[test]
    fn failure_rate_counts_samples_beyond_threshold() {
        let curve = CedCurve::with_step(&[0.01, 0.02, 0.15], 0.1, 0.01);
        let summary = curve.summary();
        assert_relative_eq!(summary.failure_rate, 1.0 / 3.0, epsilon = 1e-6);
        assert!(summary.auc > 0.0 && summary.auc < 1.0);
    }

    #[test]
    fn curve_grid_ends_on_the_threshold() {
        for step in [0.01, 0.03, 0.04, 0.0001] {
            let curve = CedCurve::with_step(&[0.05], 0.1, step);
            let (last_x, _) = curve.points().last().unwrap();
            assert_relative_eq!(last_x, 0.1);
        }
    }

    #[test]
    fn rendering_does_not_change_the_summary() {
        let curve = CedCurve::with_step(&[0.01, 0.05, 0.2], 0.1, 0.001);
        let before = curve.summary();
        let image = curve.render(Resolution::new(320, 240));
        assert_eq!(image.resolution(), Resolution::new(320, 240));
        assert_eq!(curve.summary(), before);
    }
}
