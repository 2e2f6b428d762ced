//! Common code for facial landmark prediction.
//!
//! The [`Estimator`] drives an opaque landmark regression [`Network`] and decodes its raw output
//! into a [`Landmarks`] set. Landmark coordinates produced here are in normalized `[0.0, 1.0]`
//! space relative to the network's input; use [`crate::nn::point_to_img`] to map them back onto a
//! source image.

use crate::image::Image;
use crate::nn::{Cnn, Outputs};
use crate::resolution::Resolution;
use crate::timer::Timer;

type Position = [f32; 2];

/// An ordered set of 2D landmark points.
///
/// Used both for network predictions and for dataset ground truth. The number of points is fixed
/// at creation time and determines the normalization applied by the error metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    positions: Box<[Position]>,
}

impl Landmarks {
    /// Creates a new [`Landmarks`] collection containing `len` preallocated landmarks.
    ///
    /// All landmarks start out at `(0.0, 0.0)`.
    pub fn new(len: usize) -> Self {
        Self {
            positions: vec![[0.0, 0.0]; len].into_boxed_slice(),
        }
    }

    /// Creates a [`Landmarks`] collection from a list of points.
    pub fn from_positions<P: Into<Vec<Position>>>(positions: P) -> Self {
        Self {
            positions: positions.into().into_boxed_slice(),
        }
    }

    /// Returns the number of landmark points in this set.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns the position of the landmark at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn position(&self, index: usize) -> Position {
        self.positions[index]
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.positions
    }

    pub fn iter(&self) -> impl Iterator<Item = Position> + Clone + '_ {
        self.positions.iter().copied()
    }

    /// Applies a transformation to every landmark position.
    pub fn map_positions(&mut self, mut f: impl FnMut(Position) -> Position) {
        for pos in self.positions_mut() {
            *pos = f(*pos);
        }
    }
}

/// Trait implemented by wrapper types around landmark regression networks.
pub trait Network: Send + Sync + 'static {
    /// Returns the [`Cnn`] to use for landmark prediction.
    fn cnn(&self) -> &Cnn;

    /// Returns the number of landmark points the network predicts.
    fn num_landmarks(&self) -> usize;

    /// Decodes the raw network outputs and writes the predicted points to `landmarks`.
    ///
    /// Positions are expected in normalized `[0.0, 1.0]` coordinates relative to the network
    /// input.
    fn extract(&self, outputs: &Outputs, landmarks: &mut Landmarks);
}

/// Neural-network based landmark predictor.
///
/// Owns the output buffer and an inference [`Timer`], so the caller gets per-sample latency
/// measurement for free.
pub struct Estimator {
    network: Box<dyn Network>,
    landmarks: Landmarks,
    t_infer: Timer,
}

impl Estimator {
    pub fn new<N: Network>(network: N) -> Self {
        let landmarks = Landmarks::new(network.num_landmarks());
        Self {
            network: Box::new(network),
            landmarks,
            t_infer: Timer::new("infer"),
        }
    }

    /// Returns the expected input resolution of the wrapped network.
    pub fn input_resolution(&self) -> Resolution {
        self.network.cnn().input_resolution()
    }

    /// Returns the number of landmark points produced per prediction.
    pub fn num_landmarks(&self) -> usize {
        self.landmarks.len()
    }

    /// Returns the timer measuring raw network inference time.
    pub fn inference_timer(&self) -> &Timer {
        &self.t_infer
    }

    /// Runs landmark prediction on `image`, returning the predicted [`Landmarks`].
    ///
    /// If the image's size differs from the network's input resolution it is resized first,
    /// preserving its aspect ratio by adding black bars. Only the inference itself counts towards
    /// the inference timer.
    pub fn estimate(&mut self, image: &Image) -> anyhow::Result<&Landmarks> {
        let cnn = self.network.cnn();
        let input_res = cnn.input_resolution();

        let outputs = if image.resolution() == input_res {
            self.t_infer.time(|| cnn.estimate(image))?
        } else {
            let resized = image.aspect_aware_resize(input_res);
            self.t_infer.time(|| cnn.estimate(&resized))?
        };
        log::trace!("inference result: {:?}", outputs);

        self.network.extract(&outputs, &mut self.landmarks);
        Ok(&self.landmarks)
    }
}

/// Scales normalized landmark positions by an image resolution, in place.
///
/// This maps predictions onto a source image of the same aspect ratio as the network input. For
/// sources with other aspect ratios, use [`crate::nn::point_to_img`] per point instead.
pub fn scale_to_resolution(landmarks: &mut Landmarks, res: Resolution) {
    landmarks.map_positions(|[x, y]| [x * res.width() as f32, y * res.height() as f32]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landmark_set_starts_zeroed() {
        let lms = Landmarks::new(4);
        assert_eq!(lms.len(), 4);
        assert!(lms.iter().all(|p| p == [0.0, 0.0]));
    }

    #[test]
    fn map_positions_applies_to_all_points() {
        let mut lms = Landmarks::from_positions(vec![[0.5, 0.5], [1.0, 0.0]]);
        scale_to_resolution(&mut lms, Resolution::new(112, 112));
        assert_eq!(lms.position(0), [56.0, 56.0]);
        assert_eq!(lms.position(1), [112.0, 0.0]);
    }
}
