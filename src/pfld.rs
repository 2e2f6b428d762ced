//! PFLD-style landmark regression networks.
//!
//! [PFLD] takes a cropped face image and regresses a flat vector of `2 * L` landmark coordinates
//! in normalized `[0.0, 1.0]` space. Checkpoints trained on WFLW predict 98 points; variants for
//! the other dataset conventions (19, 29, or 68 points) expose the same interface and are
//! handled transparently.
//!
//! [PFLD]: https://arxiv.org/abs/1902.10859

use std::path::Path;

use anyhow::ensure;

use crate::iter::zip_exact;
use crate::landmark::{Landmarks, Network};
use crate::nn::{unit_color_map, Cnn, CnnInputShape, NeuralNetwork, Outputs};

/// A PFLD landmark regression network loaded from an ONNX checkpoint.
///
/// The number of predicted landmarks is derived from the checkpoint's output tensor, so one
/// wrapper covers all PFLD variants.
pub struct PfldNetwork {
    cnn: Cnn,
    num_landmarks: usize,
}

impl PfldNetwork {
    /// Loads a PFLD checkpoint from an `.onnx` file.
    ///
    /// The network must take a single NCHW image input and produce a flat coordinate vector of
    /// even length as its first output.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let nn = NeuralNetwork::load(path)?;

        let coords: usize = {
            let output = match nn.outputs().next() {
                Some(output) => output,
                None => anyhow::bail!("model has no outputs"),
            };
            output.shape().iter().product()
        };
        ensure!(
            coords > 0 && coords % 2 == 0,
            "landmark output must hold an even number of coordinates, got {}",
            coords
        );

        let cnn = Cnn::new(nn, CnnInputShape::NCHW, unit_color_map)?;
        log::debug!(
            "loaded PFLD checkpoint '{}': {} landmarks, input {}",
            path.display(),
            coords / 2,
            cnn.input_resolution(),
        );

        Ok(Self {
            cnn,
            num_landmarks: coords / 2,
        })
    }
}

impl Network for PfldNetwork {
    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn num_landmarks(&self) -> usize {
        self.num_landmarks
    }

    fn extract(&self, outputs: &Outputs, landmarks: &mut Landmarks) {
        let raw = outputs[0].as_slice();
        for (coords, out) in zip_exact(raw.chunks_exact(2), landmarks.positions_mut()) {
            *out = [coords[0], coords[1]];
        }
    }
}
