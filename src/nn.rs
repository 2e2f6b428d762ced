//! Neural network inference.
//!
//! Models are consumed as opaque ONNX checkpoints and executed on the CPU via [`tract_onnx`].
//! Evaluation is an offline batch job, so there is no GPU backend and no attempt at intra-frame
//! parallelism.

use std::{
    fmt,
    ops::{Index, Range},
    path::Path,
    sync::Arc,
};

use anyhow::bail;
use tract_onnx::prelude::{
    tvec, Framework, Graph, InferenceModelExt, SimplePlan, TVec, TValue, TypedFact, TypedOp,
};

use crate::image::Image;
use crate::resolution::{AspectRatio, Resolution};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// An n-dimensional array of `f32`s, used as network input and output.
#[derive(Clone)]
pub struct Tensor {
    shape: TVec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a tensor from a shape and its elements in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if `data` does not hold exactly as many elements as `shape` requires.
    pub fn from_shape_vec(shape: &[usize], data: Vec<f32>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "tensor data does not match shape {:?}",
            shape,
        );
        Self {
            shape: shape.into(),
            data,
        }
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the tensor's elements in row-major order.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(
            &self.shape,
            &self.data,
        )?)
    }

    fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        Ok(Self {
            shape: tract.shape().into(),
            data: tract.as_slice::<f32>()?.to_vec(),
        })
    }
}

/// Prints the tensor shape, not its contents.
impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor{:?}", &self.shape[..])
    }
}

/// A convolutional neural network (CNN) that operates on image data.
pub struct Cnn {
    nn: NeuralNetwork,
    shape: CnnInputShape,
    input_res: Resolution,
    color_map: fn(u8) -> f32,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input whose tensor shape matches `shape`. `color_map`
    /// converts each 8-bit color channel into the value range the network was trained on.
    pub fn new(
        nn: NeuralNetwork,
        shape: CnnInputShape,
        color_map: fn(u8) -> f32,
    ) -> anyhow::Result<Self> {
        if nn.num_inputs() != 1 {
            bail!(
                "CNN network has to take exactly 1 input, this one takes {}",
                nn.num_inputs()
            );
        }

        let input_info = nn.inputs().next().unwrap();
        let tensor_shape = input_info.shape();

        let (w, h) = match (shape, tensor_shape) {
            (CnnInputShape::NCHW, [1, 3, h, w]) | (CnnInputShape::NHWC, [1, h, w, 3]) => (*w, *h),
            _ => {
                bail!(
                    "invalid model input shape for {:?} CNN: {:?}",
                    shape,
                    tensor_shape
                );
            }
        };

        let (w, h): (u32, u32) = (w.try_into()?, h.try_into()?);

        Ok(Self {
            nn,
            shape,
            input_res: Resolution::new(w, h),
            color_map,
        })
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Runs the network on an input image, returning the computed outputs.
    ///
    /// # Panics
    ///
    /// The image's resolution must match the CNN's [`input_resolution`][Self::input_resolution],
    /// otherwise this method will panic.
    pub fn estimate(&self, image: &Image) -> anyhow::Result<Outputs> {
        assert_eq!(
            image.resolution(),
            self.input_resolution(),
            "CNN input image does not have expected resolution"
        );

        let (h, w) = (
            self.input_res.height() as usize,
            self.input_res.width() as usize,
        );
        let mut data = Vec::with_capacity(3 * h * w);
        let tensor = match self.shape {
            CnnInputShape::NCHW => {
                for c in 0..3 {
                    for y in 0..h {
                        for x in 0..w {
                            data.push((self.color_map)(image.get(x as u32, y as u32)[c]));
                        }
                    }
                }
                Tensor::from_shape_vec(&[1, 3, h, w], data)
            }
            CnnInputShape::NHWC => {
                for y in 0..h {
                    for x in 0..w {
                        for c in 0..3 {
                            data.push((self.color_map)(image.get(x as u32, y as u32)[c]));
                        }
                    }
                }
                Tensor::from_shape_vec(&[1, h, w, 3], data)
            }
        };

        self.nn.estimate(Inputs::single(tensor))
    }
}

/// Maps 8-bit color channels linearly to `[0.0, 1.0]`.
///
/// This is the input range PFLD-style landmark networks are trained on.
pub fn unit_color_map(value: u8) -> f32 {
    value as f32 / 255.0
}

/// Adjusts normalized `[0.0, 1.0]` coordinates from a 1:1 aspect ratio back to `orig_aspect`.
///
/// This assumes the original image was fitted to a square input by adding black bars
/// ([`Image::aspect_aware_resize`]).
pub fn unadjust_aspect_ratio(mut x: f32, mut y: f32, orig_aspect: AspectRatio) -> (f32, f32) {
    let ratio = orig_aspect.as_f32();
    if ratio > 1.0 {
        // going from 1:1 to something wider, undo letterboxing
        y = (y - 0.5) * ratio + 0.5;
    } else {
        // going from 1:1 to something taller, undo pillarboxing
        x = (x - 0.5) / ratio + 0.5;
    }

    (x, y)
}

/// Translates normalized `[0.0, 1.0]` coordinates back to pixel coordinates of an image with
/// resolution `full_res`.
///
/// The input coordinates are assumed to come from a square network input that the image was
/// letter-/pillarboxed into.
pub fn point_to_img(x: f32, y: f32, full_res: Resolution) -> (i32, i32) {
    let (x, y) = match full_res.aspect_ratio() {
        Some(aspect) => unadjust_aspect_ratio(x, y, aspect),
        None => (x, y),
    };

    (
        (x * full_res.width() as f32) as i32,
        (y * full_res.height() as f32) as i32,
    )
}

/// Describes in what order a CNN expects its input image data.
///
/// - `N` is the number of images, fixed at 1 here.
/// - `C` is the number of color channels, 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive] // shouldn't be matched on by user code
pub enum CnnInputShape {
    /// Shape is `(N, C, H, W)`.
    NCHW,
    /// Shape is `(N, H, W, C)`.
    NHWC,
}

/// A neural network that can be used for inference.
pub struct NeuralNetwork {
    inner: Model,
}

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!("neural network path must have `.onnx` extension"),
        }

        let model_data = std::fs::read(path)?;
        Self::from_onnx(&model_data)
    }

    /// Loads and optimizes a pre-trained model from an in-memory ONNX file.
    pub fn from_onnx(raw: &[u8]) -> anyhow::Result<Self> {
        let graph = tract_onnx::onnx().model_for_read(&mut &*raw)?;
        let model = graph.into_optimized()?.into_runnable()?;

        Ok(Self { inner: model })
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.inner.model().inputs.len()
    }

    /// Returns the number of output nodes of the network.
    pub fn num_outputs(&self) -> usize {
        self.inner.model().outputs.len()
    }

    /// Returns an iterator over the network's input node information.
    ///
    /// To perform inference, a matching input tensor has to be provided for each input.
    pub fn inputs(&self) -> InputInfoIter<'_> {
        InputInfoIter {
            net: self,
            ids: 0..self.num_inputs(),
        }
    }

    /// Returns an iterator over the network's output node information.
    pub fn outputs(&self) -> OutputInfoIter<'_> {
        OutputInfoIter {
            net: self,
            ids: 0..self.num_outputs(),
        }
    }

    /// Runs the network on a set of inputs, returning the computed outputs.
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: Inputs) -> anyhow::Result<Outputs> {
        let mut values = TVec::new();
        for tensor in &inputs.inner {
            values.push(TValue::from_const(Arc::new(tensor.to_tract()?)));
        }

        let outputs = self.inner.run(values)?;

        let mut tensors = TVec::new();
        for value in &outputs {
            tensors.push(Tensor::from_tract(value)?);
        }
        Ok(Outputs { inner: tensors })
    }
}

/// Iterator over a [`NeuralNetwork`]s input information.
pub struct InputInfoIter<'a> {
    net: &'a NeuralNetwork,
    ids: Range<usize>,
}

impl<'a> Iterator for InputInfoIter<'a> {
    type Item = InputInfo<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;

        let model = self.net.inner.model();
        let fact = model.input_fact(id).expect("`input_fact` returned error");

        let node = model.input_outlets().unwrap()[id].node;

        Some(InputInfo {
            shape: fact
                .shape
                .as_concrete()
                .expect("symbolic network input shape"),
            name: &model.node(node).name,
        })
    }
}

/// Information about a neural network input node.
#[derive(Debug)]
pub struct InputInfo<'a> {
    shape: &'a [usize],
    name: &'a str,
}

impl<'a> InputInfo<'a> {
    /// Returns the tensor shape for this input.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.shape
    }

    /// Returns the name of this input.
    #[inline]
    pub fn name(&self) -> &str {
        self.name
    }
}

/// Iterator over a [`NeuralNetwork`]s output node information.
pub struct OutputInfoIter<'a> {
    net: &'a NeuralNetwork,
    ids: Range<usize>,
}

impl<'a> Iterator for OutputInfoIter<'a> {
    type Item = OutputInfo<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;

        let model = self.net.inner.model();
        let fact = model.output_fact(id).expect("`output_fact` returned error");

        let node = model.output_outlets().unwrap()[id].node;

        Some(OutputInfo {
            shape: fact
                .shape
                .as_concrete()
                .expect("symbolic network output shape"),
            name: &model.node(node).name,
        })
    }
}

/// Information about a neural network output node.
#[derive(Debug)]
pub struct OutputInfo<'a> {
    shape: &'a [usize],
    name: &'a str,
}

impl<'a> OutputInfo<'a> {
    /// Returns the tensor shape for this output.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.shape
    }

    /// Returns the name of this output.
    #[inline]
    pub fn name(&self) -> &str {
        self.name
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: TVec<Tensor>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over the output tensors.
    pub fn iter(&self) -> impl Iterator<Item = &Tensor> {
        self.inner.iter()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

/// List of input tensors for neural network inference.
#[derive(Debug)]
pub struct Inputs {
    inner: TVec<Tensor>,
}

impl Inputs {
    /// Creates a network input from a single input tensor.
    pub fn single(tensor: Tensor) -> Self {
        Self {
            inner: tvec![tensor],
        }
    }

    /// Returns the number of input tensors stored in `self`.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn tensor_shape_and_data_roundtrip() {
        let tensor = Tensor::from_shape_vec(&[1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(tensor.shape(), &[1, 2, 2]);
        assert_eq!(tensor.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    #[should_panic(expected = "tensor data does not match shape")]
    fn tensor_shape_mismatch_panics() {
        Tensor::from_shape_vec(&[2, 2], vec![1.0]);
    }

    #[test]
    fn unadjust_is_identity_for_square_images() {
        let (x, y) = unadjust_aspect_ratio(0.3, 0.7, AspectRatio::SQUARE);
        assert_relative_eq!(x, 0.3);
        assert_relative_eq!(y, 0.7);
    }

    #[test]
    fn unadjust_undoes_letterboxing() {
        // For a 2:1 image squeezed into a square with letterbox bars, the center stays put
        // while the bar areas map outside [0, 1].
        let aspect = AspectRatio::new(2, 1).unwrap();
        let (x, y) = unadjust_aspect_ratio(0.5, 0.5, aspect);
        assert_relative_eq!(x, 0.5);
        assert_relative_eq!(y, 0.5);

        let (_, y) = unadjust_aspect_ratio(0.5, 0.25, aspect);
        assert_relative_eq!(y, 0.0);
    }

    #[test]
    fn point_to_img_scales_to_pixels() {
        let res = Resolution::new(112, 112);
        assert_eq!(point_to_img(0.5, 0.5, res), (56, 56));
        assert_eq!(point_to_img(0.0, 1.0, res), (0, 112));
    }

    #[test]
    fn unit_color_map_covers_full_range() {
        assert_relative_eq!(unit_color_map(0), 0.0);
        assert_relative_eq!(unit_color_map(255), 1.0);
    }
}
