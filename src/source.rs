//! Frame sources for evaluation runs.
//!
//! A [`FrameSource`] yields images together with optional ground-truth landmarks. The two
//! implementations share one contract so the evaluation loop never needs to know whether it is
//! consuming a file-backed dataset or a live camera; the source is picked once at startup.

use anyhow::Context;

use crate::dataset::{ListDataset, Record};
use crate::image::Image;
use crate::landmark::Landmarks;
use crate::webcam::Webcam;

/// One frame produced by a [`FrameSource`].
pub struct Frame {
    pub image: Image,
    /// Ground-truth landmarks, if the source has labels. Live sources have none, so no metrics
    /// can be computed for them.
    pub truth: Option<Landmarks>,
}

/// Produces frames until exhausted.
pub trait FrameSource {
    /// Returns the next frame, or [`None`] once the source is exhausted.
    ///
    /// Live sources never return [`None`]; they are stopped by interrupting the process.
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>>;
}

/// A [`FrameSource`] backed by a parsed test list, yielding labeled frames in list order.
pub struct ListSource {
    records: std::vec::IntoIter<Record>,
}

impl ListSource {
    pub fn new(dataset: ListDataset) -> Self {
        Self {
            records: dataset.into_records().into_iter(),
        }
    }
}

impl FrameSource for ListSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        let record = match self.records.next() {
            Some(record) => record,
            None => return Ok(None),
        };

        let image = Image::load(&record.image_path)
            .with_context(|| format!("failed to load image '{}'", record.image_path.display()))?;
        Ok(Some(Frame {
            image,
            truth: Some(record.landmarks),
        }))
    }
}

/// A [`FrameSource`] reading live frames from a [`Webcam`]. Frames carry no ground truth.
pub struct CameraSource {
    webcam: Webcam,
}

impl CameraSource {
    /// Opens the first supported webcam.
    pub fn open() -> anyhow::Result<Self> {
        Ok(Self {
            webcam: Webcam::open()?,
        })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        Ok(Some(Frame {
            image: self.webcam.read()?,
            truth: None,
        }))
    }
}
