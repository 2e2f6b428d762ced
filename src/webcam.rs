//! V4L2 webcam access.
//!
//! Only `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use anyhow::bail;
use linuxvideo::{
    format::{PixFormat, PixelFormat},
    stream::ReadStream,
    CapabilityFlags, Device, Fract,
};

use crate::image::Image;
use crate::timer::Timer;

/// A webcam yielding a stream of [`Image`]s.
pub struct Webcam {
    stream: ReadStream,
    width: u32,
    height: u32,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the first supported webcam found.
    ///
    /// This can block for a significant amount of time while the webcam initializes.
    pub fn open() -> anyhow::Result<Self> {
        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match Self::open_device(dev) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => log::warn!("{}", e),
                },
                Err(e) => log::warn!("{}", e),
            }
        }

        bail!("no supported webcam device found");
    }

    fn open_device(dev: Device) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?.device_capabilities();
        let path = dev.path()?;
        log::debug!("device {} capabilities: {:?}", path.display(), caps);

        if !caps.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let capture = dev.video_capture(PixFormat::new(1280, 720, PixelFormat::MJPG))?;

        let format = capture.format();
        let width = format.width();
        let height = format.height();
        match format.pixel_format() {
            PixelFormat::JPEG | PixelFormat::MJPG => {}
            other => bail!("unsupported pixel format {}", other),
        }

        let actual = capture.set_frame_interval(Fract::new(1, 30))?;

        log::info!(
            "opened {}, {}x{} @ {:.1}Hz",
            path.display(),
            width,
            height,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream()?;

        Ok(Some(Self {
            stream,
            width,
            height,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        let (width, height) = (self.width, self.height);
        let t_decode = &self.t_decode;
        Ok(self.stream.dequeue(|buf| {
            drop(dequeue_guard);
            let image = match t_decode.time(|| Image::decode_jpeg(&buf)) {
                Ok(image) => image,
                Err(e) => {
                    // Webcams occasionally produce corrupted MJPG frames. Yield a blank frame
                    // instead of stalling the stream.
                    log::error!("webcam decode error: {}", e);
                    Image::new(width, height)
                }
            };
            Ok(image)
        })?)
    }
}
