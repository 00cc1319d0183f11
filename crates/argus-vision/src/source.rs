//! Frame sources: network streams and local capture devices.
//!
//! The capture loop talks to a `FrameSource` trait object so tests can
//! substitute synthetic sources. `open_source` is the production factory;
//! it understands `rtsp://…`, a bare device index and `webcam:<n>`.

use std::time::Duration;

use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;

/// Bound on a single network open/read.
pub const NETWORK_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed camera source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Network stream opened over TCP with a bounded I/O timeout.
    Network(String),
    /// Local capture device index.
    Device(u32),
}

impl SourceKind {
    /// Parse a source URL.
    ///
    /// Accepted forms: `rtsp://…`, a bare non-negative integer, or
    /// `webcam:<integer>`.
    pub fn parse(url: &str) -> VisionResult<Self> {
        let s = url.trim();
        if s.is_empty() {
            return Err(VisionError::BadSource("empty source URL".into()));
        }
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("rtsp://") {
            return Ok(SourceKind::Network(s.to_string()));
        }
        if let Some(rest) = lower.strip_prefix("webcam:") {
            return rest
                .parse::<u32>()
                .map(SourceKind::Device)
                .map_err(|_| VisionError::BadSource(format!("bad device index in {s:?}")));
        }
        if let Ok(idx) = s.parse::<u32>() {
            return Ok(SourceKind::Device(idx));
        }
        Err(VisionError::BadSource(format!("unrecognized source {s:?}")))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, SourceKind::Network(_))
    }
}

/// A stream of frames from one camera.
///
/// `read` blocks until a frame is available or the bounded timeout elapses.
pub trait FrameSource: Send {
    fn read(&mut self) -> VisionResult<Frame>;
}

/// Open a camera source for capture.
///
/// Without the `opencv` feature this always fails; the capture loop logs
/// and retries, so a misconfigured build degrades instead of crashing.
pub fn open_source(url: &str) -> VisionResult<Box<dyn FrameSource>> {
    let kind = SourceKind::parse(url)?;
    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(cv::OpencvSource::open(&kind)?))
    }
    #[cfg(not(feature = "opencv"))]
    {
        Err(VisionError::source_open(format!(
            "no capture backend available for {kind:?} (opencv feature disabled)"
        )))
    }
}

#[cfg(feature = "opencv")]
mod cv {
    //! OpenCV VideoCapture source.

    use opencv::prelude::*;
    use opencv::videoio::{self, VideoCapture};

    use super::{FrameSource, SourceKind, NETWORK_IO_TIMEOUT};
    use crate::error::{VisionError, VisionResult};
    use crate::frame::Frame;

    pub(super) struct OpencvSource {
        capture: VideoCapture,
    }

    impl OpencvSource {
        pub(super) fn open(kind: &SourceKind) -> VisionResult<Self> {
            let mut capture = match kind {
                SourceKind::Network(url) => {
                    // TCP transport, bounded socket timeout and a minimal
                    // receive buffer; picked up by the FFmpeg backend.
                    let timeout_us = NETWORK_IO_TIMEOUT.as_micros();
                    if std::env::var_os("OPENCV_FFMPEG_CAPTURE_OPTIONS").is_none() {
                        std::env::set_var(
                            "OPENCV_FFMPEG_CAPTURE_OPTIONS",
                            format!("rtsp_transport;tcp|stimeout;{timeout_us}|buffer_size;102400"),
                        );
                    }
                    VideoCapture::from_file(url, videoio::CAP_FFMPEG)?
                }
                SourceKind::Device(idx) => VideoCapture::new(*idx as i32, videoio::CAP_ANY)?,
            };
            if !capture.is_opened()? {
                return Err(VisionError::source_open(format!("{kind:?}")));
            }
            // Single-frame internal buffer so reads return the newest frame.
            let _ = capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0);
            Ok(Self { capture })
        }
    }

    impl FrameSource for OpencvSource {
        fn read(&mut self) -> VisionResult<Frame> {
            let mut mat = Mat::default();
            let ok = self.capture.read(&mut mat)?;
            if !ok || mat.empty() {
                return Err(VisionError::source_read("no frame"));
            }
            let width = mat.cols() as u32;
            let height = mat.rows() as u32;
            let data = mat.data_bytes()?.to_vec();
            Frame::from_bgr(width, height, data)
                .ok_or_else(|| VisionError::source_read("unexpected frame layout"))
        }
    }
}
