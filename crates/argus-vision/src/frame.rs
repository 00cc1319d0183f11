//! Plain BGR8 frame buffer.
//!
//! Frames cross thread boundaries (capture -> inference -> snapshot), so
//! they are owned byte buffers rather than backend-specific matrices. The
//! OpenCV paths convert at the edge.

use argus_models::BoundingBox;

use crate::error::{VisionError, VisionResult};

/// A BGR8 image with tightly packed rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major BGR triplets, `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame from raw BGR bytes.
    ///
    /// Returns `None` when the buffer size does not match the dimensions.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }
        Some(Self { width, height, data })
    }

    /// Zero-filled frame, used for engine warmup.
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; (width as usize) * (height as usize) * 3],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Grayscale plane using integer BT.601 luma weights.
    pub fn to_gray(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|px| {
                // BGR order
                let b = u32::from(px[0]);
                let g = u32::from(px[1]);
                let r = u32::from(px[2]);
                ((29 * b + 150 * g + 77 * r) >> 8) as u8
            })
            .collect()
    }

    /// Copy of the region covered by `bbox`, clipped to the frame.
    ///
    /// Returns `None` when the clipped region is empty.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<Frame> {
        let clipped = bbox.clip(self.width, self.height);
        let x1 = clipped.x as usize;
        let y1 = clipped.y as usize;
        let x2 = clipped.x2() as usize;
        let y2 = clipped.y2() as usize;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        let w = x2 - x1;
        let h = y2 - y1;
        let src_stride = self.width as usize * 3;
        let mut data = Vec::with_capacity(w * h * 3);
        for row in y1..y2 {
            let start = row * src_stride + x1 * 3;
            data.extend_from_slice(&self.data[start..start + w * 3]);
        }
        Some(Frame {
            width: w as u32,
            height: h as u32,
            data,
        })
    }

    /// Encode as JPEG at the given quality (1-100).
    pub fn encode_jpeg(&self, quality: u8) -> VisionResult<Vec<u8>> {
        let mut rgb = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(3) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        let mut out = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
            &mut out,
            quality.clamp(1, 100),
        );
        encoder
            .encode(&rgb, self.width, self.height, image::ColorType::Rgb8)
            .map_err(|e| VisionError::Encode(e.to_string()))?;
        Ok(out)
    }

    /// Set one pixel; out-of-bounds coordinates are ignored.
    #[inline]
    pub(crate) fn put_pixel(&mut self, x: i64, y: i64, bgr: [u8; 3]) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.data[idx..idx + 3].copy_from_slice(&bgr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(w: u32, h: u32) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                let v = ((x + y) % 256) as u8;
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::from_bgr(w, h, data).unwrap()
    }

    #[test]
    fn test_from_bgr_size_mismatch() {
        assert!(Frame::from_bgr(4, 4, vec![0u8; 10]).is_none());
        assert!(Frame::from_bgr(4, 4, vec![0u8; 48]).is_some());
    }

    #[test]
    fn test_gray_of_uniform_frame() {
        let f = Frame::from_bgr(2, 1, vec![100, 100, 100, 200, 200, 200]).unwrap();
        let gray = f.to_gray();
        assert_eq!(gray.len(), 2);
        // luma of a gray pixel equals its value
        assert!((i32::from(gray[0]) - 100).abs() <= 1);
        assert!((i32::from(gray[1]) - 200).abs() <= 1);
    }

    #[test]
    fn test_crop_inside() {
        let f = gradient_frame(10, 10);
        let c = f
            .crop(&BoundingBox::new(2.0, 3.0, 4.0, 5.0))
            .unwrap();
        assert_eq!(c.width, 4);
        assert_eq!(c.height, 5);
        // top-left pixel of the crop comes from (2, 3)
        assert_eq!(c.data[0], ((2 + 3) % 256) as u8);
    }

    #[test]
    fn test_crop_fully_outside() {
        let f = gradient_frame(10, 10);
        assert!(f.crop(&BoundingBox::new(50.0, 50.0, 5.0, 5.0)).is_none());
    }

    #[test]
    fn test_encode_jpeg_round_trip_dimensions() {
        let f = gradient_frame(16, 8);
        let jpeg = f.encode_jpeg(80).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 8);
    }
}
