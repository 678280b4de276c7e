use std::sync::{Arc, OnceLock};

use opencv::core::{Mat, Point, Scalar, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;

const CHANNELS: usize = 3;
const PLACEHOLDER_WIDTH: u32 = 320;
const PLACEHOLDER_HEIGHT: u32 = 240;

/// A captured BGR24 image. Frames are never mutated after construction;
/// annotation always works on a fresh copy.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize * CHANNELS
        {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_mat(mat: &Mat) -> opencv::Result<Self> {
        if mat.typ() != CV_8UC3 {
            return Err(opencv::Error::new(
                opencv::core::StsUnsupportedFormat,
                format!("expected 8-bit BGR frame, got type {}", mat.typ()),
            ));
        }
        let width = mat.cols() as u32;
        let height = mat.rows() as u32;
        let data = if mat.is_continuous() {
            mat.data_bytes()?.to_vec()
        } else {
            mat.try_clone()?.data_bytes()?.to_vec()
        };
        Self::new(width, height, data).ok_or_else(|| {
            opencv::Error::new(opencv::core::StsBadSize, "empty or truncated frame")
        })
    }

    /// Deep copy into an owned OpenCV matrix.
    pub fn to_mat(&self) -> opencv::Result<Mat> {
        let flat = Mat::from_slice(&self.data)?;
        let shaped = flat.reshape(CHANNELS as i32, self.height as i32)?;
        shaped.try_clone()
    }

    /// Blank image with a red "NO FRAME" marker, served while a camera has
    /// never produced a frame. Rendered once per process.
    pub fn placeholder() -> Arc<Frame> {
        static PLACEHOLDER: OnceLock<Arc<Frame>> = OnceLock::new();
        Arc::clone(PLACEHOLDER.get_or_init(|| {
            let frame = Self::render_placeholder().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to draw placeholder marker");
                Self::filled(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, [0, 0, 0])
            });
            Arc::new(frame)
        }))
    }

    fn render_placeholder() -> opencv::Result<Self> {
        let mut mat = Self::filled(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, [0, 0, 0]).to_mat()?;
        imgproc::put_text(
            &mut mat,
            "NO FRAME",
            Point::new(40, 130),
            imgproc::FONT_HERSHEY_SIMPLEX,
            1.0,
            Scalar::new(0.0, 0.0, 255.0, 0.0),
            2,
            imgproc::LINE_8,
            false,
        )?;
        Self::from_mat(&mat)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_mismatched_buffer() {
        assert!(Frame::new(2, 2, vec![0; 11]).is_none());
        assert!(Frame::new(0, 2, Vec::new()).is_none());
        assert!(Frame::new(2, 2, vec![0; 12]).is_some());
    }

    #[test]
    fn mat_round_trip_keeps_pixels() {
        let frame = Frame::filled(8, 4, [10, 20, 30]);
        let mat = frame.to_mat().unwrap();
        assert_eq!(mat.cols(), 8);
        assert_eq!(mat.rows(), 4);
        assert_eq!(Frame::from_mat(&mat).unwrap(), frame);
    }

    #[test]
    fn placeholder_is_fixed_size_and_marked() {
        let placeholder = Frame::placeholder();
        assert_eq!(placeholder.width(), 320);
        assert_eq!(placeholder.height(), 240);
        assert!(placeholder.data().iter().any(|&b| b != 0));
        assert!(Arc::ptr_eq(&placeholder, &Frame::placeholder()));
    }
}
