//! Frames: one body pose, one image and the rig camera that captured it.

use std::borrow::Cow;
use std::sync::Arc;

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::geometry::SE3;

/// A single sampled pixel, grayscale or color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelValue {
    Gray(u8),
    Rgb([u8; 3]),
}

impl PixelValue {
    /// Rec. 709 luma, matching the `image` crate's RGB to luma conversion.
    pub fn luma(self) -> u8 {
        match self {
            PixelValue::Gray(v) => v,
            PixelValue::Rgb([r, g, b]) => {
                ((2126 * r as u32 + 7152 * g as u32 + 722 * b as u32) / 10000) as u8
            }
        }
    }

    pub fn rgb(self) -> [u8; 3] {
        match self {
            PixelValue::Gray(v) => [v, v, v],
            PixelValue::Rgb(c) => c,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FrameImage {
    Gray(GrayImage),
    Rgb(RgbImage),
}

impl FrameImage {
    pub fn width(&self) -> u32 {
        match self {
            FrameImage::Gray(img) => img.width(),
            FrameImage::Rgb(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            FrameImage::Gray(img) => img.height(),
            FrameImage::Rgb(img) => img.height(),
        }
    }

    /// Pixel at `(x, y)`; the caller guarantees the coordinate is in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> PixelValue {
        match self {
            FrameImage::Gray(img) => {
                let Luma([v]) = *img.get_pixel(x, y);
                PixelValue::Gray(v)
            }
            FrameImage::Rgb(img) => {
                let Rgb(c) = *img.get_pixel(x, y);
                PixelValue::Rgb(c)
            }
        }
    }

    /// Grayscale view used by dense stereo.
    pub fn to_luma(&self) -> Cow<'_, GrayImage> {
        match self {
            FrameImage::Gray(img) => Cow::Borrowed(img),
            FrameImage::Rgb(img) => Cow::Owned(GrayImage::from_fn(img.width(), img.height(), |x, y| {
                let Rgb(c) = *img.get_pixel(x, y);
                Luma([PixelValue::Rgb(c).luma()])
            })),
        }
    }
}

/// A posed image. Immutable after load; cheap to clone.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the capture sequence.
    pub seq: usize,
    /// Index into the camera rig.
    pub camera_index: usize,
    /// Body pose in the world frame (T_G_B).
    pub pose: SE3,
    pub image: Arc<FrameImage>,
}

impl Frame {
    /// A frame captured by rig camera 0.
    pub fn new(seq: usize, pose: SE3, image: FrameImage) -> Self {
        Self {
            seq,
            camera_index: 0,
            pose,
            image: Arc::new(image),
        }
    }

    pub fn with_camera(mut self, camera_index: usize) -> Self {
        self.camera_index = camera_index;
        self
    }
}
