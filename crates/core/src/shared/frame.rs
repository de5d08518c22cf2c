use std::time::Instant;

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use ndarray::{s, ArrayView3};

use crate::shared::region::Region;

/// A single captured frame: contiguous pixel bytes in row-major order.
///
/// Frames are produced once per capture cycle and then shared read-only
/// (`Arc<Frame>`) between the capture loop, the detector and any number of
/// controllers. Nothing mutates a frame after delivery.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: u64) -> Self {
        Self::with_timestamp(data, width, height, channels, index, Instant::now())
    }

    pub fn with_timestamp(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        index: u64,
        captured_at: Instant,
    ) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
            captured_at,
        }
    }

    /// Wraps a decoded image as an RGB frame.
    pub fn from_image(image: &DynamicImage, index: u64) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(rgb.into_raw(), width, height, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Sequence number assigned by the capture device.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels covered by `region` into a new frame.
    ///
    /// The region is clamped to the frame bounds first; a region entirely
    /// outside the frame yields an empty frame. Index and timestamp are
    /// inherited so a crop can always be traced back to its source.
    pub fn crop(&self, region: &Region) -> Frame {
        let Some(r) = region.within(self.width, self.height) else {
            return Frame::with_timestamp(
                Vec::new(),
                0,
                0,
                self.channels,
                self.index,
                self.captured_at,
            );
        };
        let x = r.x as usize;
        let y = r.y as usize;
        let w = r.width as usize;
        let h = r.height as usize;

        let view = self.as_ndarray();
        let data: Vec<u8> = view.slice(s![y..y + h, x..x + w, ..]).iter().copied().collect();
        Frame::with_timestamp(
            data,
            w as u32,
            h as u32,
            self.channels,
            self.index,
            self.captured_at,
        )
    }

    /// Converts the frame into an `image` buffer for encoding or resampling.
    ///
    /// Returns `None` for channel layouts other than gray, RGB and RGBA.
    pub fn to_image(&self) -> Option<DynamicImage> {
        let (w, h, data) = (self.width, self.height, self.data.clone());
        match self.channels {
            1 => GrayImage::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
            4 => RgbaImage::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
            _ => None,
        }
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
