//! Frame data structures for captured label images

use image::{imageops, RgbaImage};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Clockwise rotation that makes a frame upright
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Rotation in degrees
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Parse one of 0/90/180/270
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Map a raw device orientation angle (degrees, as reported by an
    /// orientation sensor) to the rotation the captured image needs.
    pub fn from_device_angle(angle: u32) -> Self {
        match angle % 360 {
            45..=134 => Rotation::Deg270,
            135..=224 => Rotation::Deg180,
            225..=314 => Rotation::Deg90,
            _ => Rotation::Deg0,
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// A captured image plus its orientation metadata.
///
/// The pixel buffer is shared, never mutated; cloning a frame is cheap.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw RGBA pixel data
    pub data: Arc<[u8]>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Rotation needed to make the content upright
    pub rotation: Rotation,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Create a new frame from RGBA pixel data
    pub fn new(data: impl Into<Arc<[u8]>>, width: u32, height: u32, rotation: Rotation) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            rotation,
            timestamp: Instant::now(),
        }
    }

    /// Create a frame from a decoded RGBA image
    pub fn from_image(image: RgbaImage, rotation: Rotation) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, rotation)
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the buffer is non-empty and matches the declared dimensions
    pub fn is_well_formed(&self) -> bool {
        let expected = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|pixels| pixels.checked_mul(4));
        self.width > 0 && self.height > 0 && expected == Some(self.data.len())
    }

    /// Copy of the pixels rotated upright, or `None` for a malformed buffer
    pub fn upright(&self) -> Option<RgbaImage> {
        if !self.is_well_formed() {
            return None;
        }
        let image = RgbaImage::from_raw(self.width, self.height, self.data.to_vec())?;
        Some(match self.rotation {
            Rotation::Deg0 => image,
            Rotation::Deg90 => imageops::rotate90(&image),
            Rotation::Deg180 => imageops::rotate180(&image),
            Rotation::Deg270 => imageops::rotate270(&image),
        })
    }
}

/// Frames compare by content; the capture timestamp is ignored.
impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.rotation == other.rotation
            && (Arc::ptr_eq(&self.data, &other.data) || self.data == other.data)
    }
}

impl Eq for Frame {}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_rotation_degrees() {
        for degrees in [0, 90, 180, 270] {
            let rotation = Rotation::from_degrees(degrees).unwrap();
            assert_eq!(rotation.degrees(), degrees);
        }
        assert!(Rotation::from_degrees(45).is_none());
    }

    #[test]
    fn test_rotation_from_device_angle() {
        assert_eq!(Rotation::from_device_angle(0), Rotation::Deg0);
        assert_eq!(Rotation::from_device_angle(44), Rotation::Deg0);
        assert_eq!(Rotation::from_device_angle(45), Rotation::Deg270);
        assert_eq!(Rotation::from_device_angle(134), Rotation::Deg270);
        assert_eq!(Rotation::from_device_angle(135), Rotation::Deg180);
        assert_eq!(Rotation::from_device_angle(225), Rotation::Deg90);
        assert_eq!(Rotation::from_device_angle(314), Rotation::Deg90);
        assert_eq!(Rotation::from_device_angle(315), Rotation::Deg0);
        assert_eq!(Rotation::from_device_angle(405), Rotation::Deg270);
    }

    #[test]
    fn test_upright_rotates_dimensions() {
        let mut image = RgbaImage::new(4, 2);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let frame = Frame::from_image(image, Rotation::Deg90);

        let upright = frame.upright().unwrap();
        assert_eq!(upright.dimensions(), (2, 4));
        // Top-left moves to top-right after a clockwise quarter turn
        assert_eq!(upright.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_malformed_frame() {
        let frame = Frame::new(vec![0u8; 10], 4, 4, Rotation::Deg0);
        assert!(!frame.is_well_formed());
        assert!(frame.upright().is_none());

        let empty = Frame::new(Vec::<u8>::new(), 0, 0, Rotation::Deg0);
        assert!(empty.upright().is_none());
    }

    #[test]
    fn test_oversized_dimensions_are_malformed() {
        let frame = Frame::new(vec![0u8; 4], u32::MAX, u32::MAX, Rotation::Deg0);
        assert!(!frame.is_well_formed());
        assert!(frame.upright().is_none());
    }

    #[test]
    fn test_equality_ignores_timestamp() {
        let a = Frame::new(vec![1u8, 2, 3, 4], 1, 1, Rotation::Deg0);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = Frame::new(vec![1u8, 2, 3, 4], 1, 1, Rotation::Deg0);
        assert_eq!(a, b);
        assert_ne!(a, Frame::new(vec![1u8, 2, 3, 4], 1, 1, Rotation::Deg90));
    }
}
