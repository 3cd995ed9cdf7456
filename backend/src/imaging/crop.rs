use image::{RgbImage, imageops};
use std::borrow::Cow;
use tomato_shared::BoundingBox;

/// Integer pixel corners of a box. `right` and `bottom` are exclusive when
/// used for cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl PixelRect {
    /// Converts a center/size box to corners, truncating each toward zero.
    pub fn from_center(bbox: &BoundingBox) -> Self {
        let half_w = bbox.width / 2.0;
        let half_h = bbox.height / 2.0;
        Self {
            left: (bbox.x - half_w) as i32,
            top: (bbox.y - half_h) as i32,
            right: (bbox.x + half_w) as i32,
            bottom: (bbox.y + half_h) as i32,
        }
    }

    /// Clamps to a `width` x `height` image. `None` when nothing is left.
    pub fn clamp_to(self, width: u32, height: u32) -> Option<Self> {
        let clamped = Self {
            left: self.left.max(0),
            top: self.top.max(0),
            right: self.right.min(width.min(i32::MAX as u32) as i32),
            bottom: self.bottom.min(height.min(i32::MAX as u32) as i32),
        };
        if clamped.right <= clamped.left || clamped.bottom <= clamped.top {
            None
        } else {
            Some(clamped)
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }
}

/// Cuts the detection out of `image`. A box that collapses after clamping
/// yields the whole image so the classifier always gets valid input.
pub fn crop_detection<'a>(image: &'a RgbImage, bbox: &BoundingBox) -> Cow<'a, RgbImage> {
    match PixelRect::from_center(bbox).clamp_to(image.width(), image.height()) {
        Some(rect) => Cow::Owned(
            imageops::crop_imm(
                image,
                rect.left as u32,
                rect.top as u32,
                rect.width(),
                rect.height(),
            )
            .to_image(),
        ),
        None => {
            log::debug!("Degenerate crop for {:?}, using full image", bbox);
            Cow::Borrowed(image)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn bbox(x: f32, y: f32, width: f32, height: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn centered_box_maps_to_expected_region() {
        let image = gradient(800, 600);
        let b = bbox(400.0, 300.0, 200.0, 100.0);

        let rect = PixelRect::from_center(&b).clamp_to(800, 600).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                left: 300,
                top: 250,
                right: 500,
                bottom: 350
            }
        );

        let crop = crop_detection(&image, &b);
        assert_eq!(crop.dimensions(), (200, 100));
        assert_eq!(crop.get_pixel(0, 0), image.get_pixel(300, 250));
        assert_eq!(crop.get_pixel(199, 99), image.get_pixel(499, 349));
    }

    #[test]
    fn zero_width_falls_back_to_full_image() {
        let image = gradient(800, 600);
        let crop = crop_detection(&image, &bbox(400.0, 300.0, 0.0, 100.0));
        assert!(matches!(crop, Cow::Borrowed(_)));
        assert_eq!(crop.dimensions(), (800, 600));
    }

    #[test]
    fn box_outside_image_falls_back_to_full_image() {
        let image = gradient(120, 80);
        for b in [
            bbox(-100.0, 40.0, 50.0, 50.0),
            bbox(60.0, 500.0, 30.0, 30.0),
            bbox(1000.0, 1000.0, 10.0, 10.0),
        ] {
            let crop = crop_detection(&image, &b);
            assert_eq!(crop.dimensions(), (120, 80), "box {:?}", b);
        }
    }

    #[test]
    fn full_bounds_box_returns_identical_content() {
        let image = gradient(64, 48);
        let crop = crop_detection(&image, &bbox(32.0, 24.0, 64.0, 48.0));
        assert_eq!(crop.dimensions(), image.dimensions());
        assert_eq!(crop.as_raw(), image.as_raw());
    }

    #[test]
    fn inside_boxes_keep_their_size_within_a_pixel() {
        let image = gradient(300, 300);
        for (x, y, w, h) in [
            (150.0, 150.0, 41.3, 17.8),
            (20.5, 30.25, 11.0, 9.5),
            (200.9, 100.1, 60.6, 80.4),
        ] {
            let crop = crop_detection(&image, &bbox(x, y, w, h));
            let (cw, ch) = crop.dimensions();
            assert!((cw as f32 - w.round()).abs() <= 1.0, "width {} vs {}", cw, w);
            assert!((ch as f32 - h.round()).abs() <= 1.0, "height {} vs {}", ch, h);
        }
    }

    #[test]
    fn partially_outside_box_is_clamped() {
        let image = gradient(100, 100);
        let crop = crop_detection(&image, &bbox(0.0, 90.0, 40.0, 40.0));
        // left -20 -> 0, bottom 110 -> 100
        assert_eq!(crop.dimensions(), (20, 30));
        assert_eq!(crop.get_pixel(0, 0), image.get_pixel(0, 70));
    }
}
