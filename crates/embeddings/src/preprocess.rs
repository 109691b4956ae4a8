//! CLIP image preprocessing.

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array4;
use std::path::Path;

/// Per-channel mean used by CLIP's image normalization
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// Per-channel standard deviation used by CLIP's image normalization
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Decode an image file
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("Failed to read image {}", path.display()))
}

/// Build an NCHW tensor from images.
///
/// Each image is resized so its short side matches `size`, center cropped to
/// `size x size`, scaled to `[0, 1]` and normalized with CLIP mean/std.
#[must_use]
pub fn preprocess_images(images: &[DynamicImage], size: u32) -> Array4<f32> {
    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((images.len(), 3, side, side));

    for (i, img) in images.iter().enumerate() {
        let img = img
            .resize_to_fill(size, size, image::imageops::FilterType::CatmullRom)
            .to_rgb8();

        for (x, y, pixel) in img.enumerate_pixels() {
            for c in 0..3 {
                tensor[[i, c, y as usize, x as usize]] =
                    (f32::from(pixel[c]) / 255.0 - CLIP_MEAN[c]) / CLIP_STD[c];
            }
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 240, Rgb([255, 255, 255])));
        let black = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([0, 0, 0])));

        let tensor = preprocess_images(&[white, black], 224);
        assert_eq!(tensor.shape(), &[2, 3, 224, 224]);

        let expected_white = (1.0 - CLIP_MEAN[0]) / CLIP_STD[0];
        assert!((tensor[[0, 0, 112, 112]] - expected_white).abs() < 1e-4);

        let expected_black = -CLIP_MEAN[2] / CLIP_STD[2];
        assert!((tensor[[1, 2, 0, 0]] - expected_black).abs() < 1e-4);
    }

    #[test]
    fn test_load_image_missing_file() {
        assert!(load_image(Path::new("/nonexistent/frame.jpg")).is_err());
    }

    #[test]
    fn test_load_image_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        RgbImage::from_pixel(8, 8, Rgb([10, 20, 30])).save(&path).unwrap();
        let img = load_image(&path).unwrap();
        assert_eq!(img.width(), 8);
    }
}
