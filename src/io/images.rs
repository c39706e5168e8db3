use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::DynamicImage;
use rayon::prelude::*;

use crate::frame::FrameImage;

/// `{directory}/{prefix}{index}.{extension}`
pub fn indexed_image_path(directory: &Path, prefix: &str, index: usize, extension: &str) -> PathBuf {
    directory.join(format!("{}{}.{}", prefix, index, extension))
}

/// Number of consecutive indexed images present on disk, starting at 0.
pub fn count_indexed_images(directory: &Path, prefix: &str, extension: &str) -> usize {
    (0..)
        .take_while(|&i| indexed_image_path(directory, prefix, i, extension).is_file())
        .count()
}

/// Decode an image, keeping color when the file has it.
pub fn load_image(path: &Path) -> Result<FrameImage> {
    let image = image::open(path).with_context(|| format!("Failed to read image {}", path.display()))?;
    Ok(match image {
        DynamicImage::ImageLuma8(gray) => FrameImage::Gray(gray),
        other if other.color().has_color() => FrameImage::Rgb(other.to_rgb8()),
        other => FrameImage::Gray(other.to_luma8()),
    })
}

/// Decode all images in parallel, preserving order.
pub fn load_images(paths: &[PathBuf]) -> Result<Vec<FrameImage>> {
    paths.par_iter().map(|path| load_image(path)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_indexed_images_are_counted_and_loaded() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            GrayImage::from_pixel(4, 2, Luma([i as u8 * 10]))
                .save(indexed_image_path(dir.path(), "image_", i, "png"))
                .unwrap();
        }
        // A gap ends the sequence.
        GrayImage::new(4, 2)
            .save(indexed_image_path(dir.path(), "image_", 4, "png"))
            .unwrap();
        assert_eq!(count_indexed_images(dir.path(), "image_", "png"), 3);

        let paths: Vec<_> = (0..3)
            .map(|i| indexed_image_path(dir.path(), "image_", i, "png"))
            .collect();
        let images = load_images(&paths).unwrap();
        assert_eq!(images.len(), 3);
        match &images[2] {
            FrameImage::Gray(img) => assert_eq!(img.get_pixel(0, 0)[0], 20),
            FrameImage::Rgb(_) => panic!("expected a grayscale image"),
        }
    }

    #[test]
    fn test_color_image_stays_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.png");
        RgbImage::from_pixel(2, 2, Rgb([10, 20, 30])).save(&path).unwrap();
        assert!(matches!(load_image(&path).unwrap(), FrameImage::Rgb(_)));
        assert!(load_image(&dir.path().join("missing.png")).is_err());
    }
}
