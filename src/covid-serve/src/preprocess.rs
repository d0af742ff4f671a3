//! Image to tensor conversion.
//!
//! Every image is forced to RGB, resized straight to the target size (aspect
//! ratio is not preserved) and scaled into [0, 1]. The result is laid out
//! NHWC with a batch dimension of one.

use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use log::debug;

use crate::config::TargetSize;
use crate::error::{Error, Result};

const CHANNELS: u64 = 3;

/// A single-image batch, shape `[1, height, width, 3]`
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    size: TargetSize,
    values: Vec<f32>,
}

impl InputTensor {
    /// Wrap raw NHWC values, checking they fill the shape exactly.
    pub fn from_values(size: TargetSize, values: Vec<f32>) -> Result<Self> {
        let shape = shape_of(size);
        let expected = shape.iter().product::<u64>() as usize;

        if values.len() != expected {
            return Err(Error::ShapeMismatch {
                shape,
                expected,
                actual: values.len(),
            });
        }

        Ok(InputTensor { size, values })
    }

    pub fn shape(&self) -> [u64; 4] {
        shape_of(self.size)
    }

    pub fn size(&self) -> TargetSize {
        self.size
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

fn shape_of(size: TargetSize) -> [u64; 4] {
    [1, size.height as u64, size.width as u64, CHANNELS]
}

pub fn preprocess(image: &DynamicImage, size: TargetSize) -> InputTensor {
    let resized = image.resize_exact(size.width, size.height, FilterType::CatmullRom);

    let values = resized
        .to_rgb8()
        .into_raw()
        .into_iter()
        .map(|x| x as f32 / 255f32)
        .collect();

    InputTensor { size, values }
}

pub fn preprocess_bytes(data: &[u8], size: TargetSize) -> Result<InputTensor> {
    let image = image::load_from_memory(data)?;

    Ok(preprocess(&image, size))
}

/// Decode an image file, trusting its content over its extension.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    debug!("Decoding {}", path.display());

    let image = image::io::Reader::open(path)?
        .with_guessed_format()?
        .decode()?;

    Ok(image)
}

/// Decode the image stored at `path` and turn it into model input.
pub fn preprocess_image(path: &Path, size: TargetSize) -> Result<InputTensor> {
    Ok(preprocess(&open_image(path)?, size))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    use super::*;
    use crate::config::TARGET_SIZE;

    fn assert_model_ready(tensor: &InputTensor) {
        assert_eq!(tensor.shape(), [1u64, 224, 224, 3]);
        assert_eq!(tensor.values().len(), 224 * 224 * 3);
        assert!(tensor.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn any_size_and_mode_yields_model_shape() {
        let images = vec![
            DynamicImage::ImageRgb8(gradient(512, 512)),
            DynamicImage::ImageRgb8(gradient(37, 901)),
            DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 60, Luma([200]))),
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 0]))),
        ];

        for image in &images {
            assert_model_ready(&preprocess(image, TARGET_SIZE));
        }
    }

    #[test]
    fn extreme_pixels_map_to_unit_range_bounds() {
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([255, 255, 255])));
        let black = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([0, 0, 0])));

        assert!(preprocess(&white, TARGET_SIZE).values().iter().all(|&v| v == 1.0));
        assert!(preprocess(&black, TARGET_SIZE).values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn grayscale_is_replicated_across_channels() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 10, Luma([51])));
        let tensor = preprocess(&gray, TargetSize::new(4, 4));

        assert_eq!(tensor.shape(), [1u64, 4, 4, 3]);
        assert!(tensor.values().iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn preprocessing_is_deterministic() {
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(gradient(300, 200))
            .write_to(&mut png, ImageOutputFormat::Png)
            .unwrap();
        let png = png.into_inner();

        let first = preprocess_bytes(&png, TARGET_SIZE).unwrap();
        let second = preprocess_bytes(&png, TARGET_SIZE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn reads_image_from_disk() {
        let path = std::env::temp_dir().join(format!("covid-serve-pre-{}.jpg", std::process::id()));
        DynamicImage::ImageRgb8(gradient(128, 96))
            .save(&path)
            .unwrap();

        let tensor = preprocess_image(&path, TARGET_SIZE);
        std::fs::remove_file(&path).unwrap();

        assert_model_ready(&tensor.unwrap());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = preprocess_bytes(b"definitely not an image", TARGET_SIZE).unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = preprocess_image(Path::new("/nonexistent/xray.png"), TARGET_SIZE).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn from_values_checks_length() {
        let size = TargetSize::new(2, 2);
        assert!(InputTensor::from_values(size, vec![0.5; 12]).is_ok());

        match InputTensor::from_values(size, vec![0.5; 11]) {
            Err(Error::ShapeMismatch { expected, actual, .. }) => {
                assert_eq!((expected, actual), (12, 11));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
