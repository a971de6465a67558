use image::{imageops::FilterType, ImageError, Limits, RgbImage};
use ndarray::{Array, Ix4};
use thiserror::Error;

pub const TARGET_WIDTH: u32 = 300;
/// Tallest resized image accepted; anything taller is rejected before resizing.
pub const MAX_TARGET_HEIGHT: u32 = 8192;
const MAX_INPUT_DIMENSION: u32 = 16384;
const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("error decoding image: {0}")]
    Decode(#[from] ImageError),
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("image of {width}x{height} is too tall to resize")]
    TooLarge { width: u32, height: u32 },
}

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_INPUT_DIMENSION);
    limits.max_image_height = Some(MAX_INPUT_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

pub fn decode_rgb(image_data: &[u8]) -> Result<RgbImage, ImageError> {
    let mut image_reader =
        image::ImageReader::new(std::io::Cursor::new(image_data)).with_guessed_format()?;
    image_reader.limits(decode_limits());

    Ok(image_reader.decode()?.to_rgb8())
}

/// Width is fixed, height keeps the aspect ratio (floored, at least one row).
pub fn target_dimensions(width: u32, height: u32) -> (u32, u32) {
    let scaled = u64::from(TARGET_WIDTH) * u64::from(height) / u64::from(width.max(1));
    let height = u32::try_from(scaled).unwrap_or(u32::MAX).max(1);

    (TARGET_WIDTH, height)
}

/// Resizes and lays the pixels out as a `(1, height, width, 3)` batch of raw
/// 0..=255 values.
pub fn to_input_tensor(img: &RgbImage) -> Result<Array<f32, Ix4>, PreprocessError> {
    let (img_width, img_height) = img.dimensions();
    if img_width == 0 || img_height == 0 {
        return Err(PreprocessError::EmptyImage {
            width: img_width,
            height: img_height,
        });
    }

    let (width, height) = target_dimensions(img_width, img_height);
    if height > MAX_TARGET_HEIGHT {
        return Err(PreprocessError::TooLarge {
            width: img_width,
            height: img_height,
        });
    }
    let resized = image::imageops::resize(img, width, height, FilterType::Lanczos3);

    let input = Array::from_shape_fn(
        (1, height as usize, width as usize, 3),
        |(_, y, x, c)| resized.get_pixel(x as u32, y as u32)[c] as f32,
    );

    Ok(input)
}

pub fn preprocess(image_data: &[u8]) -> Result<Array<f32, Ix4>, PreprocessError> {
    let img = decode_rgb(image_data)?;
    to_input_tensor(&img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();
        image_data
    }

    #[test]
    fn test_target_dimensions() {
        assert_eq!(target_dimensions(600, 900), (300, 450));
        assert_eq!(target_dimensions(300, 300), (300, 300));
        assert_eq!(target_dimensions(1000, 333), (300, 99));
        assert_eq!(target_dimensions(5000, 1), (300, 1));
    }

    #[test]
    fn test_preprocess_keeps_aspect_ratio() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(600, 900, Rgb([255, 0, 0]));

        let input = preprocess(&encode_png(&img)).unwrap();

        assert_eq!(input.shape(), &[1, 450, 300, 3]);
    }

    #[test]
    fn test_pixels_are_not_normalized() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(100, 50, Rgb([255, 128, 0]));

        let input = to_input_tensor(&img).unwrap();

        assert_eq!(input.shape(), &[1, 150, 300, 3]);
        assert_eq!(input[[0, 75, 150, 0]], 255.0);
        assert_eq!(input[[0, 75, 150, 1]], 128.0);
        assert_eq!(input[[0, 75, 150, 2]], 0.0);
    }

    #[test]
    fn test_grayscale_is_converted_to_rgb() {
        let img = ImageBuffer::<image::Luma<u8>, Vec<u8>>::from_pixel(30, 30, image::Luma([7]));
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();

        let input = preprocess(&image_data).unwrap();

        assert_eq!(input.shape(), &[1, 300, 300, 3]);
        assert_eq!(input[[0, 10, 10, 2]], 7.0);
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let img = ImageBuffer::from_fn(40, 25, |x, y| Rgb([(x * 6) as u8, (y * 9) as u8, 42]));
        let image_data = encode_png(&img);

        assert_eq!(
            preprocess(&image_data).unwrap(),
            preprocess(&image_data).unwrap()
        );
    }

    #[test]
    fn test_tall_image_is_rejected_before_resizing() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(1, 2000, Rgb([9, 9, 9]));

        let result = to_input_tensor(&img);

        assert!(matches!(
            result,
            Err(PreprocessError::TooLarge {
                width: 1,
                height: 2000
            })
        ));
    }

    #[test]
    fn test_oversized_upload_fails_instead_of_allocating() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(1, 40000, Rgb([200, 10, 10]));

        let result = preprocess(&encode_png(&img));

        assert!(matches!(
            result,
            Err(PreprocessError::Decode(ImageError::Limits(_)))
        ));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let result = preprocess(b"definitely not an image");

        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }
}
