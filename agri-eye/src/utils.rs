//! Conversions between OpenCV matrices and `image` buffers

use crate::error::VisionError;
use image::RgbImage;
use opencv::core::{self, Mat, Scalar, Vector};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;

/// Convert a BGR frame to an owned RGB image for the model
pub fn mat_to_rgb_image(mat: &Mat) -> Result<RgbImage, VisionError> {
    if mat.empty() {
        return Err(VisionError::Processing("Cannot convert an empty frame".to_string()));
    }

    if mat.channels() != 3 {
        return Err(VisionError::Processing(format!(
            "Expected a 3-channel frame, got {} channels",
            mat.channels()
        )));
    }

    let mut rgb = Mat::default();
    imgproc::cvt_color(mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

    // ROI views are not contiguous
    let rgb = if rgb.is_continuous() { rgb } else { rgb.try_clone()? };

    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    let data = rgb.data_bytes()?.to_vec();

    RgbImage::from_raw(width, height, data)
        .ok_or_else(|| VisionError::Processing("Frame buffer size does not match dimensions".to_string()))
}

/// Build a BGR frame filled with one colour
pub fn solid_mat(width: i32, height: i32, bgr: (f64, f64, f64)) -> Result<Mat, VisionError> {
    if width <= 0 || height <= 0 {
        return Err(VisionError::Processing("Frame dimensions must be positive".to_string()));
    }

    let mat = Mat::new_rows_cols_with_default(
        height,
        width,
        core::CV_8UC3,
        Scalar::new(bgr.0, bgr.1, bgr.2, 0.0),
    )?;
    Ok(mat)
}

/// Encode a BGR frame as JPEG bytes
pub fn encode_jpeg(mat: &Mat, quality: i32) -> Result<Vec<u8>, VisionError> {
    let mut buffer = Vector::<u8>::new();
    let params = Vector::<i32>::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, quality.clamp(1, 100)]);

    if !imgcodecs::imencode(".jpg", mat, &mut buffer, &params)? {
        return Err(VisionError::Processing("JPEG encoding failed".to_string()));
    }

    Ok(buffer.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mat_to_rgb_swaps_channels() {
        // Pure red in BGR order
        let mat = solid_mat(4, 3, (0.0, 0.0, 255.0)).unwrap();
        let image = mat_to_rgb_image(&mat).unwrap();

        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(image.get_pixel(3, 2).0, [255, 0, 0]);
    }

    #[test]
    fn test_mat_to_rgb_rejects_empty() {
        let result = mat_to_rgb_image(&Mat::default());
        assert!(matches!(result, Err(VisionError::Processing(_))));
    }

    #[test]
    fn test_solid_mat_rejects_zero_size() {
        assert!(solid_mat(0, 10, (0.0, 0.0, 0.0)).is_err());
    }

    #[test]
    fn test_encode_jpeg_header() {
        let mat = solid_mat(32, 32, (0.0, 128.0, 0.0)).unwrap();
        let bytes = encode_jpeg(&mat, 80).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
