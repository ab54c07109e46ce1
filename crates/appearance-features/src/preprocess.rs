//! Frame to backbone input tensor

use emotion_fusion_common::{ProcessingError, Result};
use emotion_fusion_decoder::{Frame, PixelFormat};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;

/// ImageNet channel statistics the backbone was trained with
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Wrap a packed RGB24 frame as an image buffer
pub fn frame_to_rgb(frame: Frame) -> Result<RgbImage> {
    if frame.format != PixelFormat::Rgb24 {
        return Err(ProcessingError::ImageError(format!(
            "Expected an RGB24 frame, got {:?}",
            frame.format
        )));
    }
    let (width, height) = (frame.width, frame.height);
    RgbImage::from_raw(width, height, frame.data).ok_or_else(|| {
        ProcessingError::ImageError(format!("Frame buffer does not match {width}x{height} RGB"))
    })
}

/// Resize to `size`x`size` (bilinear) and normalise into an NCHW `[1, 3, size, size]` tensor
#[must_use]
pub fn to_input_tensor(img: &RgbImage, size: u32) -> Array4<f32> {
    let resized = if img.dimensions() == (size, size) {
        img.clone()
    } else {
        image::imageops::resize(img, size, size, FilterType::Triangle)
    };

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (f32::from(pixel[c]) / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    tensor
}
