//! Image inputs accepted by the client.
//!
//! Bitmaps are converted to RGBA pixels on the host, so the worker only
//! ever receives raw pixel data.

use std::path::Path;

use image::{DynamicImage, RgbaImage};
use ocr_worker::ImageData;

use crate::error::ClientError;

#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Already-decoded RGBA pixels.
    Pixels(ImageData),
    /// A decoded image in any pixel format.
    Bitmap(DynamicImage),
}

impl ImageSource {
    /// Decode an image file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        Ok(ImageSource::Bitmap(image::open(path)?))
    }

    pub fn into_image_data(self) -> Result<ImageData, ClientError> {
        match self {
            ImageSource::Pixels(data) => Ok(data),
            ImageSource::Bitmap(bitmap) => rgba_to_image_data(bitmap.to_rgba8()),
        }
    }
}

fn rgba_to_image_data(rgba: RgbaImage) -> Result<ImageData, ClientError> {
    let (width, height) = rgba.dimensions();
    let width = i32::try_from(width)
        .map_err(|_| ClientError::InvalidImage(format!("width {} is too large", width)))?;
    let height = i32::try_from(height)
        .map_err(|_| ClientError::InvalidImage(format!("height {} is too large", height)))?;
    Ok(ImageData::new(rgba.into_raw(), width, height))
}

impl From<ImageData> for ImageSource {
    fn from(data: ImageData) -> Self {
        ImageSource::Pixels(data)
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(image: DynamicImage) -> Self {
        ImageSource::Bitmap(image)
    }
}

impl From<RgbaImage> for ImageSource {
    fn from(image: RgbaImage) -> Self {
        ImageSource::Bitmap(DynamicImage::ImageRgba8(image))
    }
}
