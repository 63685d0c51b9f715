//! Inline notification image handling.
//!
//! Raw pixel payloads arrive with arbitrary rowstride and with or without
//! an alpha channel. Everything is normalized to tight RGBA and downscaled
//! to fit within the maximum card image dimensions, preserving aspect
//! ratio.

use std::path::Path;

use fast_image_resize as fr;

use crate::error::DecodeError;

/// Maximum width for cached notification images in pixels
pub const MAX_IMAGE_WIDTH: u32 = 128;

/// Maximum height for cached notification images in pixels
pub const MAX_IMAGE_HEIGHT: u32 = 128;

/// Raw image payload as delivered in the `image-data` hint
/// (`iiibiiay`: width, height, rowstride, has_alpha, bits_per_sample,
/// channels, data).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: i32,
    pub height: i32,
    pub rowstride: i32,
    pub has_alpha: bool,
    pub bits_per_sample: i32,
    pub channels: i32,
    pub data: Vec<u8>,
}

impl ImageData {
    /// Normalize to tight RGBA rows.
    ///
    /// Handles rowstride padding and adds an opaque alpha channel to RGB
    /// payloads. After this, `rowstride == width * 4` and `channels == 4`.
    pub fn into_rgba(self) -> Result<ImageData, DecodeError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(DecodeError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        let channels = if self.has_alpha { 4usize } else { 3usize };
        if self.channels != channels as i32 {
            return Err(DecodeError::UnsupportedChannels(self.channels));
        }

        let width = self.width as usize;
        let height = self.height as usize;
        let rowstride = self.rowstride.max(0) as usize;
        if rowstride < width * channels {
            return Err(DecodeError::Truncated {
                expected: width * channels,
                actual: rowstride,
            });
        }
        // The final row may omit stride padding
        let expected = rowstride * (height - 1) + width * channels;
        if self.data.len() < expected {
            return Err(DecodeError::Truncated {
                expected,
                actual: self.data.len(),
            });
        }

        let mut rgba = Vec::with_capacity(width * height * 4);
        for y in 0..height {
            let row = &self.data[y * rowstride..y * rowstride + width * channels];
            if self.has_alpha {
                rgba.extend_from_slice(row);
            } else {
                for pixel in row.chunks_exact(3) {
                    rgba.extend_from_slice(pixel);
                    rgba.push(255);
                }
            }
        }

        Ok(ImageData {
            width: self.width,
            height: self.height,
            rowstride: self.width * 4,
            has_alpha: true,
            bits_per_sample: 8,
            channels: 4,
            data: rgba,
        })
    }
}

#[cfg(feature = "zbus_notifications")]
impl TryFrom<zbus::zvariant::Structure<'_>> for ImageData {
    type Error = zbus::zvariant::Error;

    fn try_from(value: zbus::zvariant::Structure<'_>) -> Result<Self, Self::Error> {
        let mut fields = value.into_fields().into_iter();
        let mut next = || fields.next().ok_or(zbus::zvariant::Error::IncorrectType);

        Ok(ImageData {
            width: i32::try_from(next()?)?,
            height: i32::try_from(next()?)?,
            rowstride: i32::try_from(next()?)?,
            has_alpha: bool::try_from(next()?)?,
            bits_per_sample: i32::try_from(next()?)?,
            channels: i32::try_from(next()?)?,
            data: Vec::<u8>::try_from(next()?)?,
        })
    }
}

/// RGBA image ready to be persisted and displayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ProcessedImage {
    /// Build from tight RGBA data, downscaling if the image exceeds the
    /// maximum dimensions.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidDimensions {
                width: width as i32,
                height: height as i32,
            });
        }
        let expected = (width * height * 4) as usize;
        if data.len() < expected {
            return Err(DecodeError::Truncated {
                expected,
                actual: data.len(),
            });
        }

        let (width, height, data) = resize_if_needed(width, height, data)?;
        Ok(ProcessedImage {
            data,
            width,
            height,
        })
    }

    /// Load and process an image file (the `image-path` hint).
    pub fn from_path(path: &Path) -> Result<Self, DecodeError> {
        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = (rgba.width(), rgba.height());
        Self::from_rgba(width, height, rgba.into_raw())
    }
}

/// Downscale to fit within the maximum dimensions, preserving aspect
/// ratio. Uses Lanczos3 with alpha premultiplication.
fn resize_if_needed(
    width: u32,
    height: u32,
    data: Vec<u8>,
) -> Result<(u32, u32, Vec<u8>), DecodeError> {
    if width <= MAX_IMAGE_WIDTH && height <= MAX_IMAGE_HEIGHT {
        return Ok((width, height, data));
    }

    let aspect_ratio = width as f32 / height as f32;
    let (new_width, new_height) = if width > height {
        let new_width = MAX_IMAGE_WIDTH;
        let new_height = (new_width as f32 / aspect_ratio) as u32;
        (new_width, new_height.max(1))
    } else {
        let new_height = MAX_IMAGE_HEIGHT;
        let new_width = (new_height as f32 * aspect_ratio) as u32;
        (new_width.max(1), new_height)
    };

    let mut src = fr::images::Image::from_vec_u8(width, height, data, fr::PixelType::U8x4)
        .map_err(|err| DecodeError::Resize(err.to_string()))?;
    let mut dst = fr::images::Image::new(new_width, new_height, fr::PixelType::U8x4);

    fr::MulDiv::default()
        .multiply_alpha_inplace(&mut src)
        .map_err(|err| DecodeError::Resize(err.to_string()))?;

    let mut resizer = fr::Resizer::new();
    let resize_options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));
    resizer
        .resize(&src, &mut dst, Some(&resize_options))
        .map_err(|err| DecodeError::Resize(err.to_string()))?;

    fr::MulDiv::default()
        .divide_alpha_inplace(&mut dst)
        .map_err(|err| DecodeError::Resize(err.to_string()))?;

    Ok((new_width, new_height, dst.into_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(width: i32, height: i32, channels: i32, fill: u8) -> ImageData {
        ImageData {
            width,
            height,
            rowstride: width * channels,
            has_alpha: channels == 4,
            bits_per_sample: 8,
            channels,
            data: vec![fill; (width.max(0) * height.max(0) * channels) as usize],
        }
    }

    #[test]
    fn test_resize_large_image() {
        let rgba = raw(256, 256, 4, 255).into_rgba().unwrap();
        let processed =
            ProcessedImage::from_rgba(rgba.width as u32, rgba.height as u32, rgba.data).unwrap();

        // Square image stays square at the maximum size
        assert_eq!(processed.width, MAX_IMAGE_WIDTH);
        assert_eq!(processed.height, MAX_IMAGE_HEIGHT);
        assert_eq!(
            processed.data.len(),
            (processed.width * processed.height * 4) as usize
        );
    }

    #[test]
    fn test_aspect_ratio_preservation() {
        let rgba = raw(200, 100, 4, 128).into_rgba().unwrap();
        let processed =
            ProcessedImage::from_rgba(rgba.width as u32, rgba.height as u32, rgba.data).unwrap();

        assert_eq!(processed.width, MAX_IMAGE_WIDTH);
        assert_eq!(processed.height, MAX_IMAGE_HEIGHT / 2);
    }

    #[test]
    fn test_small_image_not_resized() {
        let rgba = raw(32, 32, 4, 10).into_rgba().unwrap();
        let processed =
            ProcessedImage::from_rgba(rgba.width as u32, rgba.height as u32, rgba.data).unwrap();

        assert_eq!(processed.width, 32);
        assert_eq!(processed.height, 32);
    }

    #[test]
    fn test_rgb_to_rgba_conversion() {
        let rgba = raw(4, 4, 3, 200).into_rgba().unwrap();

        assert_eq!(rgba.channels, 4);
        assert_eq!(rgba.data.len(), 4 * 4 * 4);
        for pixel in rgba.data.chunks_exact(4) {
            assert_eq!(pixel, &[200, 200, 200, 255]);
        }
    }

    #[test]
    fn test_rowstride_padding_stripped() {
        // 2x2 RGB rows padded to 8 bytes each
        let data = vec![
            1, 2, 3, 4, 5, 6, 0, 0, // row 0 + padding
            7, 8, 9, 10, 11, 12, 0, 0, // row 1 + padding
        ];
        let image = ImageData {
            width: 2,
            height: 2,
            rowstride: 8,
            has_alpha: false,
            bits_per_sample: 8,
            channels: 3,
            data,
        };

        let rgba = image.into_rgba().unwrap();
        assert_eq!(
            rgba.data,
            vec![1, 2, 3, 255, 4, 5, 6, 255, 7, 8, 9, 255, 10, 11, 12, 255]
        );
    }

    #[test]
    fn test_invalid_dimensions_rejected() {
        let image = raw(0, 4, 4, 0);
        assert!(matches!(
            image.into_rgba(),
            Err(DecodeError::InvalidDimensions { .. })
        ));

        let image = raw(4, -1, 4, 0);
        assert!(matches!(
            image.into_rgba(),
            Err(DecodeError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_truncated_data_rejected() {
        let mut image = raw(8, 8, 4, 0);
        image.data.truncate(16);
        assert!(matches!(
            image.into_rgba(),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
