//! Raster image codec
//!
//! [`ImageCodec`] implementation backed by the `image` crate. Crops are
//! re-encoded as PNG so any decodable input produces a valid crop.

use crate::types::{CodecError, ImageCodec, ImageDimensions, Region};
use image::{ImageFormat, ImageReader};
use std::io::Cursor;

/// Decodes JPEG, PNG and WebP uploads
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCodec;

impl RasterCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ImageCodec for RasterCodec {
    fn metadata(&self, image: &[u8]) -> Result<ImageDimensions, CodecError> {
        let (width, height) = ImageReader::new(Cursor::new(image))
            .with_guessed_format()
            .map_err(|e| CodecError::Decode(e.to_string()))?
            .into_dimensions()
            .map_err(|e| CodecError::Decode(e.to_string()))?;

        Ok(ImageDimensions { width, height })
    }

    fn crop(&self, image: &[u8], region: &Region) -> Result<Vec<u8>, CodecError> {
        let decoded =
            image::load_from_memory(image).map_err(|e| CodecError::Decode(e.to_string()))?;

        let dimensions = ImageDimensions {
            width: decoded.width(),
            height: decoded.height(),
        };
        if region.is_empty() || !region.fits_within(dimensions) {
            return Err(CodecError::InvalidGeometry {
                region: *region,
                width: dimensions.width,
                height: dimensions.height,
            });
        }

        let cropped = decoded.crop_imm(region.left, region.top, region.width, region.height);

        let mut encoded = Cursor::new(Vec::new());
        cropped
            .write_to(&mut encoded, ImageFormat::Png)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(encoded.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, 128]);
        }
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_metadata_reads_dimensions() {
        let dims = RasterCodec::new().metadata(&png(80, 60)).unwrap();
        assert_eq!(
            dims,
            ImageDimensions {
                width: 80,
                height: 60
            }
        );
    }

    #[test]
    fn test_metadata_rejects_garbage() {
        let err = RasterCodec::new().metadata(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn test_crop_produces_region_sized_png() {
        let codec = RasterCodec::new();
        let region = Region {
            left: 10,
            top: 5,
            width: 30,
            height: 20,
        };

        let crop = codec.crop(&png(80, 60), &region).unwrap();
        let dims = codec.metadata(&crop).unwrap();
        assert_eq!(
            dims,
            ImageDimensions {
                width: 30,
                height: 20
            }
        );

        let decoded = image::load_from_memory(&crop).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([10, 5, 128]));
    }

    #[test]
    fn test_crop_rejects_out_of_bounds() {
        let region = Region {
            left: 70,
            top: 0,
            width: 20,
            height: 10,
        };
        let err = RasterCodec::new().crop(&png(80, 60), &region).unwrap_err();
        assert!(matches!(err, CodecError::InvalidGeometry { width: 80, height: 60, .. }));
    }

    #[test]
    fn test_crop_rejects_empty_region() {
        let region = Region {
            left: 0,
            top: 0,
            width: 0,
            height: 10,
        };
        assert!(RasterCodec::new().crop(&png(8, 8), &region).is_err());
    }
}
