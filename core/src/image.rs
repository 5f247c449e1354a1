use crate::{Error, Result, Sample, SampleDepth, MAX_PIXELS};
use image::{DynamicImage, ImageBuffer, Luma};

/// Row-major single-channel image.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayImage<P: Sample> {
    width: u32,
    height: u32,
    data: Vec<P>,
}

impl<P: Sample> GrayImage<P> {
    pub fn from_vec(width: u32, height: u32, data: Vec<P>) -> Result<Self> {
        let pixels = checked_pixel_count(width, height)?;
        if data.len() != pixels {
            return Err(Error::DataLength {
                expected: pixels,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    /// Image filled with a single value.
    pub fn filled(width: u32, height: u32, value: P) -> Result<Self> {
        let pixels = checked_pixel_count(width, height)?;
        Ok(Self {
            width,
            height,
            data: vec![value; pixels],
        })
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> P) -> Result<Self> {
        let pixels = checked_pixel_count(width, height)?;
        let mut data = Vec::with_capacity(pixels);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> SampleDepth {
        P::DEPTH
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len()
    }

    pub fn get(&self, x: u32, y: u32) -> Option<P> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y as usize * self.width as usize + x as usize).copied()
    }

    pub fn as_slice(&self) -> &[P] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<P> {
        self.data
    }
}

fn checked_pixel_count(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(Error::ImageTooLarge {
            pixels,
            limit: MAX_PIXELS,
        });
    }
    Ok(pixels as usize)
}

/// Depth-tagged grayscale image, the unit of work for one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum DynGrayImage {
    Gray8(GrayImage<u8>),
    Gray16(GrayImage<u16>),
}

impl DynGrayImage {
    /// Build an image from raw little-endian samples and a bytes-per-sample tag.
    ///
    /// The depth tag is checked first, so an unsupported depth is reported
    /// even when the byte buffer is also malformed.
    pub fn from_raw(width: u32, height: u32, depth_tag: u8, bytes: &[u8]) -> Result<Self> {
        match SampleDepth::from_tag(depth_tag)? {
            SampleDepth::Eight => Ok(Self::Gray8(GrayImage::from_vec(width, height, bytes.to_vec())?)),
            SampleDepth::Sixteen => {
                if bytes.len() % 2 != 0 {
                    return Err(Error::DataLength {
                        expected: width as usize * height as usize * 2,
                        actual: bytes.len(),
                    });
                }
                let samples = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                Ok(Self::Gray16(GrayImage::from_vec(width, height, samples)?))
            }
        }
    }

    pub fn depth(&self) -> SampleDepth {
        match self {
            Self::Gray8(_) => SampleDepth::Eight,
            Self::Gray16(_) => SampleDepth::Sixteen,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Self::Gray8(img) => img.width(),
            Self::Gray16(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Gray8(img) => img.height(),
            Self::Gray16(img) => img.height(),
        }
    }

    pub fn pixel_count(&self) -> usize {
        match self {
            Self::Gray8(img) => img.pixel_count(),
            Self::Gray16(img) => img.pixel_count(),
        }
    }

    /// Sample at `(x, y)` widened to a level index.
    pub fn level_at(&self, x: u32, y: u32) -> Option<u32> {
        match self {
            Self::Gray8(img) => img.get(x, y).map(Sample::level),
            Self::Gray16(img) => img.get(x, y).map(Sample::level),
        }
    }

    /// All samples widened to level indices, row-major.
    pub fn levels(&self) -> Vec<u32> {
        match self {
            Self::Gray8(img) => img.as_slice().iter().map(|&p| p.level()).collect(),
            Self::Gray16(img) => img.as_slice().iter().map(|&p| p.level()).collect(),
        }
    }
}

impl From<GrayImage<u8>> for DynGrayImage {
    fn from(img: GrayImage<u8>) -> Self {
        Self::Gray8(img)
    }
}

impl From<GrayImage<u16>> for DynGrayImage {
    fn from(img: GrayImage<u16>) -> Self {
        Self::Gray16(img)
    }
}

impl TryFrom<&image::GrayImage> for GrayImage<u8> {
    type Error = Error;

    fn try_from(img: &image::GrayImage) -> Result<Self> {
        GrayImage::from_vec(img.width(), img.height(), img.as_raw().clone())
    }
}

impl TryFrom<&ImageBuffer<Luma<u16>, Vec<u16>>> for GrayImage<u16> {
    type Error = Error;

    fn try_from(img: &ImageBuffer<Luma<u16>, Vec<u16>>) -> Result<Self> {
        GrayImage::from_vec(img.width(), img.height(), img.as_raw().clone())
    }
}

impl TryFrom<&DynamicImage> for DynGrayImage {
    type Error = Error;

    fn try_from(img: &DynamicImage) -> Result<Self> {
        match img {
            DynamicImage::ImageLuma8(buf) => Ok(Self::Gray8(buf.try_into()?)),
            DynamicImage::ImageLuma16(buf) => Ok(Self::Gray16(buf.try_into()?)),
            other => Err(Error::UnsupportedColor(format!("{:?}", other.color()))),
        }
    }
}

impl From<DynGrayImage> for DynamicImage {
    fn from(img: DynGrayImage) -> Self {
        match img {
            DynGrayImage::Gray8(g) => {
                let (w, h) = (g.width(), g.height());
                // Dimensions and length were validated on construction.
                match image::GrayImage::from_raw(w, h, g.into_vec()) {
                    Some(buf) => DynamicImage::ImageLuma8(buf),
                    None => DynamicImage::new_luma8(w, h),
                }
            }
            DynGrayImage::Gray16(g) => {
                let (w, h) = (g.width(), g.height());
                match ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w, h, g.into_vec()) {
                    Some(buf) => DynamicImage::ImageLuma16(buf),
                    None => DynamicImage::new_luma16(w, h),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_image_rejects_bad_length() {
        let err = GrayImage::<u8>::from_vec(2, 2, vec![0; 3]).unwrap_err();
        assert_eq!(err, Error::DataLength { expected: 4, actual: 3 });
    }

    #[test]
    fn test_gray_image_rejects_zero_dims() {
        assert!(matches!(
            GrayImage::<u16>::filled(0, 4, 0),
            Err(Error::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_from_raw_16bit_little_endian() {
        let img = DynGrayImage::from_raw(2, 1, 2, &[0x34, 0x12, 0xff, 0xff]).unwrap();
        assert_eq!(img.depth(), SampleDepth::Sixteen);
        assert_eq!(img.level_at(0, 0), Some(0x1234));
        assert_eq!(img.level_at(1, 0), Some(0xffff));
    }

    #[test]
    fn test_from_raw_rejects_depth_before_length() {
        let err = DynGrayImage::from_raw(4, 4, 3, &[0; 1]).unwrap_err();
        assert_eq!(err, Error::UnsupportedDepth(3));
    }

    #[test]
    fn test_dynamic_image_color_rejected() {
        let rgb = DynamicImage::new_rgb8(4, 4);
        assert!(matches!(
            DynGrayImage::try_from(&rgb),
            Err(Error::UnsupportedColor(_))
        ));
    }

    #[test]
    fn test_dynamic_image_luma_roundtrip() {
        let mut buf = image::GrayImage::new(3, 2);
        buf.put_pixel(2, 1, Luma([200]));
        let dynamic = DynamicImage::ImageLuma8(buf.clone());

        let gray = DynGrayImage::try_from(&dynamic).unwrap();
        assert_eq!(gray.level_at(2, 1), Some(200));

        let back: DynamicImage = gray.into();
        assert_eq!(back.as_luma8().unwrap(), &buf);
    }
}
