//! 32-bit word packing for device transfers.
//!
//! Compute programs address storage as arrays of `u32`, so samples travel
//! packed little-endian: four 8-bit or two 16-bit samples per word, with the
//! first sample in the lowest bits and the tail word zero padded.

use crate::{DynGrayImage, GrayImage, Result, Sample};

pub fn pack_samples<P: Sample>(samples: &[P]) -> Vec<u32> {
    let per_word = P::DEPTH.samples_per_word();
    let bits = P::DEPTH.bits();
    samples
        .chunks(per_word)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u32, |word, (i, s)| word | (s.level() << (i as u32 * bits)))
        })
        .collect()
}

/// Inverse of [`pack_samples`]; `pixels` trims the padding of the last word.
pub fn unpack_samples<P: Sample>(words: &[u32], pixels: usize) -> Vec<P> {
    let per_word = P::DEPTH.samples_per_word();
    let bits = P::DEPTH.bits();
    let mask = P::DEPTH.max_level();
    words
        .iter()
        .flat_map(|&word| (0..per_word).map(move |i| P::from_level((word >> (i as u32 * bits)) & mask)))
        .take(pixels)
        .collect()
}

impl DynGrayImage {
    pub fn to_words(&self) -> Vec<u32> {
        match self {
            DynGrayImage::Gray8(img) => pack_samples(img.as_slice()),
            DynGrayImage::Gray16(img) => pack_samples(img.as_slice()),
        }
    }

    /// Rebuild an image of the same geometry and depth from packed words.
    pub fn with_words(&self, words: &[u32]) -> Result<DynGrayImage> {
        let pixels = self.pixel_count();
        Ok(match self {
            DynGrayImage::Gray8(img) => DynGrayImage::Gray8(GrayImage::from_vec(
                img.width(),
                img.height(),
                unpack_samples(words, pixels),
            )?),
            DynGrayImage::Gray16(img) => DynGrayImage::Gray16(GrayImage::from_vec(
                img.width(),
                img.height(),
                unpack_samples(words, pixels),
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_u8_layout() {
        let words = pack_samples(&[0x01u8, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(words, vec![0x0403_0201, 0x0000_0005]);
    }

    #[test]
    fn test_pack_u16_layout() {
        let words = pack_samples(&[0xBEEFu16, 0xDEAD, 0x0001]);
        assert_eq!(words, vec![0xDEAD_BEEF, 0x0000_0001]);
    }

    #[test]
    fn test_unpack_trims_padding() {
        let samples: Vec<u8> = unpack_samples(&[0x0403_0201, 0x0000_0005], 5);
        assert_eq!(samples, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_with_words_keeps_geometry() {
        let img = DynGrayImage::from(GrayImage::<u16>::filled(3, 1, 7).unwrap());
        let words = img.to_words();
        let rebuilt = img.with_words(&words).unwrap();
        assert_eq!(rebuilt, img);
    }
}
