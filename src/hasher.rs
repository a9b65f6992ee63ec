//! Content and perceptual fingerprints

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use sha2::{Digest, Sha256};
use std::fmt;

/// Perceptual hash edge length; 8x8 = 64 bits.
const HASH_SIZE: u32 = 8;

/// SHA-256 of a file's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

/// Mean (average) image hash; visually similar images are a small
/// Hamming distance apart.
#[derive(Clone, PartialEq, Eq)]
pub struct PerceptualHash(ImageHash);

impl PerceptualHash {
    /// Hamming distance in bits.
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        self.0.dist(&other.0)
    }

    /// Width of the hash in bits.
    pub fn bits(&self) -> u32 {
        (self.0.as_bytes().len() * 8) as u32
    }
}

impl fmt::Debug for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PerceptualHash({})", self.0.to_base64())
    }
}

pub fn hash_content(bytes: &[u8]) -> ContentHash {
    ContentHash(Sha256::digest(bytes).into())
}

/// Fails with [`ErrorKind::UnsupportedFormat`] when the bytes are not a
/// decodable image; callers skip perceptual matching for that file.
pub fn hash_perceptual(image_bytes: &[u8]) -> Result<PerceptualHash> {
    let image = image::load_from_memory(image_bytes).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::UnsupportedFormat,
            format!("not a decodable image: {}", e),
            e,
        )
    })?;

    let hasher = HasherConfig::new()
        .hash_size(HASH_SIZE, HASH_SIZE)
        .hash_alg(HashAlg::Mean)
        .to_hasher();

    Ok(PerceptualHash(hasher.hash_image(&image)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes(image: RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn horizontal_gradient() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, _| {
            let v = (x * 4) as u8;
            image::Rgb([v, v, v])
        })
    }

    fn vertical_gradient() -> RgbImage {
        RgbImage::from_fn(64, 64, |_, y| {
            let v = (y * 4) as u8;
            image::Rgb([v, v, v])
        })
    }

    #[test]
    fn test_content_hash_known_value() {
        assert_eq!(
            hash_content(b"hello").to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_content_hash_differs() {
        assert_ne!(hash_content(b"a"), hash_content(b"b"));
        assert_eq!(hash_content(b"a"), hash_content(b"a"));
    }

    #[test]
    fn test_identical_images_zero_distance() {
        let a = hash_perceptual(&png_bytes(horizontal_gradient())).unwrap();
        let b = hash_perceptual(&png_bytes(horizontal_gradient())).unwrap();
        assert_eq!(a.bits(), 64);
        assert_eq!(a.distance(&b), 0);
    }

    #[test]
    fn test_different_images_far_apart() {
        let a = hash_perceptual(&png_bytes(horizontal_gradient())).unwrap();
        let b = hash_perceptual(&png_bytes(vertical_gradient())).unwrap();
        assert!(a.distance(&b) > 0);
    }

    #[test]
    fn test_unsupported_format() {
        let err = hash_perceptual(b"definitely not an image").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::UnsupportedFormat));
    }
}
