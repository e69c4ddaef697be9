//! Image preprocessing: file -> 784 INT8 activations.
//!
//! Accepts binary PGM (P5, 8-bit, `#` comments allowed in the header) or
//! a headerless 784-byte raw dump. Non-28x28 PGMs are nearest-neighbor
//! resized. Pixels map `[0, 255] -> [0, 127]` as `p * 127 / 255`, matching
//! the training-time `ToTensor() * 127` quantization.

use crate::error::{ModelError, Result};
use crate::model::MNIST_PIXELS;
use std::path::Path;
use tracing::debug;

const SIDE: usize = 28;

/// A quantized 28x28 input image.
#[derive(Debug, Clone)]
pub struct Activations784 {
    /// Row-major quantized pixels in [0, 127].
    pub pixels: [i8; MNIST_PIXELS],
    /// Source image width before any resize.
    pub source_width: usize,
    /// Source image height before any resize.
    pub source_height: usize,
    /// True if the source was not 28x28 and got resized.
    pub resized: bool,
}

/// Load and quantize one image file.
///
/// # Errors
///
/// [`ModelError::Io`] if the file cannot be read;
/// [`ModelError::MalformedInput`] for anything that is neither a valid
/// 8-bit P5 PGM nor exactly 784 raw bytes.
pub fn preprocess(path: &Path) -> Result<Activations784> {
    let bytes = std::fs::read(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.starts_with(b"P5") {
        return parse_pgm(path, &bytes);
    }

    // Headerless fallback: exactly one 28x28 frame of raw bytes.
    if bytes.len() == MNIST_PIXELS {
        let mut pixels = [0i8; MNIST_PIXELS];
        for (dst, &src) in pixels.iter_mut().zip(&bytes) {
            *dst = quantize_pixel(src);
        }
        debug!("{}: raw 784-byte image", path.display());
        return Ok(Activations784 {
            pixels,
            source_width: SIDE,
            source_height: SIDE,
            resized: false,
        });
    }

    Err(ModelError::malformed(
        path,
        format!("not a P5 PGM and not {MNIST_PIXELS} raw bytes ({} bytes)", bytes.len()),
    ))
}

/// `[0, 255] -> [0, 127]`, integer arithmetic like the trained model.
#[allow(clippy::cast_possible_truncation)]
fn quantize_pixel(p: u8) -> i8 {
    (u32::from(p) * 127 / 255) as i8
}

fn parse_pgm(path: &Path, bytes: &[u8]) -> Result<Activations784> {
    let mut cursor = 2; // past "P5"
    let width = read_header_int(path, bytes, &mut cursor)?;
    let height = read_header_int(path, bytes, &mut cursor)?;
    let maxval = read_header_int(path, bytes, &mut cursor)?;

    if width == 0 || height == 0 {
        return Err(ModelError::malformed(path, format!("degenerate size {width}x{height}")));
    }
    if maxval == 0 || maxval > 255 {
        return Err(ModelError::malformed(
            path,
            format!("maxval {maxval} (only 8-bit PGM supported)"),
        ));
    }

    // Exactly one whitespace byte separates the header from the raster.
    cursor += 1;
    let raster = bytes
        .get(cursor..cursor + width * height)
        .ok_or_else(|| ModelError::malformed(path, "truncated raster"))?;

    let (gray, resized) = if (width, height) == (SIDE, SIDE) {
        (raster.to_vec(), false)
    } else {
        debug!("{}: resizing {width}x{height} -> {SIDE}x{SIDE}", path.display());
        (resize_nearest(raster, width, height), true)
    };

    let mut pixels = [0i8; MNIST_PIXELS];
    for (dst, &src) in pixels.iter_mut().zip(&gray) {
        *dst = quantize_pixel(src);
    }
    Ok(Activations784 {
        pixels,
        source_width: width,
        source_height: height,
        resized,
    })
}

/// Read one ASCII integer, skipping whitespace and `#` comment lines.
fn read_header_int(path: &Path, bytes: &[u8], cursor: &mut usize) -> Result<usize> {
    loop {
        match bytes.get(*cursor) {
            Some(b) if b.is_ascii_whitespace() => *cursor += 1,
            Some(b'#') => {
                while !matches!(bytes.get(*cursor), None | Some(b'\n')) {
                    *cursor += 1;
                }
            }
            Some(b) if b.is_ascii_digit() => break,
            _ => return Err(ModelError::malformed(path, "truncated or malformed header")),
        }
    }

    let mut value = 0usize;
    while let Some(b) = bytes.get(*cursor) {
        if !b.is_ascii_digit() {
            break;
        }
        value = value
            .saturating_mul(10)
            .saturating_add(usize::from(b - b'0'));
        *cursor += 1;
    }
    Ok(value)
}

fn resize_nearest(src: &[u8], src_w: usize, src_h: usize) -> Vec<u8> {
    let mut out = vec![0u8; MNIST_PIXELS];
    for y in 0..SIDE {
        for x in 0..SIDE {
            let sx = x * src_w / SIDE;
            let sy = y * src_h / SIDE;
            out[y * SIDE + x] = src[sy * src_w + sx];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn write_file(content: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f
    }

    fn pgm(w: usize, h: usize, pixels: &[u8]) -> Vec<u8> {
        let mut v = format!("P5\n{w} {h}\n255\n").into_bytes();
        v.extend_from_slice(pixels);
        v
    }

    #[test]
    fn pixel_quantization_matches_training() {
        assert_eq!(quantize_pixel(0), 0);
        assert_eq!(quantize_pixel(255), 127);
        assert_eq!(quantize_pixel(128), 63); // 128*127/255 truncates
        assert_eq!(quantize_pixel(2), 0);
    }

    #[test]
    fn parses_28x28_pgm() {
        let mut raster = vec![0u8; 784];
        raster[0] = 255;
        raster[783] = 128;
        let f = write_file(&pgm(28, 28, &raster));

        let img = preprocess(f.path()).unwrap();
        assert!(!img.resized);
        assert_eq!(img.pixels[0], 127);
        assert_eq!(img.pixels[783], 63);
        assert_eq!(img.pixels[1], 0);
    }

    #[test]
    fn skips_header_comments() {
        let mut v = b"P5\n# scanner model X\n28 28\n# second comment\n255\n".to_vec();
        v.extend_from_slice(&[200u8; 784]);
        let f = write_file(&v);

        let img = preprocess(f.path()).unwrap();
        assert_eq!(img.pixels[0], 99); // 200*127/255
    }

    #[test]
    fn resizes_non_mnist_sizes() {
        // 14x14 all-255 upscales to 28x28 all-255.
        let f = write_file(&pgm(14, 14, &[255u8; 196]));
        let img = preprocess(f.path()).unwrap();
        assert!(img.resized);
        assert_eq!((img.source_width, img.source_height), (14, 14));
        assert!(img.pixels.iter().all(|&p| p == 127));
    }

    #[test]
    fn raw_784_byte_fallback() {
        let f = write_file(&[255u8; 784]);
        let img = preprocess(f.path()).unwrap();
        assert!(!img.resized);
        assert!(img.pixels.iter().all(|&p| p == 127));
    }

    #[test]
    fn rejects_garbage() {
        let f = write_file(b"JFIF not a pgm");
        assert!(matches!(
            preprocess(f.path()).unwrap_err(),
            ModelError::MalformedInput { .. }
        ));

        // Truncated raster
        let f = write_file(&pgm(28, 28, &[0u8; 100]));
        assert!(matches!(
            preprocess(f.path()).unwrap_err(),
            ModelError::MalformedInput { .. }
        ));

        // 16-bit PGM
        let mut v = b"P5\n28 28\n65535\n".to_vec();
        v.extend_from_slice(&[0u8; 1568]);
        let f = write_file(&v);
        assert!(matches!(
            preprocess(f.path()).unwrap_err(),
            ModelError::MalformedInput { .. }
        ));
    }
}
