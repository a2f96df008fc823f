//! PNG snapshots of rendered surfaces, for debugging.

use std::io::Cursor;
use std::path::Path;

use genshi_renderer::Surface;
use image::{ImageFormat, RgbaImage};
use tracing::info;

use crate::error::{StudioError, StudioResult};

fn to_image(surface: &Surface) -> StudioResult<RgbaImage> {
    RgbaImage::from_raw(surface.width(), surface.height(), surface.to_rgba8()).ok_or_else(|| {
        StudioError::Config(format!(
            "surface buffer does not match {}x{}",
            surface.width(),
            surface.height()
        ))
    })
}

/// Encode a surface as PNG bytes.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_png(surface: &Surface) -> StudioResult<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    to_image(surface)?.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

/// Write a surface to `path` as PNG.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub fn write_png(surface: &Surface, path: &Path) -> StudioResult<()> {
    let bytes = encode_png(surface)?;
    std::fs::write(path, &bytes).map_err(|e| StudioError::io(path, e))?;
    info!(path = %path.display(), bytes = bytes.len(), "Snapshot written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use genshi_core::Color;

    use super::*;

    #[test]
    fn test_png_round_trips_pixels() {
        let mut surface = Surface::new(4, 3).unwrap();
        surface.fill(Color::rgb(10, 200, 30));
        let bytes = encode_png(&surface).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(2, 1).0, [10, 200, 30, 255]);
    }

    #[test]
    fn test_write_png_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let surface = Surface::new(8, 8).unwrap();
        write_png(&surface, &path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);

        let missing = dir.path().join("no-such-dir").join("frame.png");
        assert!(matches!(
            write_png(&surface, &missing),
            Err(StudioError::Io { .. })
        ));
    }
}
