//! Writers persisting traced images.

use crate::TraceError;
use base::buffer::RenderBuffer;
use chrono::{DateTime, Local};
use ddsfile::{AlphaMode, D3D10ResourceDimension, Dds, DxgiFormat, NewDxgiParams};
use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

/// Map name used when the world doesn't report one.
pub const UNKNOWN_MAP_NAME: &str = "UnknownMap";

/// Destination of finished offline traces.
pub trait OutputWriter: Send + Sync {
    /// Writes a single image.
    fn write_image(&self, buffer: &RenderBuffer, path: &Path) -> Result<(), TraceError>;

    /// Writes the six faces of a cube map, ordered +X, -X, +Y, -Y, +Z, -Z.
    fn write_cubemap(&self, faces: &[RenderBuffer], path: &Path) -> Result<(), TraceError>;
}

/// Writes PNG images and DDS cube maps to the file system.
#[derive(Debug, Copy, Clone, Default)]
pub struct FileOutputWriter;

fn create_parent_dir(path: &Path) -> Result<(), TraceError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(std::fs::create_dir_all(parent)?),
        _ => Ok(()),
    }
}

impl OutputWriter for FileOutputWriter {
    fn write_image(&self, buffer: &RenderBuffer, path: &Path) -> Result<(), TraceError> {
        create_parent_dir(path)?;
        let image = image::RgbaImage::from_raw(buffer.width(), buffer.height(), buffer.as_bytes().to_vec())
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "pixel data doesn't match the image size")
            })?;
        image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    fn write_cubemap(&self, faces: &[RenderBuffer], path: &Path) -> Result<(), TraceError> {
        if faces.len() != 6 {
            return Err(TraceError::InvalidCubemap(format!("expected 6 faces, got {}", faces.len())));
        }
        let size = faces[0].dimensions();
        if size.x != size.y || size.x == 0 {
            return Err(TraceError::InvalidCubemap(format!(
                "faces must be square and non-empty, got {}x{}",
                size.x, size.y
            )));
        }
        if let Some(face) = faces.iter().position(|face| face.dimensions() != size) {
            return Err(TraceError::InvalidCubemap(format!("face {} doesn't match the size of face 0", face)));
        }

        let mut dds = Dds::new_dxgi(NewDxgiParams {
            height: size.y,
            width: size.x,
            depth: None,
            format: DxgiFormat::R8G8B8A8_UNorm_sRGB,
            mipmap_levels: Some(1),
            array_layers: Some(1),
            caps2: None,
            is_cubemap: true,
            resource_dimension: D3D10ResourceDimension::Texture2D,
            alpha_mode: AlphaMode::Unknown,
        })?;
        dds.data = faces.iter().flat_map(|face| face.as_bytes().iter().copied()).collect();

        create_parent_dir(path)?;
        let mut writer = BufWriter::new(File::create(path)?);
        dds.write(&mut writer)?;
        Ok(())
    }
}

/// Reduces a map path such as `/Game/Maps/Arena` to its last segment,
/// falling back to [`UNKNOWN_MAP_NAME`].
pub fn map_stem(map_name: Option<&str>) -> String {
    map_name
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(UNKNOWN_MAP_NAME)
        .to_string()
}

/// Builds `<dir>/<stem>-<YYYYmmdd-HHMMSS>.<ext>`.
pub fn timestamped_path(dir: &Path, stem: &str, ext: &str, time: &DateTime<Local>) -> PathBuf {
    dir.join(format!("{}-{}.{}", stem, time.format("%Y%m%d-%H%M%S"), ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::{color::Rgba8, math::UVec2};
    use chrono::TimeZone;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("colvis-output-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn filled(size: u32, colour: Rgba8) -> RenderBuffer {
        RenderBuffer::from_pixels(UVec2::splat(size), vec![colour; (size * size) as usize]).unwrap()
    }

    #[test]
    fn map_stem_keeps_last_segment() {
        assert_eq!(map_stem(Some("/Game/Maps/Arena")), "Arena");
        assert_eq!(map_stem(Some("Arena")), "Arena");
        assert_eq!(map_stem(Some("/Game/Maps/")), UNKNOWN_MAP_NAME);
        assert_eq!(map_stem(Some("")), UNKNOWN_MAP_NAME);
        assert_eq!(map_stem(None), UNKNOWN_MAP_NAME);
    }

    #[test]
    fn timestamped_path_format() {
        let time = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let path = timestamped_path(Path::new("out"), "Arena_cubemap", "dds", &time);
        assert_eq!(path, Path::new("out").join("Arena_cubemap-20240309-070501.dds"));
    }

    #[test]
    fn png_round_trips_pixels() {
        let dir = scratch_dir("png");
        let path = dir.join("nested").join("image.png");
        let mut buffer = filled(4, Rgba8::opaque(10, 20, 30));
        buffer.pixels_mut()[5] = Rgba8::new(200, 100, 50, 255);
        FileOutputWriter.write_image(&buffer, &path).unwrap();

        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (4, 4));
        assert_eq!(image.get_pixel(1, 1).0, [200, 100, 50, 255]);
        assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30, 255]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn cubemap_is_written_as_dds() {
        let dir = scratch_dir("dds");
        let path = dir.join("cube.dds");
        let faces: Vec<_> = (0..6).map(|i| filled(8, Rgba8::opaque(i * 40, 0, 0))).collect();
        FileOutputWriter.write_cubemap(&faces, &path).unwrap();

        let dds = Dds::read(&mut File::open(&path).unwrap()).unwrap();
        assert_eq!(dds.get_width(), 8);
        assert_eq!(dds.get_height(), 8);
        assert_eq!(dds.get_dxgi_format(), Some(DxgiFormat::R8G8B8A8_UNorm_sRGB));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn malformed_cubemaps_are_rejected() {
        let path = scratch_dir("bad").join("cube.dds");
        let five: Vec<_> = (0..5).map(|_| filled(8, Rgba8::BLACK)).collect();
        assert!(matches!(
            FileOutputWriter.write_cubemap(&five, &path),
            Err(TraceError::InvalidCubemap(_))
        ));

        let mut mixed: Vec<_> = (0..6).map(|_| filled(8, Rgba8::BLACK)).collect();
        mixed[3] = filled(4, Rgba8::BLACK);
        assert!(matches!(
            FileOutputWriter.write_cubemap(&mixed, &path),
            Err(TraceError::InvalidCubemap(_))
        ));

        let flat = vec![RenderBuffer::new(UVec2::new(8, 4)); 6];
        assert!(matches!(
            FileOutputWriter.write_cubemap(&flat, &path),
            Err(TraceError::InvalidCubemap(_))
        ));
        assert!(!path.exists());
    }
}
