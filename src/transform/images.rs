use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::error::TaskError;
use crate::io::write_file;
use crate::task::{Selector, Source, Task, TaskContext, TaskResult};

const JPEG_QUALITY: u8 = 80;

/// Raster images below `img/`, relative to `img/`.
pub fn image_selector() -> Result<Selector, glob::PatternError> {
    Ok(Selector::new(["img/**/*.jpg", "img/**/*.png"])?.base("img"))
}

/// Encodes every selected image in parallel, then writes the results. Nothing
/// is written when any image fails.
fn convert<F>(ctx: &TaskContext, ext: Option<&str>, encode: F) -> TaskResult
where
    F: Fn(&Source, &[u8]) -> Result<Vec<u8>, TaskError> + Sync,
{
    let sources = image_selector()?.resolve(&ctx.config.source)?;

    let encoded = sources
        .par_iter()
        .map(|source| {
            let buffer = fs::read(&source.path).map_err(|e| TaskError::io(&source.path, e))?;
            let data = encode(source, &buffer)?;

            let rel = match ext {
                Some(ext) => source.rel.with_extension(ext),
                None => source.rel.clone(),
            };

            Ok((ctx.config.output_path(Utf8Path::new("img").join(rel)), data))
        })
        .collect::<Result<Vec<(Utf8PathBuf, Vec<u8>)>, TaskError>>()?;

    let mut written = Vec::with_capacity(encoded.len());
    for (path, data) in encoded {
        write_file(&path, data)?;
        written.push(path);
    }

    Ok(written)
}

fn optimize_image(path: &Utf8Path, buffer: &[u8]) -> Result<Vec<u8>, TaskError> {
    let format = image::guess_format(buffer).map_err(|e| TaskError::transform(path, e))?;
    let img = image::load_from_memory_with_format(buffer, format)
        .map_err(|e| TaskError::transform(path, e))?;
    let (w, h) = (img.width(), img.height());

    let mut out = Vec::new();
    let result = match format {
        ImageFormat::Jpeg => {
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).write_image(
                rgb.as_raw(),
                w,
                h,
                ExtendedColorType::Rgb8,
            )
        }
        ImageFormat::Png => {
            PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive)
                .write_image(img.as_bytes(), w, h, img.color().into())
        }
        _ => return Ok(buffer.to_vec()),
    };
    result.map_err(|e| TaskError::transform(path, e))?;

    // Re-encoding can grow an already optimized file.
    if out.len() < buffer.len() {
        Ok(out)
    } else {
        Ok(buffer.to_vec())
    }
}

fn encode_webp(path: &Utf8Path, buffer: &[u8]) -> Result<Vec<u8>, TaskError> {
    let img = image::load_from_memory(buffer).map_err(|e| TaskError::transform(path, e))?;
    let (w, h) = (img.width(), img.height());

    let mut out = Vec::new();
    let encoder = WebPEncoder::new_lossless(&mut out);

    encoder
        .encode(&img.to_rgba8(), w, h, ExtendedColorType::Rgba8)
        .map_err(|e| TaskError::transform(path, e))?;

    Ok(out)
}

/// Recompresses JPEG and PNG images for deployment.
pub struct OptimizeImages;

impl Task for OptimizeImages {
    fn name(&self) -> &str {
        "images:optimize"
    }

    fn execute(&self, ctx: &TaskContext) -> TaskResult {
        convert(ctx, None, |source, buffer| optimize_image(&source.path, buffer))
    }
}

/// Writes a lossless WebP next to every raster image.
pub struct Webp;

impl Task for Webp {
    fn name(&self) -> &str {
        "webp"
    }

    fn execute(&self, ctx: &TaskContext) -> TaskResult {
        convert(ctx, Some("webp"), |source, buffer| encode_webp(&source.path, buffer))
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::Config;
    use crate::task::Mode;

    fn setup(dir: &tempfile::TempDir) -> Config {
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let config = Config {
            source: root.join("source"),
            output: root.join("build"),
            ..Config::default()
        };

        let img = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 128]));
        let photo = config.source_path("img/photo.jpg");
        let icon = config.source_path("img/icons/dot.png");
        fs::create_dir_all(icon.parent().unwrap()).unwrap();
        img.save(&photo).unwrap();
        img.save(&icon).unwrap();

        config
    }

    #[test]
    fn test_optimize_keeps_layout_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(&dir);
        let ctx = TaskContext {
            config: &config,
            mode: Mode::Build,
        };

        let written = OptimizeImages.execute(&ctx).unwrap();
        assert_eq!(written.len(), 2);

        let photo = fs::read(config.output_path("img/photo.jpg")).unwrap();
        assert_eq!(image::guess_format(&photo).unwrap(), ImageFormat::Jpeg);

        let icon = fs::read(config.output_path("img/icons/dot.png")).unwrap();
        let original = fs::read(config.source_path("img/icons/dot.png")).unwrap();
        assert_eq!(image::guess_format(&icon).unwrap(), ImageFormat::Png);
        assert!(icon.len() <= original.len());
    }

    #[test]
    fn test_webp_next_to_image() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(&dir);
        let ctx = TaskContext {
            config: &config,
            mode: Mode::Build,
        };

        Webp.execute(&ctx).unwrap();

        let webp = fs::read(config.output_path("img/photo.webp")).unwrap();
        assert_eq!(image::guess_format(&webp).unwrap(), ImageFormat::WebP);
        assert!(config.output_path("img/icons/dot.webp").exists());
    }

    #[test]
    fn test_broken_image_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(&dir);
        fs::write(config.source_path("img/broken.png"), b"not a png").unwrap();
        let ctx = TaskContext {
            config: &config,
            mode: Mode::Build,
        };

        let err = Webp.execute(&ctx).unwrap_err();
        assert!(err.to_string().contains("broken.png"), "{err}");
        assert!(!config.output_path("img").exists());
    }
}
