use log::*;
use ofvis::prelude::v1::*;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Frame source reading the image files of a directory in name order.
#[derive(Clone, Debug)]
pub struct ImageSequence {
    files: Vec<PathBuf>,
    pos: usize,
    dimensions: Option<(usize, usize)>,
}

impl ImageSequence {
    /// Collect the image files of a directory.
    ///
    /// Files with other extensions are skipped. A directory without a single image is
    /// `SourceUnavailable`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        let unavailable =
            |reason: String| FlowError::SourceUnavailable(format!("{}: {reason}", dir.display()));

        let mut files = std::fs::read_dir(dir)
            .map_err(|e| unavailable(e.to_string()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect::<Vec<_>>();

        if files.is_empty() {
            return Err(unavailable("no image files".into()).into());
        }

        files.sort();

        let dimensions = image::image_dimensions(&files[0])
            .ok()
            .map(|(w, h)| (w as usize, h as usize));

        debug!("{} images in {}", files.len(), dir.display());

        Ok(Self {
            files,
            pos: 0,
            dimensions,
        })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequence {
    fn read(&mut self) -> Result<Option<Frame>> {
        let path = match self.files.get(self.pos) {
            Some(path) => path,
            None => return Ok(None),
        };

        let decode = || -> Result<Frame> {
            let img = image::io::Reader::open(path)?
                .with_guessed_format()?
                .decode()?;
            Ok(img.to_rgb8())
        };

        let frame = decode().map_err(|e| anyhow!("cannot decode {}: {e}", path.display()))?;

        self.pos += 1;

        Ok(Some(frame))
    }

    fn seek_to_start(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn dimensions(&self) -> Option<(usize, usize)> {
        self.dimensions
    }

    fn frame_count(&self) -> Option<usize> {
        Some(self.files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "frame-loader-{name}-{}",
                std::process::id()
            ));
            let _ = std::fs::remove_dir_all(&dir);
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn reads_in_name_order() {
        let dir = TempDir::new("order");

        for (name, shade) in [("b.png", 20), ("a.png", 10), ("c.PNG", 30)] {
            Frame::from_pixel(6, 4, Rgb([shade, shade, shade]))
                .save_with_format(dir.0.join(name), image::ImageFormat::Png)
                .unwrap();
        }
        std::fs::write(dir.0.join("notes.txt"), "not a frame").unwrap();

        let mut seq = ImageSequence::open(&dir.0).unwrap();
        assert_eq!(seq.frame_count(), Some(3));
        assert_eq!(seq.dimensions(), Some((6, 4)));

        let shades = std::iter::from_fn(|| seq.read().unwrap())
            .map(|f| f.get_pixel(0, 0)[0])
            .collect::<Vec<_>>();
        assert_eq!(shades, vec![10, 20, 30]);

        seq.seek_to_start().unwrap();
        assert_eq!(seq.read().unwrap().unwrap().get_pixel(0, 0)[0], 10);
    }

    #[test]
    fn directory_without_images() {
        let dir = TempDir::new("empty");
        std::fs::write(dir.0.join("readme.md"), "nothing").unwrap();

        let err = ImageSequence::open(&dir.0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn directory_source_through_loader() {
        let dir = TempDir::new("loader");

        for i in 0..2 {
            Frame::from_pixel(5, 5, Rgb([0, i * 100, 0]))
                .save(dir.0.join(format!("{i:03}.png")))
                .unwrap();
        }

        let mut source = crate::create_source(dir.0.to_str().unwrap()).unwrap();
        assert_eq!(source.frame_count(), Some(2));
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_none());
    }
}
