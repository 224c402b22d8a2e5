//! Artifact store: generated images on disk under timestamped names.

use chrono::Utc;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ARTIFACT_PREFIX: &str = "meme_";
const ARTIFACT_EXT: &str = "png";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("output directory {}: {source}", .dir.display())]
    Directory { dir: PathBuf, source: std::io::Error },
    #[error("encode failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A persisted artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub filename: String,
    pub path: PathBuf,
}

pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) the output directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|source| StoreError::Directory { dir: dir.clone(), source })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `image` as PNG under a fresh `meme_<unix-millis>.png` name.
    ///
    /// The file is encoded to a hidden temp name and renamed into place, so a
    /// reader never sees a partial artifact.
    pub fn save(&self, image: &RgbImage) -> Result<Artifact, StoreError> {
        let filename = self.fresh_name(Utc::now().timestamp_millis());
        let path = self.dir.join(&filename);
        let tmp = self.dir.join(format!(".{filename}.tmp"));

        if let Err(e) = image.save_with_format(&tmp, image::ImageFormat::Png) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        publish(&tmp, &path)?;

        tracing::info!(path = %path.display(), "artifact saved");
        Ok(Artifact { filename, path })
    }

    /// Resolve a bare artifact filename inside the store.
    ///
    /// Anything that is not a plain `meme_*.png` name is rejected, which keeps
    /// lookups inside the store directory.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        is_artifact_name(filename).then(|| self.dir.join(filename))
    }

    fn fresh_name(&self, millis: i64) -> String {
        let base = format!("{ARTIFACT_PREFIX}{millis}");
        let mut name = format!("{base}.{ARTIFACT_EXT}");
        let mut n = 1;
        while self.dir.join(&name).exists() {
            name = format!("{base}_{n}.{ARTIFACT_EXT}");
            n += 1;
        }
        name
    }
}

/// Rename a finished temp file into place, removing it if the rename fails.
fn publish(tmp: &Path, path: &Path) -> Result<(), StoreError> {
    std::fs::rename(tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(tmp);
        StoreError::Io(e)
    })
}

pub fn is_artifact_name(name: &str) -> bool {
    name.starts_with(ARTIFACT_PREFIX)
        && name.ends_with(&format!(".{ARTIFACT_EXT}"))
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_save_writes_png_with_same_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("static/output")).unwrap();
        let img = RgbImage::from_pixel(33, 21, Rgb([1, 2, 3]));

        let artifact = store.save(&img).unwrap();
        assert!(is_artifact_name(&artifact.filename), "{}", artifact.filename);
        let back = image::open(&artifact.path).unwrap().to_rgb8();
        assert_eq!(back.dimensions(), (33, 21));
        assert_eq!(back.get_pixel(3, 3), &Rgb([1, 2, 3]));

        // No temp files left behind.
        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![artifact.filename]);
    }

    #[test]
    fn test_failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join(".meme_1.png.tmp");
        std::fs::write(&tmp, b"png").unwrap();
        // A non-empty directory at the destination makes the rename fail.
        let dest = dir.path().join("meme_1.png");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("keep"), b"x").unwrap();

        assert!(matches!(publish(&tmp, &dest), Err(StoreError::Io(_))));
        assert!(!tmp.exists());
        assert!(dest.join("keep").exists());
    }

    #[test]
    fn test_fresh_name_avoids_collision() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("meme_42.png"), b"x").unwrap();
        std::fs::write(dir.path().join("meme_42_1.png"), b"x").unwrap();
        assert_eq!(store.fresh_name(42), "meme_42_2.png");
        assert_eq!(store.fresh_name(43), "meme_43.png");
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        assert!(store.resolve("meme_1.png").is_some());
        assert!(store.resolve("../meme_1.png").is_none());
        assert!(store.resolve("meme_..png").is_none());
        assert!(store.resolve("meme_1.png/../../etc/passwd").is_none());
        assert!(store.resolve("secret.png").is_none());
    }
}
