use crate::{
    error::{PipelineError, Result},
    models::StoredObject,
    stability::DecodedImage,
    storage::traits::ObjectStorage,
};
use chrono::NaiveDate;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::{Builder, NamedTempFile};

/// How the destination key of an upload is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStrategy {
    /// The scoped temp file's path, without the leading separator.
    TempPath,
    /// Today's date as `YYYY-MM-DD`.
    Date,
    /// Always the same key.
    Fixed(String),
}

impl KeyStrategy {
    pub fn resolve(&self, temp_path: &Path, today: NaiveDate) -> Result<String> {
        match self {
            KeyStrategy::TempPath => path_key(temp_path),
            KeyStrategy::Date => Ok(today.format("%Y-%m-%d").to_string()),
            KeyStrategy::Fixed(key) => Ok(key.clone()),
        }
    }
}

/// Joins the normal components of `path` with `/`. Object stores treat `.`
/// and `..` as literal names while URLs collapse them, so neither may reach a
/// key.
fn path_key(path: &Path) -> Result<String> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                return Err(PipelineError::StorageError(format!(
                    "temp path {} cannot be used as a key",
                    path.display()
                )))
            }
        }
    }

    if segments.is_empty() {
        return Err(PipelineError::StorageError(format!(
            "temp path {} cannot be used as a key",
            path.display()
        )));
    }
    Ok(segments.join("/"))
}

fn temp_file(dir: Option<&Path>, image: &DecodedImage) -> Result<NamedTempFile> {
    let suffix = format!(".{}", image.extension());
    let mut builder = Builder::new();
    builder.prefix("genimg-").suffix(&suffix);
    let file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    Ok(file)
}

/// Writes a decoded image to a scoped temp file and uploads it.
#[derive(Clone)]
pub struct Publisher {
    storage: Arc<dyn ObjectStorage>,
    temp_dir: Option<PathBuf>,
}

impl Publisher {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            storage,
            temp_dir: None,
        }
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// The temp file is removed on every path out of this function.
    pub async fn publish(
        &self,
        image: DecodedImage,
        strategy: &KeyStrategy,
        today: NaiveDate,
    ) -> Result<StoredObject> {
        let content_type = image.mime_type();
        let dir = self.temp_dir.clone();

        // Encoding is CPU-bound and the temp file is written synchronously.
        let temp = tokio::task::spawn_blocking(move || -> Result<NamedTempFile> {
            let mut temp = temp_file(dir.as_deref(), &image)?;
            {
                let mut writer = BufWriter::new(temp.as_file_mut());
                image.encode_into(&mut writer)?;
                writer.flush()?;
            }
            Ok(temp)
        })
        .await??;
        log::debug!("Encoded image to {}", temp.path().display());

        let uploaded = self.upload_file(temp.path(), strategy, today, content_type).await;

        if let Err(e) = temp.close() {
            log::warn!("Failed to remove temp file: {}", e);
        }

        uploaded.map_err(|e| match e {
            PipelineError::StorageError(_) => e,
            other => PipelineError::StorageError(other.to_string()),
        })
    }

    async fn upload_file(
        &self,
        path: &Path,
        strategy: &KeyStrategy,
        today: NaiveDate,
        content_type: &str,
    ) -> Result<StoredObject> {
        // A relative temp dir would otherwise leak `.` or `..` into the key.
        let path = tokio::fs::canonicalize(path).await?;
        let key = strategy.resolve(&path, today)?;
        let body = tokio::fs::read(&path).await?;

        log::info!(
            "Uploading {} bytes to {} under key {}",
            body.len(),
            self.storage.name(),
            key
        );
        self.storage.upload(&key, body, content_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stability::test_support::png_bytes;
    use crate::storage::memory::MemoryStorage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FailingStorage {
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStorage for FailingStorage {
        async fn upload(&self, key: &str, _body: Vec<u8>, _ct: &str) -> Result<StoredObject> {
            self.keys.lock().unwrap().push(key.to_string());
            Err(PipelineError::StorageError("bucket unavailable".into()))
        }

        fn public_url(&self, key: &str) -> String {
            format!("failing://{}", key)
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn count_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_key_strategies() {
        let path = Path::new("/tmp/genimg-abc.png");
        assert_eq!(
            KeyStrategy::TempPath.resolve(path, date()).unwrap(),
            "tmp/genimg-abc.png"
        );
        assert_eq!(KeyStrategy::Date.resolve(path, date()).unwrap(), "2024-05-01");
        assert_eq!(
            KeyStrategy::Fixed("latest.png".into())
                .resolve(path, date())
                .unwrap(),
            "latest.png"
        );
    }

    #[test]
    fn test_temp_path_key_has_no_dot_segments() {
        let key = KeyStrategy::TempPath
            .resolve(Path::new("./tmp/./genimg-x.png"), date())
            .unwrap();
        assert_eq!(key, "tmp/genimg-x.png");

        let err = KeyStrategy::TempPath
            .resolve(Path::new("../tmp/genimg-x.png"), date())
            .unwrap_err();
        assert!(matches!(err, PipelineError::StorageError(_)));
    }

    #[tokio::test]
    async fn test_relative_temp_dir_gives_absolute_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join("scratch");
        std::fs::create_dir(&nested).unwrap();
        // `<tmp>/scratch/..` names the same directory through a `..` segment.
        let storage = Arc::new(MemoryStorage::new("images"));
        let publisher = Publisher::new(storage.clone()).with_temp_dir(nested.join(".."));
        let image = DecodedImage::decode(&png_bytes([4, 4, 4])).unwrap();

        let stored = publisher
            .publish(image, &KeyStrategy::TempPath, date())
            .await
            .unwrap();

        assert!(!stored.key.split('/').any(|s| s == "." || s == ".."));
        assert!(stored.key.contains("genimg-"));
        assert_eq!(storage.keys().await, vec![stored.key]);
    }

    #[tokio::test]
    async fn test_publish_uploads_and_cleans_up() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(MemoryStorage::new("images"));
        let publisher = Publisher::new(storage.clone()).with_temp_dir(temp_dir.path());
        let image = DecodedImage::decode(&png_bytes([5, 5, 5])).unwrap();

        let stored = publisher
            .publish(image, &KeyStrategy::Date, date())
            .await
            .unwrap();

        assert_eq!(stored.key, "2024-05-01");
        assert_eq!(stored.public_url, "memory://images/2024-05-01");
        let object = storage.get("2024-05-01").await.unwrap();
        assert_eq!(object.content_type, "image/png");
        assert_eq!(
            DecodedImage::decode(&object.body).unwrap().image.to_rgb8().get_pixel(0, 0).0,
            [5, 5, 5]
        );
        assert_eq!(count_files(temp_dir.path()), 0);
    }

    #[tokio::test]
    async fn test_temp_path_key_names_the_temp_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(MemoryStorage::new("images"));
        let publisher = Publisher::new(storage.clone()).with_temp_dir(temp_dir.path());
        let image = DecodedImage::decode(&png_bytes([1, 1, 1])).unwrap();

        let stored = publisher
            .publish(image, &KeyStrategy::TempPath, date())
            .await
            .unwrap();

        assert!(stored.key.contains("genimg-"));
        assert!(stored.key.ends_with(".png"));
        assert!(!stored.key.starts_with('/'));
    }

    #[tokio::test]
    async fn test_temp_file_removed_when_upload_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FailingStorage {
            keys: Mutex::new(Vec::new()),
        });
        let publisher = Publisher::new(storage.clone()).with_temp_dir(temp_dir.path());
        let image = DecodedImage::decode(&png_bytes([2, 2, 2])).unwrap();

        let err = publisher
            .publish(image, &KeyStrategy::TempPath, date())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::StorageError(_)));
        assert_eq!(storage.keys.lock().unwrap().len(), 1);
        assert_eq!(count_files(temp_dir.path()), 0);
    }
}
