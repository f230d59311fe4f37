//! A local-filesystem `CatalogHandler`.
//!
//! Each run gets a subdirectory of `catalog_root` named after its `run_id`.
//! `get` copies matching files from that directory into the compute data
//! folder; `put` copies the other way. The catalog module itself wasn't part
//! of the retrieved source set; this follows the `FileSystemCatalog` name and
//! get/put-by-glob-pattern shape `executor.py`'s `sync_catalog` assumes of
//! its catalog handler, adapted to `tokio::fs` + `glob` with a SHA256
//! content hash for bookkeeping.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::CatalogError;
use crate::handler::CatalogHandler;
use crate::item::CatalogItem;

/// Catalog backed by a directory tree on the local filesystem.
pub struct FileSystemCatalog {
    catalog_root: PathBuf,
    compute_data_folder: String,
}

impl FileSystemCatalog {
    pub fn new(catalog_root: impl Into<PathBuf>, compute_data_folder: impl Into<String>) -> Self {
        Self {
            catalog_root: catalog_root.into(),
            compute_data_folder: compute_data_folder.into(),
        }
    }

    fn run_catalog_dir(&self, run_id: &str) -> PathBuf {
        self.catalog_root.join(run_id)
    }

    async fn copy_matching(
        source_dir: &Path,
        dest_dir: &Path,
        pattern: &str,
        stage: graph::Stage,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        tokio::fs::create_dir_all(dest_dir).await?;
        tokio::fs::create_dir_all(source_dir).await?;

        let glob_pattern = source_dir.join(pattern);
        let glob_pattern = glob_pattern.to_string_lossy().into_owned();

        let mut items = Vec::new();
        for entry in glob::glob(&glob_pattern)
            .map_err(|e| CatalogError::Pattern(glob_pattern.clone(), e))?
        {
            let path = entry.map_err(|e| CatalogError::Io(e.into_error()))?;
            if !path.is_file() {
                continue;
            }
            let file_name = path
                .file_name()
                .expect("glob match always has a file name")
                .to_owned();

            let contents = tokio::fs::read(&path).await?;
            let mut hasher = Sha256::new();
            hasher.update(&contents);
            let content_hash = format!("{:x}", hasher.finalize());

            let destination = dest_dir.join(&file_name);
            tokio::fs::write(&destination, &contents).await?;

            items.push(CatalogItem {
                name: file_name.to_string_lossy().into_owned(),
                content_hash,
                stage,
            });
        }

        Ok(items)
    }
}

#[async_trait]
impl CatalogHandler for FileSystemCatalog {
    fn compute_data_folder(&self) -> &str {
        &self.compute_data_folder
    }

    async fn get(
        &self,
        name: &str,
        run_id: &str,
        compute_data_folder: &str,
        _synced_catalogs: Option<&[CatalogItem]>,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        info!("catalog get: run_id={run_id} pattern={name}");
        Self::copy_matching(
            &self.run_catalog_dir(run_id),
            Path::new(compute_data_folder),
            name,
            graph::Stage::Get,
        )
        .await
    }

    async fn put(
        &self,
        name: &str,
        run_id: &str,
        compute_data_folder: &str,
        _synced_catalogs: Option<&[CatalogItem]>,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        info!("catalog put: run_id={run_id} pattern={name}");
        Self::copy_matching(
            Path::new(compute_data_folder),
            &self.run_catalog_dir(run_id),
            name,
            graph::Stage::Put,
        )
        .await
    }

    async fn sync_between_runs(
        &self,
        previous_run_id: &str,
        run_id: &str,
    ) -> Result<(), CatalogError> {
        let source = self.run_catalog_dir(previous_run_id);
        let dest = self.run_catalog_dir(run_id);
        if !source.exists() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&dest).await?;

        let mut entries = tokio::fs::read_dir(&source).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                let dest_path = dest.join(entry.file_name());
                tokio::fs::copy(entry.path(), dest_path).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips_a_file() {
        let tmp = tempdir();
        let catalog_root = tmp.join("catalog");
        let compute = tmp.join("compute");
        tokio::fs::create_dir_all(&compute).await.unwrap();
        tokio::fs::write(compute.join("out.txt"), b"hello").await.unwrap();

        let handler = FileSystemCatalog::new(&catalog_root, compute.to_string_lossy());
        let put_items = handler
            .put("*.txt", "run-1", &compute.to_string_lossy(), None)
            .await
            .unwrap();
        assert_eq!(put_items.len(), 1);
        assert_eq!(put_items[0].stage, graph::Stage::Put);

        let fresh_compute = tmp.join("compute2");
        let get_items = handler
            .get("*.txt", "run-1", &fresh_compute.to_string_lossy(), None)
            .await
            .unwrap();
        assert_eq!(get_items.len(), 1);
        assert_eq!(get_items[0].content_hash, put_items[0].content_hash);

        tokio::fs::remove_dir_all(&tmp).await.ok();
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("catalog-test-{}", std::process::id()));
        dir.push(uuid_like());
        dir
    }

    fn uuid_like() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("{nanos}")
    }
}
