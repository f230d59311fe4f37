//! `CatalogHandler` — the provider contract §6 specifies for moving named
//! files between a per-run catalog and the local compute data folder.

use async_trait::async_trait;

use crate::error::CatalogError;
use crate::item::CatalogItem;

/// Moves artifacts between a run's catalog and the local compute data
/// folder. Implementations are the "concrete Catalog backend" the core
/// treats as an external collaborator (§1) — the executor only ever talks
/// to this trait.
#[async_trait]
pub trait CatalogHandler: Send + Sync {
    /// Default compute data folder, used when a node's own catalog
    /// settings do not override it.
    fn compute_data_folder(&self) -> &str;

    /// Copy every file matching `name` (a glob pattern) from the catalog
    /// for `run_id` into `compute_data_folder`, returning one
    /// [`CatalogItem`] per copied file.
    async fn get(
        &self,
        name: &str,
        run_id: &str,
        compute_data_folder: &str,
        synced_catalogs: Option<&[CatalogItem]>,
    ) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Copy every file matching `name` (a glob pattern) from
    /// `compute_data_folder` into the catalog for `run_id`, returning one
    /// [`CatalogItem`] per copied file.
    async fn put(
        &self,
        name: &str,
        run_id: &str,
        compute_data_folder: &str,
        synced_catalogs: Option<&[CatalogItem]>,
    ) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Mirror the catalog contents of `previous_run_id` into `run_id`,
    /// used when a run is started with `use_cached=true`.
    async fn sync_between_runs(
        &self,
        previous_run_id: &str,
        run_id: &str,
    ) -> Result<(), CatalogError>;
}
