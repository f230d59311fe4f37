//! Descriptor for a single file synced between the compute data folder and
//! the catalog, attached to a step log after a `get`/`put`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    pub content_hash: String,
    pub stage: graph::Stage,
}
