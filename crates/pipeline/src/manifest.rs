//! Asset manifest: category-keyed catalog entries produced by the conversion tool.
//!
//! The manifest file is read-only here. `ManifestCache` re-reads it only when the
//! file's modification time changes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::result::PipelineError;

/// Asset category. Declaration order is the canonical selection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Rigs,
    Clothing,
    CageDeformers,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Rigs, Category::Clothing, Category::CageDeformers];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Rigs => "rigs",
            Category::Clothing => "clothing",
            Category::CageDeformers => "cage_deformers",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry and material statistics for one converted asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub file_size_mb: f64,
    #[serde(default)]
    pub total_vertices: u64,
    /// Triangle count.
    #[serde(default)]
    pub total_faces: u64,
    #[serde(default)]
    pub mesh_count: u64,
    #[serde(default)]
    pub node_count: u64,
    /// `-1` when the converter could not count joints.
    #[serde(default)]
    pub real_joint_count: i64,
    #[serde(default)]
    pub material_count: u64,
    #[serde(default)]
    pub texture_count: u64,
    #[serde(default)]
    pub total_gpu_memory_kb: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl CatalogEntry {
    pub fn triangles(&self) -> u64 {
        self.total_faces
    }

    /// Joint count with the "unknown" sentinel mapped to zero.
    pub fn joints(&self) -> u64 {
        self.real_joint_count.max(0) as u64
    }
}

/// Parsed manifest, one list per category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub rigs: Vec<CatalogEntry>,
    #[serde(default)]
    pub clothing: Vec<CatalogEntry>,
    #[serde(default)]
    pub cage_deformers: Vec<CatalogEntry>,
}

impl Manifest {
    pub fn entries(&self, category: Category) -> &[CatalogEntry] {
        match category {
            Category::Rigs => &self.rigs,
            Category::Clothing => &self.clothing,
            Category::CageDeformers => &self.cage_deformers,
        }
    }

    pub fn len(&self) -> usize {
        Category::ALL.iter().map(|c| self.entries(*c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct Cached {
    modified: SystemTime,
    manifest: Arc<Manifest>,
}

/// Manifest loader that keeps the last parse until the file changes.
#[derive(Debug)]
pub struct ManifestCache {
    path: PathBuf,
    cached: Mutex<Option<Cached>>,
}

impl ManifestCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the manifest, re-reading the file if its mtime changed.
    pub async fn load(&self) -> Result<Arc<Manifest>, PipelineError> {
        let meta = tokio::fs::metadata(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::ManifestMissing(self.path.clone())
            } else {
                PipelineError::ManifestRead {
                    path: self.path.clone(),
                    source: e,
                }
            }
        })?;
        let modified = meta.modified().map_err(|e| PipelineError::ManifestRead {
            path: self.path.clone(),
            source: e,
        })?;

        if let Some(hit) = self.cached_if_fresh(modified) {
            debug!(path = %self.path.display(), "manifest cache hit");
            return Ok(hit);
        }

        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| PipelineError::ManifestRead {
                path: self.path.clone(),
                source: e,
            })?;
        let manifest: Manifest =
            serde_json::from_slice(&bytes).map_err(|e| PipelineError::ManifestParse {
                path: self.path.clone(),
                source: e,
            })?;
        let manifest = Arc::new(manifest);

        info!(
            path = %self.path.display(),
            entries = manifest.len(),
            "manifest loaded"
        );

        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(Cached {
            modified,
            manifest: manifest.clone(),
        });
        Ok(manifest)
    }

    fn cached_if_fresh(&self, modified: SystemTime) -> Option<Arc<Manifest>> {
        let cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        cached
            .as_ref()
            .filter(|c| c.modified == modified)
            .map(|c| c.manifest.clone())
    }
}
