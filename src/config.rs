//! Run configuration, loaded from TOML.
//!
//! ```toml
//! [index]
//! xdoc_seeds = "xdoc.tsv"
//! bound_uris = "bound.tsv"
//! string_replacements = ["argmap.tsv"]
//!
//! [coref]
//! scope = "document"
//! target_types = ["ic:Person"]
//!
//! [[coref.role_limits]]
//! roles = ["eru:teamInGame1", "eru:teamInGame2"]
//! max_distinct = 2
//! ```
//!
//! Relative table paths are resolved against the directory holding the config
//! file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::coref::{CorefScope, RoleLimit};
use crate::error::{ConfigError, ConfigResult};
use crate::xdoc::{CrossDocIndex, IndexResult};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolveConfig {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub coref: CorefConfig,
}

/// Table files the cross-document index is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// `id<TAB>TYPE<TAB>name1, name2` cluster seeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xdoc_seeds: Option<PathBuf>,
    /// `boundString<TAB>xdocId<TAB>boundUri` bindings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_uris: Option<PathBuf>,
    /// `[docid<TAB>]type<TAB>name<TAB>uri` string replacement tables.
    #[serde(default)]
    pub string_replacements: Vec<PathBuf>,
    /// Binary snapshot; when it exists it replaces the tables above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorefConfig {
    #[serde(default)]
    pub scope: CorefScope,
    /// Types to cluster; empty means every type.
    #[serde(default)]
    pub target_types: Vec<String>,
    #[serde(default)]
    pub role_limits: Vec<RoleLimit>,
}

impl ResolveConfig {
    /// Load from a TOML file, resolving relative table paths against its
    /// directory.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(base) = path.parent() {
            config.index.resolve_paths(base);
        }
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}

impl IndexConfig {
    fn resolve_paths(&mut self, base: &Path) {
        let paths = self
            .xdoc_seeds
            .iter_mut()
            .chain(self.bound_uris.iter_mut())
            .chain(self.snapshot.iter_mut())
            .chain(self.string_replacements.iter_mut());
        for p in paths {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }

    /// Build the index from the snapshot if one exists, else from the tables.
    pub fn build_index(&self) -> IndexResult<CrossDocIndex> {
        if let Some(snapshot) = self.snapshot.as_deref().filter(|p| p.exists()) {
            tracing::info!(path = %snapshot.display(), "loading index snapshot");
            return CrossDocIndex::load_snapshot(snapshot);
        }

        let index = CrossDocIndex::new();
        if let Some(seeds) = &self.xdoc_seeds {
            index.load_xdoc_seeds(seeds)?;
        }
        if let Some(bound) = &self.bound_uris {
            index.load_bound_uris(bound)?;
        }
        for table in &self.string_replacements {
            index.load_string_replacements(table)?;
        }
        Ok(index)
    }
}
