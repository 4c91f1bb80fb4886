//! Loading and saving the index's flat tables.
//!
//! Three tab-delimited formats are read; `#` starts a comment line:
//!
//! - xdoc seeds: `id<TAB>TYPE<TAB>name1, name2, ...`
//! - bound URIs: `boundString<TAB>xdocId<TAB>boundUri` (`NONE` means unbound)
//! - string replacements: `[docid<TAB>]type<TAB>name<TAB>uri`
//!
//! A binary snapshot of the whole index can be written with bincode.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::class::EntityClass;
use super::error::{IndexError, IndexResult};
use super::index::{BoundEntry, ClusterTables, CrossDocIndex, IdCounters};
use crate::identifier::ClusterId;
use crate::literal::normalize_name;

fn read_table(path: &Path) -> IndexResult<String> {
    std::fs::read_to_string(path).map_err(|e| IndexError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn write_table(path: &Path, content: &str) -> IndexResult<()> {
    std::fs::write(path, content).map_err(|e| IndexError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Non-comment, non-empty lines split on tabs, with 1-based line numbers.
fn table_rows(content: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| (n, line.split('\t').map(str::trim).collect()))
}

#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    tables: ClusterTables,
    counters: IdCounters,
    bound: Vec<(ClusterId, BoundEntry)>,
    doc_replacements: Vec<((String, String), HashMap<String, String>)>,
    type_replacements: Vec<(String, HashMap<String, String>)>,
}

impl CrossDocIndex {
    /// Load an xdoc seed file. Returns the number of clusters read.
    pub fn load_xdoc_seeds(&self, path: &Path) -> IndexResult<usize> {
        let content = read_table(path)?;
        self.parse_xdoc_seeds(&content, &path.display().to_string())
    }

    /// Parse xdoc seed lines. Lines with the wrong column count or a
    /// non-numeric id are skipped with a warning; a table with no valid line
    /// is an error. A name listed for two compatible clusters stays with the
    /// first.
    pub fn parse_xdoc_seeds(&self, content: &str, origin: &str) -> IndexResult<usize> {
        let mut tables = self.clusters.write().map_err(|_| IndexError::LockPoisoned)?;
        let mut counters = self.counters.lock().map_err(|_| IndexError::LockPoisoned)?;
        let mut loaded = 0;

        for (line_no, cols) in table_rows(content) {
            if cols.len() != 3 {
                tracing::warn!(origin, line_no, "skipping xdoc seed line without 3 columns");
                continue;
            }
            let Ok(raw_id) = cols[0].parse::<u64>() else {
                tracing::warn!(origin, line_no, id = cols[0], "skipping xdoc seed line with bad id");
                continue;
            };
            let cluster = ClusterId(raw_id);
            let class = EntityClass::from_label(cols[1]).unwrap_or_else(|| EntityClass::from_type(cols[1]));

            for name in cols[2].split(',').map(normalize_name).filter(|n| !n.is_empty()) {
                let taken = tables.by_name.get(&name).and_then(|ids| {
                    ids.iter().copied().find(|id| {
                        *id != cluster
                            && tables
                                .entries
                                .get(id)
                                .is_some_and(|e| e.class.is_compatible(class))
                    })
                });
                if let Some(existing) = taken {
                    tracing::warn!(origin, line_no, %name, %existing, %cluster, "duplicate seed name, keeping first cluster");
                    continue;
                }
                tables.add_name(cluster, class, &name);
            }
            counters.observe_seed(raw_id);
            loaded += 1;
        }

        if loaded == 0 {
            return Err(IndexError::NoValidLines {
                path: origin.to_string(),
            });
        }
        tracing::info!(origin, clusters = loaded, "loaded xdoc seeds");
        Ok(loaded)
    }

    /// Load a bound-URI table. Returns the number of bindings read.
    pub fn load_bound_uris(&self, path: &Path) -> IndexResult<usize> {
        let content = read_table(path)?;
        Ok(self.parse_bound_uris(&content, &path.display().to_string()))
    }

    /// Parse bound-URI lines; `NONE` URIs and malformed lines are skipped.
    pub fn parse_bound_uris(&self, content: &str, origin: &str) -> usize {
        let mut loaded = 0;
        for (line_no, cols) in table_rows(content) {
            if cols.len() != 3 {
                tracing::warn!(origin, line_no, "skipping bound uri line without 3 columns");
                continue;
            }
            let Ok(raw_id) = cols[1].parse::<u64>() else {
                tracing::warn!(origin, line_no, id = cols[1], "skipping bound uri line with bad id");
                continue;
            };
            if cols[2] == "NONE" || cols[2].is_empty() {
                continue;
            }
            self.bind_cluster(ClusterId(raw_id), cols[0], cols[2]);
            loaded += 1;
        }
        tracing::info!(origin, bindings = loaded, "loaded bound uris");
        loaded
    }

    /// Load a string-replacement table. Returns the number of rows read.
    pub fn load_string_replacements(&self, path: &Path) -> IndexResult<usize> {
        let content = read_table(path)?;
        self.parse_string_replacements(&content, &path.display().to_string())
    }

    /// Parse string-replacement lines. Four columns scope the row to a
    /// document; three columns apply to every document.
    pub fn parse_string_replacements(&self, content: &str, origin: &str) -> IndexResult<usize> {
        let mut loaded = 0;
        for (line_no, cols) in table_rows(content) {
            match cols.as_slice() {
                [doc_id, type_uri, name, uri] => {
                    self.add_string_replacement(Some(doc_id), type_uri, name, uri)
                }
                [type_uri, name, uri] => self.add_string_replacement(None, type_uri, name, uri),
                _ => {
                    tracing::warn!(origin, line_no, "skipping bad string replacement line");
                    continue;
                }
            }
            loaded += 1;
        }
        if loaded == 0 {
            return Err(IndexError::NoValidLines {
                path: origin.to_string(),
            });
        }
        tracing::info!(origin, rows = loaded, "loaded string replacements");
        Ok(loaded)
    }

    /// Render clusters in seed-file format, ordered by id.
    pub fn render_xdoc_seeds(&self) -> IndexResult<String> {
        let tables = self.clusters.read().map_err(|_| IndexError::LockPoisoned)?;
        let mut out = String::new();
        for (id, entry) in &tables.entries {
            let names: Vec<&str> = entry.names.iter().map(String::as_str).collect();
            out.push_str(&format!("{id}\t{}\t{}\n", entry.class.label(), names.join(", ")));
        }
        Ok(out)
    }

    pub fn save_xdoc_seeds(&self, path: &Path) -> IndexResult<()> {
        write_table(path, &self.render_xdoc_seeds()?)
    }

    /// Write the bound-URI table, ordered by cluster id.
    pub fn save_bound_uris(&self, path: &Path) -> IndexResult<()> {
        let mut rows: Vec<(ClusterId, BoundEntry)> = self
            .bound
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        let content: String = rows
            .iter()
            .map(|(id, e)| format!("{}\t{id}\t{}\n", e.label, e.uri))
            .collect();
        write_table(path, &content)
    }

    /// Write a bincode snapshot of every table and both counters.
    pub fn save_snapshot(&self, path: &Path) -> IndexResult<()> {
        let snapshot = IndexSnapshot {
            tables: self
                .clusters
                .read()
                .map_err(|_| IndexError::LockPoisoned)?
                .clone(),
            counters: *self.counters.lock().map_err(|_| IndexError::LockPoisoned)?,
            bound: self
                .bound
                .iter()
                .map(|e| (*e.key(), e.value().clone()))
                .collect(),
            doc_replacements: self
                .doc_replacements
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            type_replacements: self
                .type_replacements
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        };
        let bytes = bincode::serialize(&snapshot).map_err(|e| IndexError::Snapshot {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, bytes).map_err(|e| IndexError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Restore an index from a snapshot written by [`save_snapshot`](Self::save_snapshot).
    pub fn load_snapshot(path: &Path) -> IndexResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| IndexError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let snapshot: IndexSnapshot =
            bincode::deserialize(&bytes).map_err(|e| IndexError::Snapshot {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            clusters: RwLock::new(snapshot.tables),
            counters: Mutex::new(snapshot.counters),
            bound: snapshot.bound.into_iter().collect::<DashMap<_, _>>(),
            doc_replacements: snapshot.doc_replacements.into_iter().collect::<DashMap<_, _>>(),
            type_replacements: snapshot.type_replacements.into_iter().collect::<DashMap<_, _>>(),
        })
    }
}
