//! Collection of the textured mesh from the toolchain cache.
//!
//! The cache layout belongs to the toolchain and can change between
//! releases, so nothing here is allowed to fail a run. Every problem is
//! reported as a [`CollectionOutcome`] warning.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::models::{Artifact, ArtifactKind, WorkLayout};

/// Result of an artifact collection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionOutcome {
    /// Files copied into the final directory.
    Collected {
        source_dir: PathBuf,
        artifacts: Vec<Artifact>,
    },
    /// No texturing output to collect.
    NotFound {
        /// Directory that was searched.
        searched: PathBuf,
        /// Stage graph saved by the toolchain, for manual inspection.
        graph_file: PathBuf,
    },
    /// Some files could not be copied. Copies that succeeded are kept.
    CopyFailed {
        source_dir: PathBuf,
        artifacts: Vec<Artifact>,
        errors: Vec<String>,
    },
}

impl CollectionOutcome {
    /// Artifacts that ended up in the final directory.
    pub fn artifacts(&self) -> &[Artifact] {
        match self {
            CollectionOutcome::Collected { artifacts, .. }
            | CollectionOutcome::CopyFailed { artifacts, .. } => artifacts,
            CollectionOutcome::NotFound { .. } => &[],
        }
    }

    pub fn is_warning(&self) -> bool {
        !matches!(self, CollectionOutcome::Collected { .. })
    }
}

impl fmt::Display for CollectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionOutcome::Collected {
                source_dir,
                artifacts,
            } => write!(
                f,
                "collected {} artifact(s) from {}",
                artifacts.len(),
                source_dir.display()
            ),
            CollectionOutcome::NotFound {
                searched,
                graph_file,
            } => write!(
                f,
                "ArtifactNotFound: no mesh, material or texture under {}; inspect {}",
                searched.display(),
                graph_file.display()
            ),
            CollectionOutcome::CopyFailed { errors, .. } => {
                write!(f, "failed to copy {} artifact(s): {}", errors.len(), errors.join("; "))
            }
        }
    }
}

/// Copies the final mesh, material and textures to `output/final/`.
#[derive(Debug, Clone)]
pub struct ArtifactCollector {
    texturing_dir: PathBuf,
    final_dir: PathBuf,
    graph_file: PathBuf,
}

impl ArtifactCollector {
    pub fn new(
        texturing_dir: impl Into<PathBuf>,
        final_dir: impl Into<PathBuf>,
        graph_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            texturing_dir: texturing_dir.into(),
            final_dir: final_dir.into(),
            graph_file: graph_file.into(),
        }
    }

    /// Collector for the `Texturing` node of a job layout.
    pub fn for_layout(layout: &WorkLayout, texturing_node: &str) -> Self {
        Self::new(
            layout.node_dir(texturing_node),
            &layout.final_dir,
            &layout.graph_file,
        )
    }

    /// Copy artifacts from the newest texturing output directory.
    ///
    /// Never fails; problems are reported through the outcome.
    pub fn collect(&self) -> CollectionOutcome {
        let not_found = || CollectionOutcome::NotFound {
            searched: self.texturing_dir.clone(),
            graph_file: self.graph_file.clone(),
        };

        let Some(source_dir) = newest_subdir(&self.texturing_dir) else {
            tracing::warn!(
                "No texturing output under {}",
                self.texturing_dir.display()
            );
            return not_found();
        };

        let candidates = artifact_files(&source_dir);
        if candidates.is_empty() {
            tracing::warn!("No mesh artifacts in {}", source_dir.display());
            return not_found();
        }

        if let Err(e) = fs::create_dir_all(&self.final_dir) {
            return CollectionOutcome::CopyFailed {
                source_dir,
                artifacts: Vec::new(),
                errors: vec![format!("{}: {}", self.final_dir.display(), e)],
            };
        }

        let mut artifacts = Vec::new();
        let mut errors = Vec::new();
        for (kind, source) in candidates {
            let Some(file_name) = source.file_name() else {
                continue;
            };
            let dest = self.final_dir.join(file_name);
            match fs::copy(&source, &dest) {
                Ok(_) => {
                    tracing::debug!("Copied {} -> {}", source.display(), dest.display());
                    artifacts.push(Artifact {
                        kind,
                        source,
                        path: dest,
                    });
                }
                Err(e) => errors.push(format!("{}: {}", source.display(), e)),
            }
        }

        if errors.is_empty() {
            tracing::info!(
                "Collected {} artifact(s) into {}",
                artifacts.len(),
                self.final_dir.display()
            );
            CollectionOutcome::Collected {
                source_dir,
                artifacts,
            }
        } else {
            CollectionOutcome::CopyFailed {
                source_dir,
                artifacts,
                errors,
            }
        }
    }
}

/// Most recently modified subdirectory of `dir`.
fn newest_subdir(dir: &Path) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| {
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.path())
        })
        .max()
        .map(|(_, path)| path)
}

/// Files in `dir` that are mesh, material or texture outputs, by name.
fn artifact_files(dir: &Path) -> Vec<(ArtifactKind, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<(ArtifactKind, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let path = entry.path();
            ArtifactKind::from_path(&path).map(|kind| (kind, path))
        })
        .collect();
    files.sort_by(|a, b| a.1.cmp(&b.1));
    files
}
