//! Final reconstruction outputs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What role an output file plays in the textured mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Mesh geometry (`.obj`).
    Geometry,
    /// Material definition (`.mtl`).
    Material,
    /// Texture image.
    Texture,
}

impl ArtifactKind {
    /// Classify a file by extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "obj" => Some(Self::Geometry),
            "mtl" => Some(Self::Material),
            "png" | "jpg" | "jpeg" | "exr" | "tif" | "tiff" => Some(Self::Texture),
            _ => None,
        }
    }
}

/// One collected output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    /// Where the file was found in the tool cache.
    pub source: PathBuf,
    /// Stable copy under `output/final/`.
    pub path: PathBuf,
}
