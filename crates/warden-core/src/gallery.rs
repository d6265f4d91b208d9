//! Enrolled-identity gallery stored as one JSON file per name.

use crate::types::EnrolledIdentity;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const EMBEDDING_SUFFIX: &str = ".embedding.json";

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid identity name: {0:?}")]
    InvalidName(String),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> GalleryError + '_ {
    move |source| GalleryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Path of the embedding file for `name` inside `dir`.
pub fn identity_path(dir: &Path, name: &str) -> Result<PathBuf, GalleryError> {
    let valid = !name.trim().is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != "..";
    if !valid {
        return Err(GalleryError::InvalidName(name.to_string()));
    }
    Ok(dir.join(format!("{name}{EMBEDDING_SUFFIX}")))
}

/// Load every `*.embedding.json` in `dir`, ordered by file name.
///
/// A missing directory yields an empty gallery. Files that cannot be read or
/// parsed are skipped with a warning, as are entries whose dimension differs
/// from the first loaded entry.
pub fn load_gallery(dir: &Path) -> Result<Vec<EnrolledIdentity>, GalleryError> {
    let entries = read_entries(dir)?;
    let Some(dim) = entries.first().map(|i| i.embedding.values.len()) else {
        return Ok(entries);
    };
    Ok(entries
        .into_iter()
        .filter(|identity| compatible(identity, dim, None))
        .collect())
}

/// Load the gallery, keeping only entries the given model could have
/// produced: `dim` values, and a model version that is either absent or
/// equal to `model_version`. Anything else is skipped with a warning, since
/// comparing it against a live embedding would be meaningless.
pub fn load_compatible(
    dir: &Path,
    dim: usize,
    model_version: &str,
) -> Result<Vec<EnrolledIdentity>, GalleryError> {
    Ok(read_entries(dir)?
        .into_iter()
        .filter(|identity| compatible(identity, dim, Some(model_version)))
        .collect())
}

fn compatible(identity: &EnrolledIdentity, dim: usize, model_version: Option<&str>) -> bool {
    let embedding = &identity.embedding;
    if embedding.values.len() != dim {
        tracing::warn!(
            name = %identity.name,
            dim = embedding.values.len(),
            expected = dim,
            "skipping embedding with mismatched dimension"
        );
        return false;
    }
    match (model_version, embedding.model_version.as_deref()) {
        (Some(expected), Some(found)) if expected != found => {
            tracing::warn!(
                name = %identity.name,
                model_version = found,
                expected,
                "skipping embedding from another model"
            );
            false
        }
        _ => true,
    }
}

fn read_entries(dir: &Path) -> Result<Vec<EnrolledIdentity>, GalleryError> {
    if !dir.exists() {
        tracing::warn!(dir = %dir.display(), "gallery directory not found; no faces loaded");
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_err(dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(EMBEDDING_SUFFIX))
        })
        .collect();
    paths.sort();

    let mut gallery = Vec::with_capacity(paths.len());
    for path in paths {
        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_str::<EnrolledIdentity>(&raw).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(identity) if identity.embedding.values.is_empty() => {
                tracing::warn!(path = %path.display(), "skipping empty embedding file");
            }
            Ok(identity) => {
                tracing::debug!(name = %identity.name, path = %path.display(), "loaded embedding");
                gallery.push(identity);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable embedding file");
            }
        }
    }

    Ok(gallery)
}

/// Write (or overwrite) the embedding file for `identity`.
pub fn save_identity(dir: &Path, identity: &EnrolledIdentity) -> Result<PathBuf, GalleryError> {
    let path = identity_path(dir, &identity.name)?;
    fs::create_dir_all(dir).map_err(io_err(dir))?;
    let json = serde_json::to_string_pretty(identity)?;
    fs::write(&path, json).map_err(io_err(&path))?;
    Ok(path)
}

/// Names with an embedding file in `dir`, sorted. Contents are not read.
pub fn list_names(dir: &Path) -> Result<Vec<String>, GalleryError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(io_err(dir))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let file_name = entry.file_name().into_string().ok()?;
            file_name
                .strip_suffix(EMBEDDING_SUFFIX)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        })
        .collect();
    names.sort();
    Ok(names)
}

/// Whether an embedding file exists for `name`.
pub fn contains(dir: &Path, name: &str) -> bool {
    identity_path(dir, name).is_ok_and(|p| p.exists())
}

/// Remove the embedding file for `name`. Returns whether one existed.
pub fn remove_identity(dir: &Path, name: &str) -> Result<bool, GalleryError> {
    let path = identity_path(dir, name)?;
    match fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(GalleryError::Io { path, source: e }),
    }
}
