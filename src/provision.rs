//! Copies engine resource files from the bundled resource directory into the
//! place the engine looks for them at startup.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::error::ProvisionError;

/// Copies `source` into `target_dir`, replacing any file already there.
pub fn provision_file(source: &Path, target_dir: &Path) -> Result<PathBuf, ProvisionError> {
    if !source.is_file() {
        return Err(ProvisionError::Missing(source.to_path_buf()));
    }
    let Some(file_name) = source.file_name() else {
        return Err(ProvisionError::Missing(source.to_path_buf()));
    };
    let target = target_dir.join(file_name);

    fs::create_dir_all(target_dir)
        .and_then(|_| fs::copy(source, &target))
        .map_err(|source_err| ProvisionError::Copy {
            from: source.to_path_buf(),
            to: target.clone(),
            source: source_err,
        })?;

    debug!("provisioned {} -> {}", source.display(), target.display());
    Ok(target)
}

/// Provisions every named file from `source_dir` into `target_dir`.
///
/// A file that cannot be copied is logged and skipped; the rest are still
/// attempted. Returns the paths that are now in place. Only a missing target
/// directory is an error.
pub fn provision(
    source_dir: &Path,
    target_dir: Option<&Path>,
    names: &[&str],
) -> Result<Vec<PathBuf>, ProvisionError> {
    let target_dir = target_dir.ok_or(ProvisionError::NoHomeDir)?;

    let mut provisioned = Vec::with_capacity(names.len());
    for name in names {
        match provision_file(&source_dir.join(name), target_dir) {
            Ok(path) => provisioned.push(path),
            Err(e) => warn!("could not provision {name}: {e}"),
        }
    }
    Ok(provisioned)
}
