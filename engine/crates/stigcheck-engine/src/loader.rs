//! Control loader - loads control definitions from YAML files

use crate::ControlCatalog;
use std::path::{Path, PathBuf};
use stigcheck_core::{Control, Error, Result};
use tracing::{debug, info};

/// Load every `*.yaml` / `*.yml` control under `dir`, recursively, in sorted
/// path order. A malformed file or a duplicate id fails the whole load.
pub fn load_catalog_from_dir(dir: impl AsRef<Path>) -> Result<ControlCatalog> {
    let dir = dir.as_ref();

    if !dir.is_dir() {
        return Err(Error::DirectoryNotFound {
            path: dir.display().to_string(),
        });
    }

    info!("Loading controls from: {}", dir.display());

    let mut paths = Vec::new();
    collect_paths(dir, &mut paths)?;
    paths.sort();

    let mut catalog = ControlCatalog::new();
    for path in &paths {
        let control = load_control_file(path)?;
        debug!("Loaded control: {} from {}", control.id, path.display());
        catalog.register(control)?;
    }

    info!("Loaded {} controls", catalog.len());
    Ok(catalog)
}

fn collect_paths(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            collect_paths(&path, paths)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        ) {
            paths.push(path);
        }
    }
    Ok(())
}

/// Parse and validate a single control file
pub fn load_control_file(path: &Path) -> Result<Control> {
    let content = std::fs::read_to_string(path)?;

    Control::from_yaml(&content).map_err(|e| Error::InvalidControlDefinition {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
