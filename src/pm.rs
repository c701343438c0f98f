//! Package-manager introspection.
//!
//! Resolves which package manager owns a module tree and where that manager
//! keeps globally installed modules, so globally installed `xcc-plugin-*`
//! packages can be offered to the plugin loader.

use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PmError {
    #[error(
        "an unrecognized or unsupported package manager ('{0}') was used to install this module; \
         its global module root cannot be resolved"
    )]
    UnsupportedPackageManager(String),
    #[error("unable to resolve a home directory for the current user")]
    NoHomeDirectory,
    #[error("unable to scan module directory: {0}")]
    Io(#[from] std::io::Error),
}

/// The package manager owning a module tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
    /// Recognized on disk but unsupported for global-module resolution.
    Other(String),
}

impl PackageManager {
    fn from_lockfile(name: &str) -> Option<Self> {
        match name {
            "package-lock.json" => Some(Self::Npm),
            "yarn.lock" => Some(Self::Yarn),
            "pnpm-lock.yaml" => Some(Self::Other("pnpm".to_string())),
            "bun.lockb" => Some(Self::Other("bun".to_string())),
            _ => None,
        }
    }
}

const LOCKFILES: [&str; 4] = ["package-lock.json", "yarn.lock", "pnpm-lock.yaml", "bun.lockb"];

/// Detect the package manager for the module tree containing `dir`, by the
/// nearest ancestor lockfile.
#[must_use]
pub fn detect(dir: &Path) -> Option<PackageManager> {
    let mut current = Some(dir);
    while let Some(candidate) = current {
        for lockfile in LOCKFILES {
            if candidate.join(lockfile).is_file() {
                debug!("Detected {lockfile} in {}", candidate.display());
                return PackageManager::from_lockfile(lockfile);
            }
        }
        current = candidate.parent();
    }
    None
}

/// Resolve the global module root for `pm`.
///
/// # Errors
///
/// Returns `PmError::UnsupportedPackageManager` for managers this CLI cannot
/// introspect; the failure is fatal to this operation only.
pub fn global_modules_dir(pm: &PackageManager) -> Result<PathBuf, PmError> {
    match pm {
        PackageManager::Npm => {
            let prefix = std::env::var("NPM_CONFIG_PREFIX")
                .map_or_else(|_| PathBuf::from("/usr/local"), PathBuf::from);
            Ok(prefix.join("lib/node_modules"))
        }
        PackageManager::Yarn => {
            let home = std::env::var("HOME").map_err(|_| PmError::NoHomeDirectory)?;
            Ok(PathBuf::from(home).join(".config/yarn/global/node_modules"))
        }
        PackageManager::Other(name) => {
            Err(PmError::UnsupportedPackageManager(name.clone()))
        }
    }
}

/// List plugin package directories (`xcc-plugin-*`) under a module root.
///
/// # Errors
///
/// Returns `PmError::Io` if the module root cannot be read.
pub fn plugins_in(modules_dir: &Path) -> Result<Vec<PathBuf>, PmError> {
    let mut plugins = Vec::new();
    for entry in std::fs::read_dir(modules_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir()
            && entry.file_name().to_string_lossy().starts_with("xcc-plugin-")
        {
            plugins.push(path);
        }
    }
    plugins.sort();
    Ok(plugins)
}

/// Discover globally installed plugin directories for the manager owning
/// `dir`, if any.
///
/// # Errors
///
/// Propagates `global_modules_dir` and scan failures; callers treat these as
/// non-fatal to startup.
pub fn discover_global_plugins(dir: &Path) -> Result<Vec<PathBuf>, PmError> {
    let Some(pm) = detect(dir) else {
        return Ok(Vec::new());
    };
    let modules_dir = global_modules_dir(&pm)?;
    if !modules_dir.is_dir() {
        return Ok(Vec::new());
    }
    plugins_in(&modules_dir)
}
