//! Locating the project root that holds `assets/`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Points at the project root explicitly, skipping discovery.
pub const ROOT_ENV_VAR: &str = "ISO_ROOT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot read {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("cannot locate the running executable: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("executable path {0} has no parent directory")]
    ExeHasNoParent(PathBuf),
    #[error(
        "{var}={path} is not a project root (expected Cargo.toml next to crates/ or assets/)"
    )]
    InvalidEnvRoot { var: &'static str, path: PathBuf },
    #[error(
        "no project root above {start_dir} (expected Cargo.toml next to crates/ or assets/); \
set {var} to the directory that contains assets/, e.g. export {var}=/path/to/iso-engine"
    )]
    RootNotFound {
        start_dir: PathBuf,
        var: &'static str,
    },
}

impl AppPaths {
    /// Uses `ISO_ROOT` when set, otherwise searches upward from the executable.
    pub fn resolve() -> Result<Self, StartupError> {
        let root = match env::var_os(ROOT_ENV_VAR) {
            Some(value) => root_from_env(Path::new(&value))?,
            None => root_from_executable()?,
        };
        Ok(Self::for_root(root))
    }

    pub fn for_root(root: PathBuf) -> Self {
        let assets_dir = root.join("assets");
        Self { root, assets_dir }
    }
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    AppPaths::resolve()
}

fn root_from_env(value: &Path) -> Result<PathBuf, StartupError> {
    if value.as_os_str().is_empty() {
        return Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source: env::VarError::NotPresent,
        });
    }
    let path = canonical_or_raw(value);
    if looks_like_root(&path) {
        Ok(path)
    } else {
        Err(StartupError::InvalidEnvRoot {
            var: ROOT_ENV_VAR,
            path,
        })
    }
}

fn root_from_executable() -> Result<PathBuf, StartupError> {
    let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
    let Some(exe_dir) = exe.parent() else {
        return Err(StartupError::ExeHasNoParent(exe));
    };
    find_root_above(exe_dir).ok_or_else(|| StartupError::RootNotFound {
        start_dir: canonical_or_raw(exe_dir),
        var: ROOT_ENV_VAR,
    })
}

fn find_root_above(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|candidate| looks_like_root(candidate))
        .map(canonical_or_raw)
}

fn looks_like_root(path: &Path) -> bool {
    path.join("Cargo.toml").is_file()
        && (path.join("crates").is_dir() || path.join("assets").is_dir())
}

fn canonical_or_raw(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
