use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Errors for resolving the root directory
#[derive(Debug, thiserror::Error)]
pub enum RootDirError {
    #[error("home directory is not set; cannot expand '~' in {0}")]
    HomeMissing(String),
    #[error("root directory does not exist: {0}")]
    NotFound(PathBuf),
    #[error("root directory is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve `--rootDir` into an absolute, existing directory.
///
/// Rules:
/// - `~` and `~/rest` expand against `HOME` (`USERPROFILE` first on Windows).
/// - Relative paths are joined onto the current working directory.
/// - The final path must exist and be a directory; it is never created.
pub fn resolve_root_dir(raw: &Path) -> Result<PathBuf, RootDirError> {
    resolve_root_dir_with(raw, user_home())
}

fn user_home() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = env::var_os("USERPROFILE").or_else(|| env::var_os("HOME"));
    #[cfg(not(target_os = "windows"))]
    let home = env::var_os("HOME");

    home.filter(|h| !h.is_empty()).map(PathBuf::from)
}

pub(crate) fn resolve_root_dir_with(
    raw: &Path,
    home: Option<PathBuf>,
) -> Result<PathBuf, RootDirError> {
    let text = raw.to_string_lossy();

    let expanded = if text == "~" {
        home.ok_or_else(|| RootDirError::HomeMissing(text.to_string()))?
    } else if let Some(rest) = text
        .strip_prefix("~/")
        .or_else(|| text.strip_prefix("~\\"))
    {
        home.ok_or_else(|| RootDirError::HomeMissing(text.to_string()))?
            .join(rest)
    } else {
        raw.to_path_buf()
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        env::current_dir()?.join(expanded)
    };

    match fs::metadata(&absolute) {
        Ok(meta) if meta.is_dir() => Ok(absolute),
        Ok(_) => Err(RootDirError::NotADirectory(absolute)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(RootDirError::NotFound(absolute))
        }
        Err(e) => Err(e.into()),
    }
}
