use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

use crate::constants::{MAX_COMPONENT_LENGTH, MAX_NAME_LENGTH};
use crate::error::{Error, Result};

/// Validate a collection entry name.
///
/// Names are relative, `/`-separated and free of `.`/`..`, empty components,
/// backslashes and control characters, so that joining them onto a target
/// directory can never escape it.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason| Error::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(invalid("name too long"));
    }
    if name.starts_with('/') {
        return Err(invalid("absolute path"));
    }

    for component in name.split('/') {
        match component {
            "" => return Err(invalid("empty path component")),
            "." | ".." => return Err(invalid("relative path component")),
            _ => {}
        }
        if component.len() > MAX_COMPONENT_LENGTH {
            return Err(invalid("path component too long"));
        }
        if component.contains('\\') {
            return Err(invalid("backslash in path component"));
        }
        if component.chars().any(|c| c.is_control()) {
            return Err(invalid("control character in name"));
        }
        #[cfg(windows)]
        if component.contains(':') {
            return Err(invalid("drive or stream separator in name"));
        }
    }
    Ok(())
}

/// Map a validated name onto a path below `root`.
pub fn name_to_path(root: &Path, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    let mut path = root.to_path_buf();
    for component in name.split('/') {
        path.push(component);
    }
    Ok(path)
}

/// Create a new file with secure permissions (0o600 on Unix) for writing.
///
/// Fails if the file already exists.
pub async fn open_secure_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}
