// crates/nextforge-resolver/src/mirror.rs
// ============================================================================
// Module: Nextforge Library Directory Mirror
// Description: Exposes resolved artifacts in a flat library directory.
// Purpose: Give backends a stable directory of their driver artifacts.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Resolved artifacts live deep inside the content-addressed cache. When a
//! library directory is configured, each artifact is also linked there as
//! `<lib_dir>/<name>-<version>.jar`. Hard links are preferred; when the
//! directory is on another filesystem the file is copied instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

// ============================================================================
// SECTION: Mirroring
// ============================================================================

/// Places `source` into `lib_dir` under `file_name`. An identical file is
/// left in place; a differing one is replaced.
///
/// # Errors
///
/// Returns [`std::io::Error`] when neither linking nor copying succeeds.
pub fn mirror_into(lib_dir: &Path, source: &Path, file_name: &str) -> std::io::Result<PathBuf> {
    fs::create_dir_all(lib_dir)?;
    let target = lib_dir.join(file_name);
    if same_contents(source, &target)? {
        return Ok(target);
    }
    match fs::remove_file(&target) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    if fs::hard_link(source, &target).is_err() {
        fs::copy(source, &target)?;
    }
    Ok(target)
}

/// Returns true when `target` exists with the same bytes as `source`.
fn same_contents(source: &Path, target: &Path) -> std::io::Result<bool> {
    let existing = match fs::read(target) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    Ok(existing == fs::read(source)?)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn mirror_replaces_stale_files() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("cached.jar");
        fs::write(&source, b"fresh").unwrap();
        let lib_dir = temp.path().join("lib");
        fs::create_dir_all(&lib_dir).unwrap();
        fs::write(lib_dir.join("demo-1.0.jar"), b"stale").unwrap();
        let target = mirror_into(&lib_dir, &source, "demo-1.0.jar").unwrap();
        assert_eq!(fs::read(target).unwrap(), b"fresh");
    }

    #[test]
    fn identical_files_are_left_in_place() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("cached.jar");
        fs::write(&source, b"same").unwrap();
        let lib_dir = temp.path().join("lib");
        let first = mirror_into(&lib_dir, &source, "demo-1.0.jar").unwrap();
        let before = fs::metadata(&first).unwrap().modified().unwrap();
        let second = mirror_into(&lib_dir, &source, "demo-1.0.jar").unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::metadata(&second).unwrap().modified().unwrap(), before);
    }
}
