// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scoped ownership of intermediate files.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// An intermediate file that is deleted when the guard is dropped, unless
/// it has been [kept](ScratchFile::keep).
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take ownership of the file; it will no longer be deleted.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "scratch file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "cannot remove scratch file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_guard_removes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("part.pdf");
        std::fs::write(&path, b"x").expect("write");

        drop(ScratchFile::new(&path));
        assert!(!path.exists());
    }

    #[test]
    fn kept_file_survives() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("part.pdf");
        std::fs::write(&path, b"x").expect("write");

        let kept = ScratchFile::new(&path).keep();
        assert_eq!(kept, path);
        assert!(path.exists());
    }

    #[test]
    fn already_missing_file_is_fine() {
        let dir = tempfile::tempdir().expect("tempdir");
        drop(ScratchFile::new(dir.path().join("never-written.pdf")));
    }
}
