// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Collision-safe file placement
//!
//! Destination names are claimed with a create-new open before the move, so
//! two concurrent moves into one folder can never land on the same name.
//! A move either completes or leaves the source where it was and removes
//! the claimed name.

use std::ffi::{OsStr, OsString};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::classifier::Classification;
use crate::{Result, SortError};

/// Highest `_N` suffix tried before giving up
pub const MAX_COLLISION_ATTEMPTS: u32 = 10_000;

/// Move `file` to `target_root/folder/subfolder/`, renaming on collision
pub fn organize(file: &Path, target_root: &Path, classification: &Classification) -> Result<PathBuf> {
    let name = file
        .file_name()
        .ok_or_else(|| SortError::InvalidPath(file.to_path_buf()))?;
    if !file.exists() {
        return Err(SortError::SourceMissing(file.to_path_buf()));
    }

    let folder = target_root.join(&classification.folder);
    let dir = folder.join(&classification.subfolder);
    // Innermost first, so cleanup can walk outward
    let created: Vec<PathBuf> = [&dir, &folder]
        .into_iter()
        .filter(|d| !d.exists())
        .cloned()
        .collect();
    fs::create_dir_all(&dir)?;

    let placed = reserve(&dir, name, MAX_COLLISION_ATTEMPTS).and_then(|destination| {
        match relocate(file, &destination) {
            Ok(()) => Ok(destination),
            Err(e) => {
                let _ = fs::remove_file(&destination);
                Err(e.into())
            }
        }
    });

    if placed.is_err() {
        remove_empty_dirs(&created);
    }
    placed
}

/// Remove directories this move created; non-empty ones are left alone
fn remove_empty_dirs(created: &[PathBuf]) {
    for dir in created {
        if fs::remove_dir(dir).is_err() {
            break;
        }
        debug!("Removed empty {:?} after failed move", dir);
    }
}

/// Move `src` to exactly `dest`; fails if `dest` is already taken
pub fn move_exact(src: &Path, dest: &Path) -> Result<()> {
    if !src.exists() {
        return Err(SortError::SourceMissing(src.to_path_buf()));
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    match claim(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(SortError::DestinationOccupied(dest.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    }

    if let Err(e) = relocate(src, dest) {
        let _ = fs::remove_file(dest);
        return Err(e.into());
    }
    Ok(())
}

/// `name` with `_n` inserted before the extension (`report.pdf` → `report_1.pdf`)
pub fn suffixed_name(name: &OsStr, n: u32) -> OsString {
    let path = Path::new(name);
    let stem = path.file_stem().unwrap_or(name);

    let mut out = OsString::from(stem);
    out.push(format!("_{}", n));
    if let Some(ext) = path.extension() {
        out.push(".");
        out.push(ext);
    }
    out
}

fn reserve(dir: &Path, name: &OsStr, max_attempts: u32) -> Result<PathBuf> {
    for n in 0..=max_attempts {
        let candidate = if n == 0 {
            dir.join(name)
        } else {
            dir.join(suffixed_name(name, n))
        };

        match claim(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(SortError::CollisionExhausted {
        dir: dir.to_path_buf(),
        name: name.to_string_lossy().into_owned(),
        attempts: max_attempts,
    })
}

fn claim(path: &Path) -> io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map(|_| ())
}

/// Rename over the claimed name, copying across volumes when needed
fn relocate(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!("{:?} and {:?} are on different volumes, copying", src, dest);
            copy_then_delete(src, dest)
        }
        Err(e) => Err(e),
    }
}

fn copy_then_delete(src: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(src, dest)?;
    fs::remove_file(src)
}

fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        // EXDEV
        err.raw_os_error() == Some(18)
    }
    #[cfg(windows)]
    {
        // ERROR_NOT_SAME_DEVICE
        err.raw_os_error() == Some(17)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = err;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work_finance() -> Classification {
        Classification::new("Work", "Finance")
    }

    #[test]
    fn test_suffixed_name() {
        assert_eq!(suffixed_name(OsStr::new("report.pdf"), 1), "report_1.pdf");
        assert_eq!(suffixed_name(OsStr::new("archive.tar.gz"), 2), "archive.tar_2.gz");
        assert_eq!(suffixed_name(OsStr::new("Makefile"), 3), "Makefile_3");
        assert_eq!(suffixed_name(OsStr::new(".env"), 1), ".env_1");
    }

    #[test]
    fn test_organize_builds_category_tree() {
        let src = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let file = src.path().join("invoice_2024.pdf");
        fs::write(&file, b"%PDF").unwrap();

        let dest = organize(&file, target.path(), &work_finance()).unwrap();

        assert_eq!(dest, target.path().join("Work/Finance/invoice_2024.pdf"));
        assert!(!file.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"%PDF");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_move_removes_folders_it_created() {
        let src = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        // Renaming a directory over the claimed file fails with ENOTDIR
        let not_a_file = src.path().join("bundle.app");
        fs::create_dir(&not_a_file).unwrap();

        assert!(organize(&not_a_file, target.path(), &work_finance()).is_err());

        assert!(not_a_file.is_dir());
        assert!(!target.path().join("Work").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_move_keeps_existing_folders() {
        let src = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        fs::create_dir_all(target.path().join("Work")).unwrap();
        let not_a_file = src.path().join("bundle.app");
        fs::create_dir(&not_a_file).unwrap();

        assert!(organize(&not_a_file, target.path(), &work_finance()).is_err());

        assert!(target.path().join("Work").is_dir());
        assert!(!target.path().join("Work/Finance").exists());
    }

    #[test]
    fn test_collision_gets_numbered_suffix() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let first = a.path().join("report.pdf");
        let second = b.path().join("report.pdf");
        fs::write(&first, b"first").unwrap();
        fs::write(&second, b"second").unwrap();

        let d1 = organize(&first, target.path(), &work_finance()).unwrap();
        let d2 = organize(&second, target.path(), &work_finance()).unwrap();

        assert_eq!(d1.file_name().unwrap(), "report.pdf");
        assert_eq!(d2.file_name().unwrap(), "report_1.pdf");
        assert_eq!(fs::read(&d1).unwrap(), b"first");
        assert_eq!(fs::read(&d2).unwrap(), b"second");
    }

    #[test]
    fn test_reserve_reports_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.txt", "a_1.txt", "a_2.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let err = reserve(dir.path(), OsStr::new("a.txt"), 2).unwrap_err();
        assert!(matches!(err, SortError::CollisionExhausted { attempts: 2, .. }));

        let claimed = reserve(dir.path(), OsStr::new("a.txt"), 3).unwrap();
        assert_eq!(claimed.file_name().unwrap(), "a_3.txt");
    }

    #[test]
    fn test_missing_source_leaves_no_trace() {
        let target = tempfile::tempdir().unwrap();
        let ghost = target.path().join("ghost.txt");

        let err = organize(&ghost, target.path(), &work_finance()).unwrap_err();
        assert!(matches!(err, SortError::SourceMissing(_)));
        assert!(!target.path().join("Work/Finance/ghost.txt").exists());
    }

    #[test]
    fn test_move_exact_refuses_occupied_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("moved.txt");
        let dest = dir.path().join("occupied.txt");
        fs::write(&src, b"mine").unwrap();
        fs::write(&dest, b"theirs").unwrap();

        let err = move_exact(&src, &dest).unwrap_err();
        assert!(matches!(err, SortError::DestinationOccupied(_)));
        assert_eq!(fs::read(&src).unwrap(), b"mine");
        assert_eq!(fs::read(&dest).unwrap(), b"theirs");
    }

    #[test]
    fn test_move_exact_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dest = dir.path().join("deep/er/a.txt");
        fs::write(&src, b"payload").unwrap();

        move_exact(&src, &dest).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn test_copy_then_delete_fills_claimed_name() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("big.iso");
        let dest = dir.path().join("claimed.iso");
        fs::write(&src, b"0123456789").unwrap();
        claim(&dest).unwrap();

        copy_then_delete(&src, &dest).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"0123456789");
    }
}
