//! Stage 8: sets filesystem creation time for every physically placed,
//! non-shortcut file. Modification time is already set at move/copy time
//! (`fsops::move_file`/`copy_file`); creation time is a Windows-only
//! concept, so this stage is a no-op unless the user opted in and the
//! platform is Windows. Grounded in `PianCat-GallerySorter`'s
//! `target.'cfg(windows)'` `winapi` dependency split.

use anyhow::Result;

use crate::config::Configuration;
use crate::model::{MediaEntity, StepResult};

#[cfg(windows)]
mod windows_impl {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;
    use std::ptr;

    use chrono::{DateTime, Utc};
    use winapi::shared::minwindef::FILETIME;
    use winapi::um::fileapi::{CreateFileW, OPEN_EXISTING, SetFileTime};
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::winnt::{FILE_ATTRIBUTE_NORMAL, FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OPEN_REPARSE_POINT, GENERIC_WRITE};

    /// 100-ns ticks between the Windows epoch (1601-01-01) and the Unix epoch.
    const EPOCH_DIFF_100NS: u64 = 116_444_736_000_000_000;

    fn to_filetime(date: DateTime<Utc>) -> FILETIME {
        // Windows FILETIME has no representation before 1601, but in practice
        // `SetFileTime` rejects values before the Unix epoch on most
        // filesystems; clamp per the documented behavior.
        let clamped = if date.timestamp() < 0 {
            DateTime::<Utc>::from_timestamp(0, 0).expect("unix epoch is representable")
        } else {
            date
        };
        let unix_100ns = clamped.timestamp() as u64 * 10_000_000 + (clamped.timestamp_subsec_nanos() as u64) / 100;
        let ticks = EPOCH_DIFF_100NS + unix_100ns;
        FILETIME {
            dwLowDateTime: (ticks & 0xFFFF_FFFF) as u32,
            dwHighDateTime: (ticks >> 32) as u32,
        }
    }

    /// Opens `path` with `FILE_FLAG_OPEN_REPARSE_POINT` (so a symlink's own
    /// timestamp is touched rather than its target's) and sets creation and
    /// modification time, leaving access time untouched.
    pub fn set_creation_and_modified(path: &Path, date: DateTime<Utc>) -> anyhow::Result<()> {
        let wide: Vec<u16> = OsStr::new(path).encode_wide().chain(std::iter::once(0)).collect();
        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                GENERIC_WRITE,
                0,
                ptr::null_mut(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL | FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            anyhow::bail!("CreateFileW failed opening {}", path.display());
        }
        let ft = to_filetime(date);
        let ok = unsafe { SetFileTime(handle, &ft, ptr::null(), &ft) };
        unsafe { CloseHandle(handle) };
        if ok == 0 {
            anyhow::bail!("SetFileTime failed for {}", path.display());
        }
        Ok(())
    }
}

/// Runs the timestamp-update stage over every entity's physically placed
/// files. A no-op (reported as skipped) unless `config.update_creation_time`
/// is set and the build targets Windows.
pub fn update_creation_times(entities: &[MediaEntity], config: &Configuration) -> Result<StepResult> {
    if !config.update_creation_time || !cfg!(windows) {
        return Ok(StepResult::skipped());
    }

    let mut updated = 0u64;
    let mut failed = 0u64;

    for entity in entities {
        for file in entity.all_files() {
            if file.is_shortcut {
                continue;
            }
            let Some(target) = &file.target_path else { continue };
            let Some(date) = entity.date_taken else { continue };

            #[cfg(windows)]
            {
                match windows_impl::set_creation_and_modified(target, date) {
                    Ok(()) => updated += 1,
                    Err(_) => failed += 1,
                }
            }
            #[cfg(not(windows))]
            {
                let _ = (target, date);
            }
        }
    }

    let mut step = StepResult::ok("updated creation times").with_stat("creation_times_updated", updated);
    if failed > 0 {
        step.message = format!("updated creation times ({failed} updates failed)");
    }
    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileEntity;
    use std::path::PathBuf;

    #[test]
    fn test_skipped_when_not_opted_in() {
        let entities = vec![MediaEntity::new(FileEntity::new(PathBuf::from("/a.jpg"), true, 1))];
        let config = Configuration::default();
        let result = update_creation_times(&entities, &config).unwrap();
        assert!(result.skipped);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_skipped_on_non_windows_even_when_opted_in() {
        let entities = vec![MediaEntity::new(FileEntity::new(PathBuf::from("/a.jpg"), true, 1))];
        let mut config = Configuration::default();
        config.update_creation_time = true;
        let result = update_creation_times(&entities, &config).unwrap();
        assert!(result.skipped);
    }
}
