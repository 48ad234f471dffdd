use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

/// Remembered process-wide once a native symlink attempt fails, so we don't
/// retry native symlinks on every subsequent call (Windows privilege/volume
/// limitations are stable for the duration of a run).
static NATIVE_SYMLINK_UNUSABLE: AtomicBool = AtomicBool::new(false);

/// Appends `(1)`, `(2)`, … before the extension until `path` doesn't exist.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or(Path::new(""));

    let mut n = 1u32;
    loop {
        let candidate_name = match &ext {
            Some(ext) => format!("{stem}({n}).{ext}"),
            None => format!("{stem}({n})"),
        };
        let candidate = parent.join(candidate_name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Moves `src` into `target_dir`, resolving name collisions, and setting
/// mtime to `date_taken` if provided. Falls back to copy+delete on
/// cross-device errors.
pub fn move_file(src: &Path, target_dir: &Path, date_taken: Option<DateTime<Utc>>) -> Result<PathBuf> {
    fs::create_dir_all(target_dir)
        .with_context(|| format!("creating {}", target_dir.display()))?;
    let file_name = src
        .file_name()
        .context("source path has no file name")?;
    let target = unique_path(&target_dir.join(file_name));

    match fs::rename(src, &target) {
        Ok(()) => {}
        Err(e) if is_cross_device(&e) => {
            fs::copy(src, &target)
                .with_context(|| format!("copying {} to {}", src.display(), target.display()))?;
            fs::remove_file(src).with_context(|| format!("removing {}", src.display()))?;
        }
        Err(e) => return Err(e).with_context(|| format!("moving {} to {}", src.display(), target.display())),
    }

    if let Some(date) = date_taken {
        set_mtime(&target, date).ok();
    }
    Ok(target)
}

/// Streaming copy of `src` into `target_dir`, same collision and mtime rules
/// as `move_file`.
pub fn copy_file(src: &Path, target_dir: &Path, date_taken: Option<DateTime<Utc>>) -> Result<PathBuf> {
    let file_name = src
        .file_name()
        .context("source path has no file name")?
        .to_os_string();
    copy_file_named(src, target_dir, Path::new(&file_name), date_taken)
}

/// Same as `copy_file`, but the copy is named after `link_name` rather than
/// `src`'s own basename. Used when an album copy must keep the filename the
/// file had inside the album folder, not the one it was moved under.
pub fn copy_file_named(
    src: &Path,
    target_dir: &Path,
    link_name: &Path,
    date_taken: Option<DateTime<Utc>>,
) -> Result<PathBuf> {
    fs::create_dir_all(target_dir)
        .with_context(|| format!("creating {}", target_dir.display()))?;
    let file_name = link_name.file_name().context("link name has no file name")?;
    let target = unique_path(&target_dir.join(file_name));
    fs::copy(src, &target)
        .with_context(|| format!("copying {} to {}", src.display(), target.display()))?;
    if let Some(date) = date_taken {
        set_mtime(&target, date).ok();
    }
    Ok(target)
}

/// Creates a relative symlink (POSIX) or a native symlink / `.lnk` shell
/// shortcut (Windows) in `target_dir` pointing at `source_file`.
pub fn create_shortcut(target_dir: &Path, source_file: &Path) -> Result<PathBuf> {
    let file_name = source_file
        .file_name()
        .context("source has no file name")?
        .to_os_string();
    create_shortcut_named(target_dir, source_file, Path::new(&file_name))
}

/// Same as `create_shortcut`, but the link is named after `link_name`
/// rather than `source_file`'s own basename. Used when a secondary file's
/// original filename must be preserved even though it shortcuts to the
/// primary's physical file.
pub fn create_shortcut_named(target_dir: &Path, source_file: &Path, link_name: &Path) -> Result<PathBuf> {
    fs::create_dir_all(target_dir)?;
    let file_name = link_name.file_name().context("link name has no file name")?;
    let link_path = unique_path(&target_dir.join(file_name));

    #[cfg(unix)]
    {
        let relative = relative_target(target_dir, source_file);
        symlink::symlink_file(&relative, &link_path)
            .with_context(|| format!("symlinking {}", link_path.display()))?;
        Ok(link_path)
    }

    #[cfg(windows)]
    {
        if !NATIVE_SYMLINK_UNUSABLE.load(Ordering::Relaxed) {
            if symlink::symlink_file(source_file, &link_path).is_ok() {
                return Ok(link_path);
            }
            NATIVE_SYMLINK_UNUSABLE.store(true, Ordering::Relaxed);
        }
        create_lnk_shortcut(&link_path, source_file)?;
        Ok(link_path.with_extension("lnk"))
    }
}

#[cfg(unix)]
fn relative_target(target_dir: &Path, source_file: &Path) -> PathBuf {
    pathdiff(source_file, target_dir).unwrap_or_else(|| source_file.to_path_buf())
}

#[cfg(unix)]
fn pathdiff(target: &Path, base: &Path) -> Option<PathBuf> {
    let target = target.canonicalize().ok()?;
    let base = base.canonicalize().ok()?;
    let mut target_components = target.components();
    let mut base_components = base.components();
    let mut common = 0usize;
    loop {
        let t = target_components.clone().next();
        let b = base_components.clone().next();
        match (t, b) {
            (Some(t), Some(b)) if t == b => {
                target_components.next();
                base_components.next();
                common += 1;
            }
            _ => break,
        }
    }
    let _ = common;
    let mut result = PathBuf::new();
    for _ in base_components {
        result.push("..");
    }
    for component in target_components {
        result.push(component.as_os_str());
    }
    Some(result)
}

#[cfg(windows)]
fn create_lnk_shortcut(link_path: &Path, source_file: &Path) -> Result<()> {
    let link_path = link_path.with_extension("lnk");
    let script = format!(
        "$s=(New-Object -COM WScript.Shell).CreateShortcut('{}'); $s.TargetPath='{}'; $s.Save()",
        link_path.display(),
        source_file.display(),
    );
    let status = std::process::Command::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command", &script])
        .status()
        .context("spawning powershell to create .lnk shortcut")?;
    if !status.success() {
        anyhow::bail!("powershell shortcut creation failed for {}", link_path.display());
    }
    Ok(())
}

fn is_cross_device(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc_exdev())
    }
    #[cfg(not(unix))]
    {
        err.kind() == std::io::ErrorKind::Other
    }
}

#[cfg(unix)]
fn libc_exdev() -> i32 {
    18 // EXDEV on Linux/macOS
}

fn set_mtime(path: &Path, date: DateTime<Utc>) -> Result<()> {
    let ft = filetime::FileTime::from_unix_time(date.timestamp(), 0);
    filetime::set_file_mtime(path, ft)?;
    Ok(())
}
