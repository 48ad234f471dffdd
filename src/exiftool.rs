//! External ExifTool process adapter: discovery, one-shot invocation, and
//! batched writes via argfile. Grounded in `36e2faad_pens-catalog`'s
//! `exiftool.rs` wrapper (`run_exiftool`, stdout-regex parsing), hardened to
//! return `Result` instead of asserting/panicking.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, bail};

const SINGLE_WRITE_TIMEOUT: Duration = Duration::from_secs(4 * 60);
const BATCH_WRITE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const KILL_GRACE: Duration = Duration::from_millis(300);

pub const IMAGE_BATCH_THRESHOLD_WINDOWS: usize = 60;
pub const IMAGE_BATCH_THRESHOLD_OTHER: usize = 120;
pub const VIDEO_BATCH_THRESHOLD: usize = 12;
/// Above this many argument bytes, write an argfile instead of argv —
/// avoids hitting platform command-line length limits on large batches.
const ARGFILE_THRESHOLD_BYTES: usize = 8 * 1024;

const COMMON_ARGS: &[&str] = &[
    "-P",
    "-charset",
    "filename=UTF8",
    "-overwrite_original",
    "-api",
    "QuickTimeUTC=1",
    "-m",
];

/// A located, verified ExifTool binary.
#[derive(Debug, Clone)]
pub struct ExifTool {
    binary: PathBuf,
}

impl ExifTool {
    /// Searches PATH, the directory next to the current executable, and a
    /// handful of common install locations, verifying each candidate with a
    /// version probe.
    pub fn discover() -> Option<Self> {
        let mut candidates = Vec::new();
        candidates.push(PathBuf::from("exiftool"));
        if let Ok(exe) = std::env::current_exe()
            && let Some(dir) = exe.parent()
        {
            candidates.push(dir.join("exiftool"));
        }
        for common in [
            "/usr/bin/exiftool",
            "/usr/local/bin/exiftool",
            "/opt/homebrew/bin/exiftool",
            "C:\\Program Files\\exiftool\\exiftool.exe",
        ] {
            candidates.push(PathBuf::from(common));
        }

        candidates.into_iter().find_map(|candidate| {
            let probe = Command::new(&candidate).arg("-ver").output().ok()?;
            probe.status.success().then_some(ExifTool { binary: candidate })
        })
    }

    /// Runs `exiftool` with `args`, draining stdout/stderr concurrently
    /// (via `Command::output`, which already reads both pipes without
    /// blocking the child) and enforcing `timeout` with SIGTERM→SIGKILL.
    fn run(&self, args: &[&str], timeout: Duration) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = cmd.spawn().context("spawning exiftool")?;

        let start = std::time::Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                let output = child.wait_with_output()?;
                if !status.success() {
                    bail!("exiftool exited with {status}: {}", String::from_utf8_lossy(&output.stderr));
                }
                return Ok(output.stdout);
            }
            if start.elapsed() > timeout {
                kill_with_grace(&mut child);
                bail!("exiftool timed out after {:?}", timeout);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// One-shot read of date/GPS tags for a single file.
    pub fn read_tags(&self, path: &Path, tags: &[&str]) -> Result<String> {
        let mut args: Vec<&str> = vec!["-s3"];
        args.extend(tags);
        let path_str = path.to_string_lossy().into_owned();
        args.push(&path_str);
        let stdout = self.run(&args, READ_TIMEOUT)?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Writes `tags` into a single file.
    pub fn write_tags(&self, path: &Path, tags: &[(String, String)]) -> Result<()> {
        let mut args: Vec<String> = COMMON_ARGS.iter().map(|s| s.to_string()).collect();
        for (tag, value) in tags {
            args.push(format!("-{tag}={value}"));
        }
        args.push(path.to_string_lossy().into_owned());
        let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        self.run(&arg_refs, SINGLE_WRITE_TIMEOUT)?;
        Ok(())
    }

    /// Writes `tags` to every file in `entries` in a single invocation,
    /// choosing an argfile when the payload is large. On failure, splits
    /// the batch in half and retries recursively, ultimately isolating and
    /// writing per-file so one bad file doesn't sink its whole batch.
    pub fn write_batch(&self, entries: &[(PathBuf, Vec<(String, String)>)]) -> Vec<(PathBuf, Result<()>)> {
        if entries.is_empty() {
            return Vec::new();
        }
        if entries.len() == 1 {
            let (path, tags) = &entries[0];
            return vec![(path.clone(), self.write_tags(path, tags))];
        }

        match self.try_write_batch(entries) {
            Ok(()) => entries.iter().map(|(p, _)| (p.clone(), Ok(()))).collect(),
            Err(_) => {
                let mid = entries.len() / 2;
                let mut results = self.write_batch(&entries[..mid]);
                results.extend(self.write_batch(&entries[mid..]));
                results
            }
        }
    }

    fn try_write_batch(&self, entries: &[(PathBuf, Vec<(String, String)>)]) -> Result<()> {
        let mut argv: Vec<String> = COMMON_ARGS.iter().map(|s| s.to_string()).collect();
        for (path, tags) in entries {
            for (tag, value) in tags {
                argv.push(format!("-{tag}={value}"));
            }
            argv.push(path.to_string_lossy().into_owned());
            argv.push("-execute".to_string());
        }

        let payload_bytes: usize = argv.iter().map(|a| a.len() + 1).sum();
        if payload_bytes > ARGFILE_THRESHOLD_BYTES {
            self.run_via_argfile(&argv)
        } else {
            let arg_refs: Vec<&str> = argv.iter().map(|s| s.as_str()).collect();
            self.run(&arg_refs, BATCH_WRITE_TIMEOUT)?;
            Ok(())
        }
    }

    fn run_via_argfile(&self, argv: &[String]) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new().context("creating exiftool argfile")?;
        for arg in argv {
            writeln!(tmp, "{arg}")?;
        }
        tmp.flush()?;
        let argfile_arg = format!("-@{}", tmp.path().display());
        self.run(&[argfile_arg.as_str()], BATCH_WRITE_TIMEOUT)?;
        if let Some(dir) = tmp.path().parent() {
            cleanup_tmp_files(dir);
        }
        Ok(())
    }
}

fn kill_with_grace(child: &mut std::process::Child) {
    #[cfg(unix)]
    {
        let pid = child.id() as i32;
        unsafe {
            libc_kill(pid, 15); // SIGTERM
        }
        std::thread::sleep(KILL_GRACE);
        if child.try_wait().ok().flatten().is_none() {
            unsafe {
                libc_kill(pid, 9); // SIGKILL
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
    let _ = child.wait();
}

#[cfg(unix)]
unsafe fn libc_kill(pid: i32, sig: i32) {
    extern "C" {
        fn kill(pid: i32, sig: i32) -> i32;
    }
    unsafe {
        kill(pid, sig);
    }
}

/// Removes any stray `*_exiftool_tmp` files ExifTool leaves behind after an
/// interrupted or failed write.
fn cleanup_tmp_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if entry
            .file_name()
            .to_string_lossy()
            .ends_with("_exiftool_tmp")
        {
            let _ = std::fs::remove_file(entry.path());
        }
    }
}

/// Given ExifTool's `-s3` output, parses the first non-empty line into an
/// EXIF-format `YYYY:MM:DD HH:MM:SS` string, if any.
pub fn first_nonempty_date_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && *line != "0000:00:00 00:00:00")
        .map(str::to_string)
}
