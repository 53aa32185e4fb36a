//! On-disk layout of takes and runs.
//!
//! ```text
//! <output_root>/
//!   take_2026-01-01_12-30/
//!     run000_cam0.y4m
//!     run000_cam1.y4m
//!     run000_report.json
//!     run001_cam0.y4m
//!     ...
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use trigcam_common::clock::RecordingClock;
use trigcam_common::config::Codec;
use trigcam_common::error::{TrigcamError, TrigcamResult};

/// One directory per take. Runs inside it are numbered and never reused.
#[derive(Debug, Clone)]
pub struct TakeDirectory {
    path: PathBuf,
    next_run: u32,
}

impl TakeDirectory {
    /// Create `<root>/<take_name>_<timestamp>`, or reopen it if this minute's
    /// take already exists. Numbering continues after the highest existing run.
    pub fn create(root: &Path, take_name: &str, clock: &RecordingClock) -> TrigcamResult<Self> {
        let path = root.join(format!("{take_name}_{}", clock.take_stamp()));
        Self::open(path)
    }

    /// Use `path` as the take directory, creating it if needed.
    pub fn open(path: PathBuf) -> TrigcamResult<Self> {
        std::fs::create_dir_all(&path)?;
        let next_run = highest_run(&path)?.map_or(0, |run| run + 1);
        tracing::info!(take = %path.display(), next_run, "Take directory ready");
        Ok(Self { path, next_run })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn next_run_index(&self) -> u32 {
        self.next_run
    }

    /// Claim the next run index and its output paths.
    ///
    /// The index is consumed even if the run later fails, so a partially
    /// written run is never overwritten.
    pub fn begin_run(
        &mut self,
        camera_names: &[String],
        codec: Codec,
    ) -> TrigcamResult<RecordingSession> {
        let run_index = self.next_run;
        let outputs: Vec<PathBuf> = camera_names
            .iter()
            .map(|name| video_path(&self.path, run_index, name, codec))
            .collect();
        if let Some(existing) = outputs.iter().find(|p| p.exists()) {
            return Err(TrigcamError::configuration(format!(
                "refusing to overwrite {}",
                existing.display()
            )));
        }
        self.next_run += 1;

        Ok(RecordingSession {
            take_dir: self.path.clone(),
            run_index,
            started_at: Local::now(),
            outputs,
        })
    }
}

/// Output paths and identity of one run.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub take_dir: PathBuf,
    pub run_index: u32,
    pub started_at: DateTime<Local>,
    /// One video per camera, in polling order.
    pub outputs: Vec<PathBuf>,
}

impl RecordingSession {
    pub fn report_path(&self) -> PathBuf {
        self.take_dir
            .join(format!("{}_report.json", run_prefix(self.run_index)))
    }
}

fn run_prefix(run_index: u32) -> String {
    format!("run{run_index:03}")
}

/// `run002_cam3.y4m`
pub fn video_path(take_dir: &Path, run_index: u32, camera_name: &str, codec: Codec) -> PathBuf {
    take_dir.join(format!(
        "{}_{camera_name}.{}",
        run_prefix(run_index),
        codec.extension()
    ))
}

/// Highest run index used by any file in `dir`.
fn highest_run(dir: &Path) -> TrigcamResult<Option<u32>> {
    let mut highest = None;
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(index) = name.to_str().and_then(parse_run_index) else {
            continue;
        };
        highest = highest.max(Some(index));
    }
    Ok(highest)
}

fn parse_run_index(file_name: &str) -> Option<u32> {
    let digits = file_name.strip_prefix("run")?.split('_').next()?;
    if digits.len() < 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn video_paths_follow_run_and_camera() {
        let path = video_path(Path::new("/data/take"), 2, "cam3", Codec::Y4m);
        assert_eq!(path, Path::new("/data/take/run002_cam3.y4m"));
        let path = video_path(Path::new("/data/take"), 1234, "top", Codec::H264Mkv);
        assert_eq!(path, Path::new("/data/take/run1234_top.mkv"));
    }

    #[test]
    fn run_index_parsing() {
        assert_eq!(parse_run_index("run007_cam0.y4m"), Some(7));
        assert_eq!(parse_run_index("run123_report.json"), Some(123));
        assert_eq!(parse_run_index("run1_cam0.y4m"), None);
        assert_eq!(parse_run_index("preview.png"), None);
        assert_eq!(parse_run_index("runabc_cam0.y4m"), None);
    }

    #[test]
    fn runs_are_numbered_consecutively() {
        let dir = tempfile::tempdir().unwrap();
        let mut take = TakeDirectory::open(dir.path().join("take_x")).unwrap();
        let first = take.begin_run(&names(&["cam0", "cam1"]), Codec::Y4m).unwrap();
        let second = take.begin_run(&names(&["cam0", "cam1"]), Codec::Y4m).unwrap();
        assert_eq!((first.run_index, second.run_index), (0, 1));
        assert_ne!(first.outputs, second.outputs);
        assert!(second.report_path().ends_with("run001_report.json"));
    }

    #[test]
    fn reopened_take_continues_numbering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take_y");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("run004_cam0.y4m"), b"").unwrap();
        let take = TakeDirectory::open(path).unwrap();
        assert_eq!(take.next_run_index(), 5);
    }

    #[test]
    fn take_directory_name_carries_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let clock = RecordingClock::start();
        let take = TakeDirectory::create(dir.path(), "take", &clock).unwrap();
        let name = take.path().file_name().unwrap().to_str().unwrap().to_string();
        assert_eq!(name, format!("take_{}", clock.take_stamp()));
        assert!(take.path().is_dir());
    }
}
