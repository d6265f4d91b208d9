//! Unknown-person snapshots written as timestamped JPEGs.

use std::io;
use std::path::{Path, PathBuf};
use warden_core::ports::SnapshotWriter;
use warden_hw::Frame;

pub struct SnapshotDir {
    dir: PathBuf,
}

impl SnapshotDir {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// `unknown_person_YYYYmmdd_HHMMSS.jpg` for the given local time.
    fn file_name(at: chrono::DateTime<chrono::Local>) -> String {
        format!("unknown_person_{}.jpg", at.format("%Y%m%d_%H%M%S"))
    }
}

impl SnapshotWriter<Frame> for SnapshotDir {
    fn save(&self, frame: &Frame) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(Self::file_name(chrono::Local::now()));
        frame.save_jpeg(&path).map_err(io::Error::other)?;
        Ok(path)
    }
}
