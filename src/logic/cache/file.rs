//! File cache backend
//!
//! Append-only text file, one batch per line. The file is created on the
//! first append and deleted on clear.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use super::CacheBackend;
use crate::logic::error::TelemetryResult;

pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// True when the file ends in the middle of a line (torn write)
    fn ends_without_newline(file: &mut File) -> std::io::Result<bool> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(false);
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut last)?;
        Ok(last[0] != b'\n')
    }
}

impl CacheBackend for FileBackend {
    fn append_line(&mut self, line: &str) -> TelemetryResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        let mut record = String::with_capacity(line.len() + 2);
        if Self::ends_without_newline(&mut file)? {
            record.push('\n');
        }
        record.push_str(line);
        record.push('\n');

        // One write per batch, then force it to disk
        file.write_all(record.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn read_raw(&self) -> TelemetryResult<Option<String>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn replace(&mut self, content: &str) -> TelemetryResult<()> {
        // Write aside, then rename over the old file
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(content.as_bytes())?;
            file.sync_data()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&mut self) -> TelemetryResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn has_data(&self) -> TelemetryResult<bool> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() > 0),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("file {:?}", self.path)
    }
}
