use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::progress::UploadProgress;
use crate::core::Route;

const ROUTE_FILE: &str = "route.json";
const PROGRESS_FILE: &str = "upload_progress.json";

/// Route and upload progress files under one directory.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// leaves either the old or the new record, never a torn one.
pub struct TrackStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl TrackStore {
    /// Creates the directory if it doesn't exist
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create track directory {:?}", dir))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_route(&self, route: &Route) -> Result<()> {
        self.write(ROUTE_FILE, route)
    }

    /// `None` if no route was ever saved
    pub fn load_route(&self) -> Result<Option<Route>> {
        self.read(ROUTE_FILE)
    }

    pub fn save_progress(&self, progress: &UploadProgress) -> Result<()> {
        self.write(PROGRESS_FILE, progress)
    }

    pub fn load_progress(&self) -> Result<Option<UploadProgress>> {
        self.read(PROGRESS_FILE)
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.dir.join(name);
        let temp = self.dir.join(format!("{}.tmp", name));

        let json = serde_json::to_string_pretty(value).with_context(|| format!("Failed to serialize {}", name))?;
        fs::write(&temp, json).with_context(|| format!("Failed to write {:?}", temp))?;
        fs::rename(&temp, &path).with_context(|| format!("Failed to move {:?} into place", path))?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let value = serde_json::from_str(&json).with_context(|| format!("Corrupt track file {:?}", path))?;
        Ok(Some(value))
    }
}
