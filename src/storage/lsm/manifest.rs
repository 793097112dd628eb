//! The `MANIFEST` file: a small text ledger of the WAL path and each
//! level's SST paths, read at recovery and rewritten whenever the on-disk
//! level layout changes. Format per §6:
//!
//! ```text
//! /abs/path/to/WAL
//! /abs/path/to/L0_SST_0,/abs/path/to/L0_SST_1
//! /abs/path/to/L1_SST_0,...
//! ...
//! ```
//!
//! The WAL itself is opened with an exclusive advisory lock via
//! `fs4::FileExt::try_lock_exclusive` -- a second process pointed at the
//! same directory fails fast instead of corrupting state.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::FileExt;

use crate::error::{Error, Result};

pub const MANIFEST_FILENAME: &str = "MANIFEST";
pub const WAL_FILENAME: &str = "WAL";

pub struct Manifest {
    dir: PathBuf,
    pub wal_path: PathBuf,
    _wal_file: File,
    /// One entry per level, L0 first; each entry is that level's SST paths.
    pub levels: Vec<Vec<PathBuf>>,
}

impl Manifest {
    /// Opens the manifest at `dir/MANIFEST`, creating `dir`, an empty WAL,
    /// and a fresh manifest if none exists yet.
    pub fn open_or_create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let manifest_path = dir.join(MANIFEST_FILENAME);

        if !manifest_path.exists() {
            fs::create_dir_all(&dir)?;
            let wal_path = dir.join(WAL_FILENAME);
            let wal_file = open_and_lock(&wal_path)?;
            let manifest = Manifest { dir, wal_path, _wal_file: wal_file, levels: Vec::new() };
            manifest.persist()?;
            return Ok(manifest);
        }

        let text = fs::read_to_string(&manifest_path)?;
        let mut lines = text.lines();
        let wal_path = PathBuf::from(
            lines.next().ok_or_else(|| Error::Manifest("MANIFEST is empty".into()))?,
        );
        let wal_file = open_and_lock(&wal_path)?;

        let levels = lines
            .map(|line| {
                if line.is_empty() {
                    Vec::new()
                } else {
                    line.split(',').map(PathBuf::from).collect()
                }
            })
            .collect();

        Ok(Manifest { dir, wal_path, _wal_file: wal_file, levels })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rewrites the MANIFEST file from the current in-memory level layout.
    pub fn persist(&self) -> Result<()> {
        let mut text = String::new();
        text.push_str(&self.wal_path.display().to_string());
        text.push('\n');
        for level in &self.levels {
            let joined =
                level.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(",");
            text.push_str(&joined);
            text.push('\n');
        }
        fs::write(self.dir.join(MANIFEST_FILENAME), text)?;
        Ok(())
    }

    pub fn set_levels(&mut self, levels: Vec<Vec<PathBuf>>) -> Result<()> {
        self.levels = levels;
        self.persist()
    }
}

fn open_and_lock(path: &Path) -> Result<File> {
    let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
    file.try_lock_exclusive().map_err(|e| Error::io_at(path, e))?;
    Ok(file)
}
