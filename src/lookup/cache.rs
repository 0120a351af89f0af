//! On-disk cache of distance lookup tables
//!
//! One JSON file per (tumour mask, brain mask, surface parameters) triple,
//! named by their CRC32 fingerprints. Files are written to a temporary file
//! in the cache directory and renamed into place, so concurrent writers
//! leave one complete file behind (last writer wins).

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{DirectionSample, DirectionTable, LookupTable};
use crate::error::{Result, VirtueError};
use crate::volume::Mask;

/// Bumped whenever the file layout or the sampling changes
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Content fingerprint of both masks and the surface parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub tumour: u32,
    pub brain: u32,
    pub params: u32,
}

fn mask_crc(mask: &Mask) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    let (nx, ny, nz) = mask.dims;
    for d in [nx, ny, nz] {
        hasher.update(&(d as u64).to_le_bytes());
    }
    let (vx, vy, vz) = mask.voxel_size;
    for v in [vx, vy, vz] {
        hasher.update(&v.to_le_bytes());
    }
    hasher.update(&mask.data);
    hasher.finalize()
}

impl Fingerprint {
    /// Fingerprint masks plus any serializable parameter set
    pub fn new<P: Serialize>(tumour: &Mask, brain: &Mask, params: &P) -> Result<Self> {
        let encoded = serde_json::to_vec(params)?;
        Ok(Self { tumour: mask_crc(tumour), brain: mask_crc(brain), params: crc32fast::hash(&encoded) })
    }

    pub fn file_name(&self) -> String {
        format!("lookup_{:08x}_{:08x}_{:08x}.json", self.tumour, self.brain, self.params)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    fingerprint: Fingerprint,
    origin: [f64; 3],
    tumour: Vec<DirectionSample>,
    brain: Vec<DirectionSample>,
}

/// Cache location for one fingerprint
#[derive(Debug, Clone)]
pub struct LookupCache {
    dir: PathBuf,
    fingerprint: Fingerprint,
}

impl LookupCache {
    pub fn new(dir: impl Into<PathBuf>, fingerprint: Fingerprint) -> Self {
        Self { dir: dir.into(), fingerprint }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(self.fingerprint.file_name())
    }

    /// Load a cached table
    ///
    /// `Ok(None)` is a miss: no file, or a file for another version,
    /// fingerprint or origin. Unreadable or malformed files are errors.
    pub fn load(&self, origin: [f64; 3]) -> Result<Option<LookupTable>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path).map_err(|e| VirtueError::io(&path, e))?;
        let cached: CacheFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| VirtueError::io(&path, format!("malformed cache file: {}", e)))?;

        if cached.version != CACHE_FORMAT_VERSION
            || cached.fingerprint != self.fingerprint
            || cached.origin != origin
        {
            return Ok(None);
        }

        Ok(Some(LookupTable {
            origin: cached.origin,
            tumour: DirectionTable::new(cached.tumour)?,
            brain: DirectionTable::new(cached.brain)?,
        }))
    }

    /// Persist a table atomically; returns the final path
    pub fn store(&self, table: &LookupTable) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| VirtueError::io(&self.dir, e))?;

        let record = CacheFile {
            version: CACHE_FORMAT_VERSION,
            fingerprint: self.fingerprint,
            origin: table.origin,
            tumour: table.tumour.samples().to_vec(),
            brain: table.brain.samples().to_vec(),
        };

        let path = self.path();
        let tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| VirtueError::io(&self.dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, &record).map_err(|e| VirtueError::io(tmp.path(), e))?;
            writer.flush().map_err(|e| VirtueError::io(tmp.path(), e))?;
        }
        tmp.persist(&path).map_err(|e| VirtueError::io(&path, e.error))?;

        Ok(path)
    }
}
