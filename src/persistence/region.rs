//! Region container format V1.
//!
//! File layout, all scalars little-endian:
//!
//! ```text
//! header (72 bytes)
//!   magic        8  "WFREGN1\0"
//!   version      u32
//!   face         i32
//!   i0, j0, k    i64 x3       tile origin and radial shell
//!   tile         i32          slots per side (32)
//!   chunk_vox    i32          chunk dimension (64)
//!   flags        u32
//!   toc_entries  u32          tile * tile
//!   toc_offset   u64
//!   data_offset  u64
//! toc (tile * tile entries, 24 bytes each)
//!   offset u64, size u32, usize u32, flags u32, checksum u32
//! blobs, appended past data_offset
//! ```
//!
//! A TOC entry with `flags` bit 0 set holds a delta blob, otherwise a chunk
//! blob. Readers reject blobs whose FNV-1a checksum disagrees with the TOC
//! and treat the slot as empty.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::constants::core::{OCC_WORDS, PALETTE_BPP, VOXELS_PER_CHUNK};
use crate::constants::region::{
    CHUNK_MAGIC, DELTA_MAGIC, REGION_MAGIC, REGION_TILE, REGION_VERSION, TOC_FLAG_DELTA,
};
use crate::error::{EngineError, EngineResult};
use crate::persistence::fnv1a32;
use crate::world::core::{FaceChunkKey, MaterialId};
use crate::world::storage::{Chunk64, ChunkDelta, DeltaEntry, DeltaMode, NO_OVERRIDE};

const HEADER_SIZE: u64 = 72;
const TOC_ENTRY_SIZE: u64 = 24;
const CHUNK_BLOB_HEADER_SIZE: usize = 24;
const DELTA_BLOB_HEADER_SIZE: usize = 20;

/// One table-of-contents slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TocEntry {
    pub offset: u64,
    pub size: u32,
    pub usize_: u32,
    pub flags: u32,
    pub checksum: u32,
}

struct RegionHeader {
    face: i32,
    i0: i64,
    j0: i64,
    k: i64,
    tile: i32,
    toc_entries: u32,
    toc_offset: u64,
    data_offset: u64,
}

/// Handle to a region tree rooted at one directory
#[derive(Debug, Clone)]
pub struct RegionStore {
    root: PathBuf,
    tile: i64,
}

impl RegionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tile: REGION_TILE,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tile origin and local slot indices for a chunk key
    pub fn region_coords(&self, key: &FaceChunkKey) -> (i64, i64, usize, usize) {
        let i0 = key.i.div_euclid(self.tile) * self.tile;
        let j0 = key.j.div_euclid(self.tile) * self.tile;
        (i0, j0, (key.i - i0) as usize, (key.j - j0) as usize)
    }

    /// Path layout: `{root}/face{f}/k{k}/r_{i0}_{j0}.wfr`
    pub fn region_path(&self, key: &FaceChunkKey) -> PathBuf {
        let (i0, j0, _, _) = self.region_coords(key);
        self.root
            .join(format!("face{}", key.face))
            .join(format!("k{}", key.k))
            .join(format!("r_{}_{}.wfr", i0, j0))
    }

    /// Persist a chunk into its region slot. False on any IO failure.
    pub fn save_chunk(&self, key: &FaceChunkKey, chunk: &Chunk64) -> bool {
        let blob = encode_chunk_blob(chunk);
        self.write_blob(key, &blob, 0)
    }

    /// Load a chunk from its region slot. On failure `out` is reset to a
    /// valid empty chunk and false is returned.
    pub fn load_chunk(&self, key: &FaceChunkKey, out: &mut Chunk64) -> bool {
        match self.read_blob(key, false) {
            Ok(Some(blob)) => {
                if decode_chunk_blob(&blob, out) {
                    true
                } else {
                    log::warn!("[region] rejecting chunk blob for {:?}", key);
                    out.clear();
                    false
                }
            }
            Ok(None) => {
                out.clear();
                false
            }
            Err(err) => {
                log::warn!("[region] {}", err);
                out.clear();
                false
            }
        }
    }

    /// Persist a delta into its region slot. An empty delta clears the slot.
    pub fn save_chunk_delta(&self, key: &FaceChunkKey, delta: &ChunkDelta) -> bool {
        if delta.is_empty() {
            return self.clear_slot(key);
        }
        let blob = encode_delta_blob(delta);
        self.write_blob(key, &blob, TOC_FLAG_DELTA)
    }

    /// Load a delta from its region slot. On failure `out` is cleared and
    /// false is returned.
    pub fn load_chunk_delta(&self, key: &FaceChunkKey, out: &mut ChunkDelta) -> bool {
        match self.read_blob(key, true) {
            Ok(Some(blob)) => {
                if decode_delta_blob(&blob, out) {
                    true
                } else {
                    log::warn!("[region] rejecting delta blob for {:?}", key);
                    out.clear(DeltaMode::Sparse);
                    false
                }
            }
            Ok(None) => {
                out.clear(DeltaMode::Sparse);
                false
            }
            Err(err) => {
                log::warn!("[region] {}", err);
                out.clear(DeltaMode::Sparse);
                false
            }
        }
    }

    fn open_rw(&self, path: &Path) -> Option<File> {
        if let Some(dir) = path.parent() {
            if fs::create_dir_all(dir).is_err() {
                return None;
            }
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .ok()
    }

    /// Read-or-initialize the header for `key`'s region, returning the
    /// header plus slot index. Initializes header + zero TOC in new files.
    fn prepare_file(&self, file: &mut File, key: &FaceChunkKey) -> Option<(RegionHeader, usize)> {
        let (i0, j0, ti, tj) = self.region_coords(key);
        let slot = tj * self.tile as usize + ti;

        let len = file.seek(SeekFrom::End(0)).ok()?;
        if len >= HEADER_SIZE {
            file.seek(SeekFrom::Start(0)).ok()?;
            match read_header(file) {
                Ok(header) => {
                    if header.face == key.face as i32
                        && header.k == key.k
                        && header.i0 == i0
                        && header.j0 == j0
                        && header.tile == self.tile as i32
                    {
                        return Some((header, slot));
                    }
                    log::warn!(
                        "[region] header mismatch in {}: wrong tile identity",
                        self.region_path(key).display()
                    );
                    return None;
                }
                Err(err) => {
                    // Unparseable header (torn write): reinitialize in place
                    log::warn!(
                        "[region] reinitializing {} after header corruption: {}",
                        self.region_path(key).display(),
                        err
                    );
                    file.seek(SeekFrom::Start(0)).ok()?;
                }
            }
        }

        // Fresh or recovered file: emit header and zero-filled TOC
        let toc_entries = (self.tile * self.tile) as u32;
        let header = RegionHeader {
            face: key.face as i32,
            i0,
            j0,
            k: key.k,
            tile: self.tile as i32,
            toc_entries,
            toc_offset: HEADER_SIZE,
            data_offset: HEADER_SIZE + TOC_ENTRY_SIZE * toc_entries as u64,
        };
        file.seek(SeekFrom::Start(0)).ok()?;
        write_header(file, &header)?;
        let zeros = vec![0u8; (TOC_ENTRY_SIZE * toc_entries as u64) as usize];
        file.write_all(&zeros).ok()?;
        Some((header, slot))
    }

    fn write_blob(&self, key: &FaceChunkKey, blob: &[u8], flags: u32) -> bool {
        let path = self.region_path(key);
        let Some(mut file) = self.open_rw(&path) else {
            log::warn!("[region] cannot open {} for writing", path.display());
            return false;
        };
        let Some((header, slot)) = self.prepare_file(&mut file, key) else {
            return false;
        };
        if slot as u32 >= header.toc_entries {
            return false;
        }

        let Ok(offset) = file.seek(SeekFrom::End(0)) else {
            return false;
        };
        if file.write_all(blob).is_err() {
            return false;
        }

        let entry = TocEntry {
            offset,
            size: blob.len() as u32,
            usize_: blob.len() as u32,
            flags,
            checksum: fnv1a32(blob),
        };
        write_toc_entry(&mut file, &header, slot, &entry)
    }

    fn clear_slot(&self, key: &FaceChunkKey) -> bool {
        let path = self.region_path(key);
        let Some(mut file) = self.open_rw(&path) else {
            return false;
        };
        let Some((header, slot)) = self.prepare_file(&mut file, key) else {
            return false;
        };
        write_toc_entry(&mut file, &header, slot, &TocEntry::default())
    }

    /// Read one slot's blob. `Ok(None)` is a clean miss (no file, empty
    /// slot, or the other blob kind); `Err` is corruption worth reporting.
    fn read_blob(&self, key: &FaceChunkKey, want_delta: bool) -> EngineResult<Option<Vec<u8>>> {
        let path = self.region_path(key);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(EngineError::io(path.display().to_string(), err)),
        };
        let header = read_header(&mut file)?;

        let (i0, j0, ti, tj) = self.region_coords(key);
        if header.face != key.face as i32
            || header.k != key.k
            || header.i0 != i0
            || header.j0 != j0
        {
            return Err(EngineError::corrupt(format!(
                "tile identity mismatch in {}",
                path.display()
            )));
        }
        let slot = tj * header.tile as usize + ti;
        if slot as u32 >= header.toc_entries {
            return Ok(None);
        }

        file.seek(SeekFrom::Start(header.toc_offset + TOC_ENTRY_SIZE * slot as u64))
            .map_err(|e| EngineError::io(path.display().to_string(), e))?;
        let mut raw = [0u8; TOC_ENTRY_SIZE as usize];
        file.read_exact(&mut raw)
            .map_err(|e| EngineError::io(path.display().to_string(), e))?;
        let entry = parse_toc_entry(&raw);

        if entry.offset == 0 || entry.size == 0 {
            return Ok(None);
        }
        if want_delta != (entry.flags & TOC_FLAG_DELTA != 0) {
            return Ok(None);
        }
        if entry.offset < header.data_offset {
            return Err(EngineError::corrupt(format!(
                "blob offset {} inside header/TOC of {}",
                entry.offset,
                path.display()
            )));
        }

        let mut blob = vec![0u8; entry.size as usize];
        if file.seek(SeekFrom::Start(entry.offset)).is_err() || file.read_exact(&mut blob).is_err()
        {
            // A torn append from a crashed writer reads as a miss
            return Err(EngineError::corrupt(format!(
                "truncated blob for {:?} in {}",
                key,
                path.display()
            )));
        }

        let computed = fnv1a32(&blob);
        if computed != entry.checksum {
            return Err(EngineError::ChecksumMismatch {
                key: *key,
                expected: entry.checksum,
                computed,
            });
        }
        Ok(Some(blob))
    }
}

// ---------------------------------------------------------------------------
// header / TOC serialization

fn read_header(file: &mut File) -> EngineResult<RegionHeader> {
    let mut raw = [0u8; HEADER_SIZE as usize];
    file.read_exact(&mut raw)
        .map_err(|e| EngineError::io("region header", e))?;
    if raw[0..7] != REGION_MAGIC[0..7] {
        return Err(EngineError::corrupt("bad region magic"));
    }
    let version = u32::from_le_bytes(raw[8..12].try_into().unwrap());
    if version != REGION_VERSION {
        return Err(EngineError::VersionMismatch {
            expected: REGION_VERSION,
            found: version,
        });
    }
    let header = RegionHeader {
        face: i32::from_le_bytes(raw[12..16].try_into().unwrap()),
        i0: i64::from_le_bytes(raw[16..24].try_into().unwrap()),
        j0: i64::from_le_bytes(raw[24..32].try_into().unwrap()),
        k: i64::from_le_bytes(raw[32..40].try_into().unwrap()),
        tile: i32::from_le_bytes(raw[40..44].try_into().unwrap()),
        toc_entries: u32::from_le_bytes(raw[48..52].try_into().unwrap()),
        toc_offset: u64::from_le_bytes(raw[56..64].try_into().unwrap()),
        data_offset: u64::from_le_bytes(raw[64..72].try_into().unwrap()),
    };
    if header.tile <= 0 || header.toc_entries != (header.tile * header.tile) as u32 {
        return Err(EngineError::corrupt("inconsistent region TOC geometry"));
    }
    Ok(header)
}

fn write_header(file: &mut File, header: &RegionHeader) -> Option<()> {
    let mut raw = [0u8; HEADER_SIZE as usize];
    raw[0..8].copy_from_slice(REGION_MAGIC);
    raw[8..12].copy_from_slice(&REGION_VERSION.to_le_bytes());
    raw[12..16].copy_from_slice(&header.face.to_le_bytes());
    raw[16..24].copy_from_slice(&header.i0.to_le_bytes());
    raw[24..32].copy_from_slice(&header.j0.to_le_bytes());
    raw[32..40].copy_from_slice(&header.k.to_le_bytes());
    raw[40..44].copy_from_slice(&header.tile.to_le_bytes());
    raw[44..48].copy_from_slice(&(Chunk64::N as i32).to_le_bytes());
    // flags at 52..56 stay zero
    raw[48..52].copy_from_slice(&header.toc_entries.to_le_bytes());
    raw[56..64].copy_from_slice(&header.toc_offset.to_le_bytes());
    raw[64..72].copy_from_slice(&header.data_offset.to_le_bytes());
    file.write_all(&raw).ok()
}

fn parse_toc_entry(raw: &[u8; TOC_ENTRY_SIZE as usize]) -> TocEntry {
    TocEntry {
        offset: u64::from_le_bytes(raw[0..8].try_into().unwrap()),
        size: u32::from_le_bytes(raw[8..12].try_into().unwrap()),
        usize_: u32::from_le_bytes(raw[12..16].try_into().unwrap()),
        flags: u32::from_le_bytes(raw[16..20].try_into().unwrap()),
        checksum: u32::from_le_bytes(raw[20..24].try_into().unwrap()),
    }
}

fn write_toc_entry(file: &mut File, header: &RegionHeader, slot: usize, entry: &TocEntry) -> bool {
    let mut raw = [0u8; TOC_ENTRY_SIZE as usize];
    raw[0..8].copy_from_slice(&entry.offset.to_le_bytes());
    raw[8..12].copy_from_slice(&entry.size.to_le_bytes());
    raw[12..16].copy_from_slice(&entry.usize_.to_le_bytes());
    raw[16..20].copy_from_slice(&entry.flags.to_le_bytes());
    raw[20..24].copy_from_slice(&entry.checksum.to_le_bytes());
    if file
        .seek(SeekFrom::Start(
            header.toc_offset + TOC_ENTRY_SIZE * slot as u64,
        ))
        .is_err()
    {
        return false;
    }
    file.write_all(&raw).is_ok() && file.flush().is_ok()
}

// ---------------------------------------------------------------------------
// chunk blob

fn encode_chunk_blob(chunk: &Chunk64) -> Vec<u8> {
    let palette_count = chunk.palette.len() as u16;
    let indices_bytes = VOXELS_PER_CHUNK;
    let mut blob = Vec::with_capacity(
        CHUNK_BLOB_HEADER_SIZE + palette_count as usize * 2 + indices_bytes + OCC_WORDS * 8,
    );

    blob.extend_from_slice(CHUNK_MAGIC);
    blob.extend_from_slice(&1u32.to_le_bytes());
    blob.extend_from_slice(&palette_count.to_le_bytes());
    blob.push(PALETTE_BPP as u8);
    blob.push(0); // reserved
    blob.extend_from_slice(&(indices_bytes as u32).to_le_bytes());
    blob.extend_from_slice(&(OCC_WORDS as u32).to_le_bytes());

    for mat in &chunk.palette {
        blob.extend_from_slice(&mat.0.to_le_bytes());
    }
    for i in 0..VOXELS_PER_CHUNK {
        blob.push(chunk.indices.get(i as u32) as u8);
    }
    for word in chunk.occ.iter() {
        blob.extend_from_slice(&word.to_le_bytes());
    }
    blob
}

fn decode_chunk_blob(blob: &[u8], out: &mut Chunk64) -> bool {
    if blob.len() < CHUNK_BLOB_HEADER_SIZE {
        return false;
    }
    if blob[0..6] != CHUNK_MAGIC[0..6] {
        return false;
    }
    let version = u32::from_le_bytes(blob[8..12].try_into().unwrap());
    if version != 1 {
        return false;
    }
    let palette_count = u16::from_le_bytes(blob[12..14].try_into().unwrap()) as usize;
    let bpp = blob[14];
    let indices_bytes = u32::from_le_bytes(blob[16..20].try_into().unwrap()) as usize;
    let occ_words = u32::from_le_bytes(blob[20..24].try_into().unwrap()) as usize;

    if bpp != PALETTE_BPP as u8 || indices_bytes != VOXELS_PER_CHUNK {
        return false;
    }

    let mut p = CHUNK_BLOB_HEADER_SIZE;
    if blob.len() < p + palette_count * 2 {
        return false;
    }
    out.clear();
    out.palette.reserve(palette_count);
    for _ in 0..palette_count {
        let mat = u16::from_le_bytes(blob[p..p + 2].try_into().unwrap());
        out.palette.push(MaterialId(mat));
        p += 2;
    }
    out.rebuild_palette_lut();

    if blob.len() < p + indices_bytes {
        return false;
    }
    for i in 0..VOXELS_PER_CHUNK {
        out.indices.set(i as u32, blob[p + i] as u32);
    }
    p += indices_bytes;

    let occ_bytes = occ_words * 8;
    if blob.len() < p + occ_bytes {
        return false;
    }
    for w in 0..occ_words.min(OCC_WORDS) {
        out.occ[w] = u64::from_le_bytes(blob[p + w * 8..p + w * 8 + 8].try_into().unwrap());
    }

    out.dirty_mesh = true;
    true
}

// ---------------------------------------------------------------------------
// delta blob

fn encode_delta_blob(delta: &ChunkDelta) -> Vec<u8> {
    let (entry_count, mode) = match delta.mode {
        DeltaMode::Dense => (delta.dense.len() as u32, 1u32),
        DeltaMode::Sparse => (delta.entries.len() as u32, 0u32),
    };

    let payload = match delta.mode {
        DeltaMode::Dense => entry_count as usize * 2,
        DeltaMode::Sparse => entry_count as usize * 8,
    };
    let mut blob = Vec::with_capacity(DELTA_BLOB_HEADER_SIZE + payload);

    blob.extend_from_slice(DELTA_MAGIC);
    blob.extend_from_slice(&1u32.to_le_bytes());
    blob.extend_from_slice(&entry_count.to_le_bytes());
    blob.extend_from_slice(&mode.to_le_bytes());

    match delta.mode {
        DeltaMode::Dense => {
            for &mat in &delta.dense {
                blob.extend_from_slice(&mat.to_le_bytes());
            }
        }
        DeltaMode::Sparse => {
            for e in &delta.entries {
                blob.extend_from_slice(&e.index.to_le_bytes());
                blob.extend_from_slice(&e.material.to_le_bytes());
                blob.extend_from_slice(&0u16.to_le_bytes()); // pad
            }
        }
    }
    blob
}

fn decode_delta_blob(blob: &[u8], out: &mut ChunkDelta) -> bool {
    if blob.len() < DELTA_BLOB_HEADER_SIZE {
        return false;
    }
    if blob[0..6] != DELTA_MAGIC[0..6] {
        return false;
    }
    let version = u32::from_le_bytes(blob[8..12].try_into().unwrap());
    if version != 1 {
        return false;
    }
    let entry_count = u32::from_le_bytes(blob[12..16].try_into().unwrap()) as usize;
    let mode = u32::from_le_bytes(blob[16..20].try_into().unwrap());

    let p = DELTA_BLOB_HEADER_SIZE;
    if mode == 1 {
        let bytes = entry_count * 2;
        if blob.len() < p + bytes {
            return false;
        }
        out.clear(DeltaMode::Dense);
        out.dense.reserve(entry_count);
        out.override_count = 0;
        for i in 0..entry_count {
            let mat = u16::from_le_bytes(blob[p + i * 2..p + i * 2 + 2].try_into().unwrap());
            if mat != NO_OVERRIDE {
                out.override_count += 1;
            }
            out.dense.push(mat);
        }
    } else {
        let bytes = entry_count * 8;
        if blob.len() < p + bytes {
            return false;
        }
        out.clear(DeltaMode::Sparse);
        out.entries.reserve(entry_count);
        for i in 0..entry_count {
            let base = p + i * 8;
            out.entries.push(DeltaEntry {
                index: u32::from_le_bytes(blob[base..base + 4].try_into().unwrap()),
                material: u16::from_le_bytes(blob[base + 4..base + 6].try_into().unwrap()),
            });
        }
        // Keep the sparse invariant: entries sorted by voxel index
        out.entries.sort_unstable_by_key(|e| e.index);
        out.override_count = out.entries.len() as u32;
    }
    out.dirty = false;
    true
}
