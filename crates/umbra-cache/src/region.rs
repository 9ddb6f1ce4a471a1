use crate::store::CacheStore;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use umbra_common::ChunkPos;

/// Chunks per region side.
pub const REGION_SIZE: i32 = 32;
const ENTRIES: usize = (REGION_SIZE * REGION_SIZE) as usize;
/// One `(offset, length)` pair of big endian u32s per chunk.
const HEADER_LEN: u64 = (ENTRIES * 8) as u64;

/// Region file store. Each file covers 32x32 chunks and starts with an index
/// of `(offset, length)` pairs, followed by zlib compressed records. Records
/// are appended; a rewritten chunk only moves its index entry.
pub struct RegionStore {
    directory: PathBuf,
    lock: Mutex<()>,
}

fn region_of(pos: ChunkPos) -> (i32, i32) {
    (pos.x.div_euclid(REGION_SIZE), pos.z.div_euclid(REGION_SIZE))
}

fn entry_of(pos: ChunkPos) -> u64 {
    let x = pos.x.rem_euclid(REGION_SIZE);
    let z = pos.z.rem_euclid(REGION_SIZE);
    ((z * REGION_SIZE + x) * 8) as u64
}

impl RegionStore {
    pub fn open(directory: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(directory.as_ref())?;
        Ok(Self {
            directory: directory.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn region_path(&self, pos: ChunkPos) -> PathBuf {
        let (x, z) = region_of(pos);
        self.directory.join(format!("r.{}.{}.umbra", x, z))
    }

    fn guard(&self) -> io::Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "region store lock poisoned"))
    }
}

fn read_entry(file: &mut File, pos: ChunkPos) -> io::Result<(u32, u32)> {
    file.seek(SeekFrom::Start(entry_of(pos)))?;
    let offset = file.read_u32::<BigEndian>()?;
    let length = file.read_u32::<BigEndian>()?;
    Ok((offset, length))
}

impl CacheStore for RegionStore {
    fn load(&self, pos: ChunkPos) -> io::Result<Option<Vec<u8>>> {
        let _guard = self.guard()?;
        let mut file = match File::open(self.region_path(pos)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        if file_len < HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "region file is shorter than its header",
            ));
        }
        let (offset, length) = read_entry(&mut file, pos)?;
        if length == 0 {
            return Ok(None);
        }
        if (offset as u64) < HEADER_LEN || offset as u64 + length as u64 > file_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("record of chunk {} lies outside its region file", pos),
            ));
        }
        file.seek(SeekFrom::Start(offset as u64))?;
        let mut compressed = vec![0u8; length as usize];
        file.read_exact(&mut compressed)?;

        let mut record = Vec::new();
        ZlibDecoder::new(Cursor::new(compressed)).read_to_end(&mut record)?;
        Ok(Some(record))
    }

    fn store(&self, pos: ChunkPos, record: &[u8]) -> io::Result<()> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(record)?;
        let compressed = encoder.finish()?;
        let length = u32::try_from(compressed.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "cache record too large"))?;

        let _guard = self.guard()?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.region_path(pos))?;
        if file.metadata()?.len() < HEADER_LEN {
            file.set_len(HEADER_LEN)?;
        }
        let end = file.seek(SeekFrom::End(0))?;
        let offset = u32::try_from(end)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "region file is full"))?;
        file.write_all(&compressed)?;

        file.seek(SeekFrom::Start(entry_of(pos)))?;
        file.write_u32::<BigEndian>(offset)?;
        file.write_u32::<BigEndian>(length)?;
        file.flush()
    }
}
