use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encode one record as `[len][bincode][crc32]`.
fn encode_record<T: Serialize>(writer: &mut impl Write, record: &T) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read one little-endian u32, or `None` at a clean or torn end of file.
fn read_u32(reader: &mut impl Read) -> io::Result<Option<u32>> {
    let mut buf = [0u8; 4];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(u32::from_le_bytes(buf))),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Decode records until the end of `reader` or the first torn or corrupt one.
fn read_records<T: DeserializeOwned>(reader: &mut impl Read, path: &Path) -> io::Result<Vec<T>> {
    let mut records = Vec::new();
    while let Some(len) = read_u32(reader)? {
        let mut payload = vec![0u8; len as usize];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
        let Some(stored_crc) = read_u32(reader)? else {
            break;
        };
        if stored_crc != crc32fast::hash(&payload) {
            tracing::warn!(path = %path.display(), "journal checksum mismatch, dropping tail");
            break;
        }
        match bincode::deserialize::<T>(&payload) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), "undecodable journal record, dropping tail: {e}");
                break;
            }
        }
    }
    Ok(records)
}

/// The file under the journal.
trait JournalFile: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl JournalFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write and sync `pending` after the first `durable_len` bytes of `file`,
/// returning the new durable length. On failure the file is cut back to
/// `durable_len` so no part of the batch survives.
fn commit(file: &mut impl JournalFile, pending: &[u8], durable_len: u64) -> io::Result<u64> {
    let written = file
        .write_all(pending)
        .and_then(|()| file.flush())
        .and_then(|()| file.sync());
    match written {
        Ok(()) => Ok(durable_len + pending.len() as u64),
        Err(e) => {
            if let Err(cut) = file.truncate(durable_len) {
                tracing::error!(len = durable_len, "journal truncate after failed write: {cut}");
            }
            Err(e)
        }
    }
}

/// Append-only journal.
///
/// Entry format: `[u32: len][bincode: record][u32: crc32 of record]`.
/// A torn or corrupt tail (crash mid-write) is dropped on replay.
pub struct Wal {
    file: File,
    /// Encoded records not yet handed to `commit`.
    pending: Vec<u8>,
    /// File length after the last successful flush.
    durable_len: u64,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let durable_len = file.metadata()?.len();
        Ok(Self {
            file,
            pending: Vec::new(),
            durable_len,
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append and fsync one record.
    #[cfg(test)]
    pub fn append<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        self.append_buffered(record)?;
        self.flush_sync()
    }

    /// Buffer a record; durable only after `flush_sync`.
    pub fn append_buffered<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        encode_record(&mut self.pending, record)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Write and fsync everything buffered. The buffer is emptied either way;
    /// after an error the file is back at its last durable length.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        let result = commit(&mut self.file, &self.pending, self.durable_len);
        self.pending.clear();
        self.durable_len = result?;
        Ok(())
    }

    /// Drop buffered records without writing them.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Rewrite the journal as exactly `records`: write a synced temp file,
    /// rename it over the live file, reopen for append.
    pub fn compact<T: Serialize>(&mut self, records: &[T]) -> io::Result<()> {
        self.flush_sync()?;
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for record in records {
                encode_record(&mut writer, record)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.durable_len = self.file.metadata()?.len();
        self.appends_since_compact = 0;
        Ok(())
    }

    /// All intact records in order. A missing file is an empty journal.
    pub fn replay<T: DeserializeOwned>(path: &Path) -> io::Result<Vec<T>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        read_records(&mut BufReader::new(file), path)
    }
}
