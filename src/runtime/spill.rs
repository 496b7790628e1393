//! `PersistSpill` overflow backing store: a FIFO of length-framed records on disk
//! (`[u32 length][payload]`). No teacher analogue -- `persistence.rs`'s own
//! `save_snapshot`/`load_snapshot` just writes one whole `StateSnapshot` as pretty-printed
//! JSON; a bounded spill ring needs incremental FIFO writes and reads instead, so this
//! framing is new.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StreamSqlError};

pub struct SpillRing {
    path: PathBuf,
    file: File,
    write_offset: u64,
    read_offset: u64,
    max_bytes: u64,
}

impl SpillRing {
    pub fn open(path: &Path, max_bytes: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| StreamSqlError::Fatal(format!("opening spill file {}: {e}", path.display())))?;
        let len = file
            .metadata()
            .map_err(|e| StreamSqlError::Fatal(format!("stat spill file: {e}")))?
            .len();
        Ok(Self { path: path.to_path_buf(), file, write_offset: len, read_offset: 0, max_bytes })
    }

    pub fn write<T: serde::Serialize>(&mut self, item: &T) -> Result<()> {
        if self.write_offset >= self.max_bytes {
            return Err(StreamSqlError::Fatal(format!("spill file {} at capacity", self.path.display())));
        }
        let payload = serde_json::to_vec(item).map_err(|e| StreamSqlError::Fatal(e.to_string()))?;
        self.file
            .seek(SeekFrom::Start(self.write_offset))
            .map_err(|e| StreamSqlError::Fatal(e.to_string()))?;
        let len = payload.len() as u32;
        self.file.write_all(&len.to_le_bytes()).map_err(|e| StreamSqlError::Fatal(e.to_string()))?;
        self.file.write_all(&payload).map_err(|e| StreamSqlError::Fatal(e.to_string()))?;
        self.write_offset += 4 + payload.len() as u64;
        Ok(())
    }

    /// Pops the oldest still-unread record, if any. Once the reader catches all the way up
    /// to the writer, the file is truncated back to empty to bound disk usage.
    pub fn read_next<T: serde::de::DeserializeOwned>(&mut self) -> Result<Option<T>> {
        if self.read_offset >= self.write_offset {
            return Ok(None);
        }
        self.file
            .seek(SeekFrom::Start(self.read_offset))
            .map_err(|e| StreamSqlError::Fatal(e.to_string()))?;
        let mut len_buf = [0u8; 4];
        self.file.read_exact(&mut len_buf).map_err(|e| StreamSqlError::Fatal(e.to_string()))?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        self.file.read_exact(&mut payload).map_err(|e| StreamSqlError::Fatal(e.to_string()))?;
        self.read_offset += 4 + len as u64;
        let item = serde_json::from_slice(&payload).map_err(|e| StreamSqlError::Fatal(e.to_string()))?;
        if self.read_offset >= self.write_offset {
            self.file.set_len(0).ok();
            self.read_offset = 0;
            self.write_offset = 0;
        }
        Ok(Some(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Rec {
        id: u32,
    }

    #[test]
    fn fifo_roundtrip_then_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spill.bin");
        let mut ring = SpillRing::open(&path, 1024).unwrap();
        ring.write(&Rec { id: 1 }).unwrap();
        ring.write(&Rec { id: 2 }).unwrap();
        assert_eq!(ring.read_next::<Rec>().unwrap(), Some(Rec { id: 1 }));
        assert_eq!(ring.read_next::<Rec>().unwrap(), Some(Rec { id: 2 }));
        assert_eq!(ring.read_next::<Rec>().unwrap(), None);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}
