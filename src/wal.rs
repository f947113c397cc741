use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode a single event as `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read `buf.len()` bytes. `Ok(false)` on a clean or torn EOF.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decode the next entry. `Ok(None)` marks the end of the valid prefix:
/// EOF, a torn tail, a CRC mismatch or an undecodable payload.
fn read_entry(reader: &mut impl Read) -> io::Result<Option<Event>> {
    let mut len_buf = [0u8; 4];
    if !read_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    if !read_or_eof(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_or_eof(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload).ok())
}

/// Sink for committed frames. A failed commit is undone by cutting the log
/// back to its last good length.
pub trait LogFile: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

#[derive(Debug)]
struct CommitFailure {
    error: io::Error,
    rolled_back: bool,
}

/// Write and sync `frames`. On failure nothing past `committed` survives,
/// unless the truncate itself fails.
fn commit_or_rollback(out: &mut impl LogFile, committed: u64, frames: &[u8]) -> Result<(), CommitFailure> {
    let result = out.write_all(frames).and_then(|()| out.flush()).and_then(|()| out.sync());
    let Err(error) = result else { return Ok(()) };
    let rolled_back = match out.truncate(committed) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("WAL rollback to {committed} bytes failed: {e}");
            false
        }
    };
    Err(CommitFailure { error, rolled_back })
}

/// Append-only write-ahead log of reservation-system events.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`.
/// A torn final entry left by a crash is discarded on replay.
pub struct Wal {
    file: File,
    path: PathBuf,
    /// Bytes known to hold only whole, acknowledged entries.
    committed_len: u64,
    appends_since_compact: u64,
    /// Set when a rollback failed; the tail may hold a partial batch.
    poisoned: bool,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let committed_len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            committed_len,
            appends_since_compact: 0,
            poisoned: false,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_batch([event])
    }

    /// Encode every event, then write and fsync them as one unit. Either the
    /// whole batch is durable or none of it is left in the file.
    pub fn append_batch<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other("WAL tail is damaged; reopen to recover"));
        }
        let mut frames = Vec::new();
        let mut count = 0;
        for event in events {
            encode_event(&mut frames, event)?;
            count += 1;
        }

        match commit_or_rollback(&mut self.file, self.committed_len, &frames) {
            Ok(()) => {
                self.committed_len += frames.len() as u64;
                self.appends_since_compact += count;
                Ok(())
            }
            Err(failure) => {
                self.poisoned = !failure.rolled_back;
                Err(failure.error)
            }
        }
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Rewrite the log as `events` via temp file + rename, then reopen for append.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                encode_event(&mut writer, event)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.committed_len = self.file.metadata()?.len();
        self.appends_since_compact = 0;
        self.poisoned = false;
        Ok(())
    }

    /// Replay every valid event. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        while let Some(event) = read_entry(&mut reader)? {
            events.push(event);
        }
        Ok(events)
    }
}
