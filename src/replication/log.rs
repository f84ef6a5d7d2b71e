//! Built-in single-node command log.
//!
//! [`LogApplier`] conforms to the [`Applier`](super::Applier) contract for a
//! node running without an external consensus engine. Writes are framed as
//! length-prefixed RESP arrays and appended to segment files before the
//! mutation runs; on startup the log is replayed past the last applied
//! index, which makes the store's relaxed durability safe.
//!
//! Every write command is idempotent when re-applied on top of a correct
//! prior state, so the applied index only needs to be a floor: a crash
//! between append and apply, or a lost applied-index update, results in an
//! at-least-once replay tail rather than corruption.
//!
//! Reads are served locally at every consistency level; the configured
//! level is recorded for the day an actual cluster engine replaces this
//! applier.

use super::{Applier, Mutate, Outcome, Respond};
use crate::core::config::{Consistency, Durability, LogBackend};
use crate::core::error::{NodeError, NodeResult};
use crate::machine::Machine;
use crate::protocol::{encode_to_vec, Command, ParseResult, RespParser, RespValue};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Maximum segment size before rotation (64 MB).
const SEGMENT_MAX_SIZE: u64 = 64 * 1024 * 1024;

/// With background durability, fsync once per this many appends.
const BACKGROUND_SYNC_INTERVAL: u64 = 32;

/// File holding the applied-index floor.
const APPLIED_FILE: &str = "applied";

/// Options for opening the command log.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log backend.
    pub backend: LogBackend,
    /// Directory for segment files (file backend only).
    pub dir: PathBuf,
    /// Fsync policy.
    pub durability: Durability,
    /// Read consistency level.
    pub consistency: Consistency,
}

/// Single-node command log applier.
pub struct LogApplier {
    inner: Mutex<LogInner>,
    consistency: Consistency,
}

struct LogInner {
    backend: Backend,
    durability: Durability,
    /// Index of the last appended entry; entries are numbered from 1.
    last_index: u64,
    /// Entries at or below this index have been applied to the store.
    applied: u64,
    appends_since_sync: u64,
}

enum Backend {
    File(FileLog),
    Memory(MemoryLog),
}

impl LogApplier {
    /// Open the log, creating its directory if needed.
    pub fn open(options: LogOptions) -> NodeResult<Self> {
        let (backend, last_index, applied) = match options.backend {
            LogBackend::File => {
                let log = FileLog::open(&options.dir)?;
                let last_index = log.entry_count;
                let applied = log.read_applied()?;
                (Backend::File(log), last_index, applied)
            }
            LogBackend::Memory => (Backend::Memory(MemoryLog::default()), 0, 0),
        };
        info!(
            backend = %options.backend,
            durability = %options.durability,
            last_index,
            applied,
            "opened command log"
        );
        Ok(Self {
            inner: Mutex::new(LogInner {
                backend,
                durability: options.durability,
                last_index,
                applied,
                appends_since_sync: 0,
            }),
            consistency: options.consistency,
        })
    }

    /// The configured read consistency level.
    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    /// Index of the last appended entry.
    pub fn last_index(&self) -> u64 {
        self.inner.lock().last_index
    }

    /// Applied-index floor.
    pub fn applied_index(&self) -> u64 {
        self.inner.lock().applied
    }

    /// Re-apply logged entries above the applied floor to `machine`.
    /// Returns the number of entries replayed.
    pub fn replay(&self, machine: &Machine) -> NodeResult<u64> {
        let mut inner = self.inner.lock();
        let floor = inner.applied;
        let entries = inner.backend.entries_after(floor)?;
        let mut replayed = 0u64;
        for (index, cmd) in entries {
            machine.apply_logged(&cmd)?;
            inner.mark_applied(index)?;
            replayed += 1;
        }
        if replayed > 0 {
            info!(replayed, "replayed command log");
        }
        Ok(replayed)
    }
}

impl Applier for LogApplier {
    fn apply(
        &self,
        cmd: &Command,
        mutate: Option<Mutate<'_>>,
        respond: Respond<'_>,
    ) -> NodeResult<RespValue> {
        match mutate {
            Some(mutate) => {
                // The lock is held across the mutation so log order equals
                // apply order.
                let mut inner = self.inner.lock();
                let index = inner.append(cmd)?;
                let outcome = mutate()?;
                inner.mark_applied(index)?;
                drop(inner);
                respond(outcome)
            }
            None => respond(Outcome::Unit),
        }
    }
}

impl LogInner {
    fn append(&mut self, cmd: &Command) -> NodeResult<u64> {
        let frame = encode_to_vec(&cmd.to_resp());
        self.backend.append(&frame)?;
        self.last_index += 1;

        match self.durability {
            Durability::Strict => self.backend.sync()?,
            Durability::Background => {
                self.appends_since_sync += 1;
                if self.appends_since_sync >= BACKGROUND_SYNC_INTERVAL {
                    self.backend.sync()?;
                    self.appends_since_sync = 0;
                }
            }
            Durability::Relaxed => {}
        }

        Ok(self.last_index)
    }

    fn mark_applied(&mut self, index: u64) -> NodeResult<()> {
        self.applied = index;
        self.backend.write_applied(index)
    }
}

impl Backend {
    fn append(&mut self, frame: &[u8]) -> NodeResult<()> {
        match self {
            Self::File(log) => log.append(frame),
            Self::Memory(log) => {
                log.frames.push(frame.to_vec());
                Ok(())
            }
        }
    }

    fn sync(&mut self) -> NodeResult<()> {
        match self {
            Self::File(log) => log.sync(),
            Self::Memory(_) => Ok(()),
        }
    }

    fn write_applied(&mut self, index: u64) -> NodeResult<()> {
        match self {
            Self::File(log) => log.write_applied(index),
            // The in-memory log has no persistence; the floor lives in
            // LogInner for the life of the process.
            Self::Memory(_) => Ok(()),
        }
    }

    /// Decode entries with index greater than `floor`, in log order.
    fn entries_after(&self, floor: u64) -> NodeResult<Vec<(u64, Command)>> {
        let frames = match self {
            Self::File(log) => log.read_frames()?,
            Self::Memory(log) => log.frames.clone(),
        };
        let mut entries = Vec::new();
        for (i, frame) in frames.iter().enumerate() {
            let index = i as u64 + 1;
            if index <= floor {
                continue;
            }
            entries.push((index, decode_frame(frame)?));
        }
        Ok(entries)
    }
}

fn decode_frame(frame: &[u8]) -> NodeResult<Command> {
    match RespParser::new().parse(frame) {
        ParseResult::Complete(value, _) => Command::from_resp(value),
        _ => Err(NodeError::Protocol(
            "corrupt replication log entry".to_string(),
        )),
    }
}

/// Segmented file log.
struct FileLog {
    dir: PathBuf,
    current: File,
    current_path: PathBuf,
    current_size: u64,
    segment_counter: u64,
    entry_count: u64,
}

impl FileLog {
    fn open(dir: &Path) -> NodeResult<Self> {
        std::fs::create_dir_all(dir)?;

        let mut segments = list_segments(dir)?;
        segments.sort();

        let mut entry_count = 0u64;
        for path in &segments {
            entry_count += count_frames(path)?;
        }

        let segment_counter = segments
            .last()
            .and_then(|p| segment_id(p))
            .unwrap_or(0);
        let current_path = segments
            .last()
            .cloned()
            .unwrap_or_else(|| segment_path(dir, 0));
        let current = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current_path)?;
        let current_size = current.metadata()?.len();

        debug!(
            dir = %dir.display(),
            segments = segments.len().max(1),
            entry_count,
            "opened log segments"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            current,
            current_path,
            current_size,
            segment_counter,
            entry_count,
        })
    }

    fn append(&mut self, frame: &[u8]) -> NodeResult<()> {
        if self.current_size >= SEGMENT_MAX_SIZE {
            self.rotate()?;
        }
        self.current.write_u32::<LittleEndian>(frame.len() as u32)?;
        self.current.write_all(frame)?;
        self.current_size += 4 + frame.len() as u64;
        self.entry_count += 1;
        Ok(())
    }

    fn rotate(&mut self) -> NodeResult<()> {
        self.current.sync_data()?;
        self.segment_counter += 1;
        self.current_path = segment_path(&self.dir, self.segment_counter);
        self.current = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_path)?;
        self.current_size = 0;
        debug!(path = %self.current_path.display(), "rotated log segment");
        Ok(())
    }

    fn sync(&mut self) -> NodeResult<()> {
        self.current.sync_data()?;
        Ok(())
    }

    fn write_applied(&mut self, index: u64) -> NodeResult<()> {
        let mut file = File::create(self.dir.join(APPLIED_FILE))?;
        file.write_u64::<LittleEndian>(index)?;
        Ok(())
    }

    fn read_applied(&self) -> NodeResult<u64> {
        let path = self.dir.join(APPLIED_FILE);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        // A torn applied file only lowers the floor; replay is idempotent.
        match file.read_u64::<LittleEndian>() {
            Ok(index) => Ok(index),
            Err(_) => Ok(0),
        }
    }

    fn read_frames(&self) -> NodeResult<Vec<Vec<u8>>> {
        let mut segments = list_segments(&self.dir)?;
        segments.sort();

        let mut frames = Vec::new();
        for path in segments {
            read_segment_frames(&path, &mut frames)?;
        }
        Ok(frames)
    }
}

/// In-memory log for tests and throwaway nodes.
#[derive(Default)]
struct MemoryLog {
    frames: Vec<Vec<u8>>,
}

fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("segment_{:016}.log", id))
}

fn segment_id(path: &Path) -> Option<u64> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("segment_")?
        .parse()
        .ok()
}

fn list_segments(dir: &Path) -> NodeResult<Vec<PathBuf>> {
    let mut segments = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "log") && segment_id(&path).is_some() {
            segments.push(path);
        }
    }
    Ok(segments)
}

fn count_frames(path: &Path) -> NodeResult<u64> {
    let mut count = 0;
    let mut reader = BufReader::new(File::open(path)?);
    loop {
        let len = match reader.read_u32::<LittleEndian>() {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        std::io::copy(&mut (&mut reader).take(len as u64), &mut std::io::sink())?;
        count += 1;
    }
    Ok(count)
}

fn read_segment_frames(path: &Path, frames: &mut Vec<Vec<u8>>) -> NodeResult<()> {
    let mut reader = BufReader::new(File::open(path)?);
    loop {
        let len = match reader.read_u32::<LittleEndian>() {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        let mut frame = vec![0u8; len as usize];
        reader.read_exact(&mut frame)?;
        frames.push(frame);
    }
    Ok(())
}
