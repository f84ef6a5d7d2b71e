//! Snapshot stream codec and offline command projection.
//!
//! The stream format is fixed and bit-exact:
//!
//! ```text
//! stream := gzip( record* )
//! record := key_len key_bytes value_len value_bytes
//! key_len, value_len := u64 little-endian
//! ```
//!
//! `key_bytes` is the full stored key including the namespace byte. There is
//! no record count, checksum, or trailer: EOF at a record boundary inside
//! the gzip stream ends it cleanly, EOF anywhere else is a fatal error.

use crate::core::error::{NodeError, NodeResult};
use crate::protocol::{encode, RespValue};
use crate::store::keys::USER_PREFIX;
use crate::store::{Store, StoreSnapshot, WriteBatch};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{BufReader, Read, Write};

/// Restore batches are flushed once this many staged key+value bytes
/// accumulate.
const RESTORE_FLUSH_THRESHOLD: usize = 4 * 1024 * 1024;

/// Write every record of `snap` into `writer` as a snapshot stream, in
/// ascending key order.
pub fn write_snapshot<W: Write>(snap: &StoreSnapshot, writer: W) -> NodeResult<()> {
    let mut gz = GzEncoder::new(writer, Compression::default());
    snap.for_each::<NodeError, _>(|key, value| {
        gz.write_u64::<LittleEndian>(key.len() as u64)?;
        gz.write_all(key)?;
        gz.write_u64::<LittleEndian>(value.len() as u64)?;
        gz.write_all(value)?;
        Ok(())
    })?;
    gz.finish()?;
    Ok(())
}

/// Populate `store` from a snapshot stream. The store is expected to be
/// freshly reinitialized; records are staged into batches and flushed at
/// the size threshold.
pub fn read_snapshot<R: Read>(reader: R, store: &Store) -> NodeResult<()> {
    let mut reader = BufReader::new(GzDecoder::new(reader));
    let mut batch = WriteBatch::new();
    let mut staged = 0usize;

    loop {
        let key_len = match read_record_len(&mut reader)? {
            Some(len) => len,
            None => break,
        };
        let mut key = vec![0u8; key_len as usize];
        reader.read_exact(&mut key).map_err(truncated)?;

        let value_len = reader.read_u64::<LittleEndian>().map_err(truncated)?;
        let mut value = vec![0u8; value_len as usize];
        reader.read_exact(&mut value).map_err(truncated)?;

        staged += key.len() + value.len();
        batch.put(key, value);

        if staged > RESTORE_FLUSH_THRESHOLD {
            store.write(std::mem::take(&mut batch))?;
            staged = 0;
        }
    }

    store.write(batch)?;
    Ok(())
}

/// Project a snapshot stream into replayable RESP `SET` commands, one per
/// user record. Records whose namespace byte is not `'k'` are reserved for
/// internal state and silently skipped.
pub fn snapshot_to_commands<R: Read, W: Write>(reader: R, mut writer: W) -> NodeResult<()> {
    let mut reader = BufReader::new(GzDecoder::new(reader));
    let mut buf = Vec::new();

    loop {
        let key_len = match read_record_len(&mut reader)? {
            Some(len) => len,
            None => break,
        };
        let mut key = vec![0u8; key_len as usize];
        reader.read_exact(&mut key).map_err(truncated)?;

        let value_len = reader.read_u64::<LittleEndian>().map_err(truncated)?;
        let mut value = vec![0u8; value_len as usize];
        reader.read_exact(&mut value).map_err(truncated)?;

        if key.first() != Some(&USER_PREFIX) {
            continue;
        }
        key.remove(0);

        let set = RespValue::Array(vec![
            RespValue::Bulk(Bytes::from_static(b"SET")),
            RespValue::Bulk(key.into()),
            RespValue::Bulk(value.into()),
        ]);
        buf.clear();
        encode(&set, &mut buf);
        writer.write_all(&buf)?;
    }

    Ok(())
}

/// Read the 8-byte length opening a record. A clean EOF before the first
/// byte ends the stream (`None`); EOF after a partial prefix is an error.
fn read_record_len<R: Read>(reader: &mut R) -> NodeResult<Option<u64>> {
    let mut buf = [0u8; 8];
    let mut filled = 0;
    while filled < 8 {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(NodeError::TruncatedSnapshot),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(truncated(e)),
        }
    }
    Ok(Some(u64::from_le_bytes(buf)))
}

fn truncated(err: std::io::Error) -> NodeError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        NodeError::TruncatedSnapshot
    } else {
        NodeError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreOptions;

    fn open_temp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), StoreOptions::default()).unwrap();
        (dir, store)
    }

    #[test]
    fn empty_store_round_trips() {
        let (_dir, source) = open_temp();
        let mut stream = Vec::new();
        write_snapshot(&source.snapshot().unwrap(), &mut stream).unwrap();

        let (_dir2, target) = open_temp();
        read_snapshot(stream.as_slice(), &target).unwrap();

        let mut count = 0;
        target
            .snapshot()
            .unwrap()
            .for_each::<NodeError, _>(|_, _| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn records_round_trip_in_order() {
        let (_dir, source) = open_temp();
        source.put(b"kb", b"2").unwrap();
        source.put(b"ka", b"1").unwrap();
        source.put(b"kc", b"").unwrap();
        source.put(b"k", b"empty-key").unwrap();

        let mut stream = Vec::new();
        write_snapshot(&source.snapshot().unwrap(), &mut stream).unwrap();

        let (_dir2, target) = open_temp();
        read_snapshot(stream.as_slice(), &target).unwrap();

        let mut records = Vec::new();
        target
            .snapshot()
            .unwrap()
            .for_each::<NodeError, _>(|k, v| {
                records.push((k.to_vec(), v.to_vec()));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            records,
            vec![
                (b"k".to_vec(), b"empty-key".to_vec()),
                (b"ka".to_vec(), b"1".to_vec()),
                (b"kb".to_vec(), b"2".to_vec()),
                (b"kc".to_vec(), b"".to_vec()),
            ]
        );
    }

    #[test]
    fn truncated_stream_is_fatal() {
        let (_dir, source) = open_temp();
        source.put(b"ka", b"payload-payload-payload").unwrap();

        let mut stream = Vec::new();
        write_snapshot(&source.snapshot().unwrap(), &mut stream).unwrap();

        // Chop the gzip stream so a record is cut mid-frame.
        stream.truncate(stream.len() / 2);

        let (_dir2, target) = open_temp();
        let result = read_snapshot(stream.as_slice(), &target);
        assert!(result.is_err());
    }

    #[test]
    fn projection_emits_set_per_user_record() {
        let (_dir, source) = open_temp();
        source.put(b"kfoo", b"bar").unwrap();
        source.put(b"mapplied", b"internal").unwrap();
        source.put(b"kbaz", b"qux").unwrap();

        let mut stream = Vec::new();
        write_snapshot(&source.snapshot().unwrap(), &mut stream).unwrap();

        let mut commands = Vec::new();
        snapshot_to_commands(stream.as_slice(), &mut commands).unwrap();

        assert_eq!(
            commands,
            b"*3\r\n$3\r\nSET\r\n$3\r\nbaz\r\n$3\r\nqux\r\n\
              *3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n"
                .to_vec()
        );
    }

    #[test]
    fn projection_of_empty_stream_is_empty() {
        let (_dir, source) = open_temp();
        let mut stream = Vec::new();
        write_snapshot(&source.snapshot().unwrap(), &mut stream).unwrap();

        let mut commands = Vec::new();
        snapshot_to_commands(stream.as_slice(), &mut commands).unwrap();
        assert!(commands.is_empty());
    }
}
