//! Crash-safe binary snapshot files, one per table.
//!
//! Format, identical across all four tables:
//! ```text
//! u32 magic | u32 major_version | i64 record_count
//! ( u64 record_size | record_bytes[record_size] )*
//! ```
//! Flush writes to `<file>.tmp` then renames atomically; load abandons
//! the file and starts empty on any magic/version mismatch or truncated
//! read, logging a warning. Never partially applies a corrupt file.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::knn::KnnMatrix;
use crate::store::tables::{Sample, STAT_SAMPLE_SIZE};
use crate::store::{DataEntry, Fs, Fss, Preferences, StatEntry, Store};

const MAGIC: u32 = 0x0759_BD85;
const MAJOR_VERSION: u32 = 1;

fn write_framed(path: &Path, records: &[Vec<u8>]) -> Result<()> {
    let tmp_path = tmp_path_for(path);
    let write_result = (|| -> io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_u32::<LittleEndian>(MAGIC)?;
        file.write_u32::<LittleEndian>(MAJOR_VERSION)?;
        file.write_i64::<LittleEndian>(records.len() as i64)?;
        for record in records {
            file.write_u64::<LittleEndian>(record.len() as u64)?;
            file.write_all(record)?;
        }
        file.sync_all()
    })();

    match write_result {
        Ok(()) => {
            fs::rename(&tmp_path, path).map_err(|source| Error::SnapshotWrite {
                file: path.display().to_string(),
                source,
            })?;
            Ok(())
        }
        Err(source) => {
            let _ = fs::remove_file(&tmp_path);
            Err(Error::SnapshotWrite {
                file: path.display().to_string(),
                source,
            })
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Reads and frame-decodes a snapshot file. Returns `Ok(vec![])` (not an
/// error) if the file doesn't exist yet, or if its header or framing is
/// corrupt: the caller starts empty and logs.
fn read_framed(path: &Path) -> Vec<Vec<u8>> {
    match read_framed_fallible(path) {
        Ok(records) => records,
        Err(reason) => {
            if path.exists() {
                tracing::warn!(file = %path.display(), %reason, "abandoning corrupt snapshot file");
            }
            Vec::new()
        }
    }
}

fn read_framed_fallible(path: &Path) -> std::result::Result<Vec<Vec<u8>>, String> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut file = fs::File::open(path).map_err(|e| e.to_string())?;
    let magic = file.read_u32::<LittleEndian>().map_err(|e| e.to_string())?;
    if magic != MAGIC {
        return Err(format!("bad magic {magic:#x}"));
    }
    let version = file.read_u32::<LittleEndian>().map_err(|e| e.to_string())?;
    if version != MAJOR_VERSION {
        return Err(format!("unsupported version {version}"));
    }
    let record_count = file.read_i64::<LittleEndian>().map_err(|e| e.to_string())?;
    if record_count < 0 {
        return Err("negative record count".to_string());
    }
    let mut records = Vec::with_capacity(record_count as usize);
    for _ in 0..record_count {
        let size = file.read_u64::<LittleEndian>().map_err(|e| e.to_string())?;
        let mut buf = vec![0u8; size as usize];
        file.read_exact(&mut buf).map_err(|e| e.to_string())?;
        records.push(buf);
    }
    Ok(records)
}

fn write_f64_array(out: &mut Vec<u8>, values: &[f64]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn ring_buffer_fixed(samples: &[Sample]) -> ([f64; STAT_SAMPLE_SIZE], [f64; STAT_SAMPLE_SIZE], [f64; STAT_SAMPLE_SIZE]) {
    let mut times = [0.0; STAT_SAMPLE_SIZE];
    let mut plans = [0.0; STAT_SAMPLE_SIZE];
    let mut errors = [0.0; STAT_SAMPLE_SIZE];
    for (i, s) in samples.iter().enumerate().take(STAT_SAMPLE_SIZE) {
        times[i] = s.exec_time;
        plans[i] = s.plan_time;
        errors[i] = s.est_error;
    }
    (times, plans, errors)
}

fn encode_stat(fs: Fs, entry: &StatEntry) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&fs.to_le_bytes());
    out.extend_from_slice(&entry.execs_with.to_le_bytes());
    out.extend_from_slice(&entry.execs_without.to_le_bytes());
    out.extend_from_slice(&(entry.without_predictor.len() as i32).to_le_bytes());
    out.extend_from_slice(&(entry.with_predictor.len() as i32).to_le_bytes());

    let (exec_time, plan_time, est_error) = ring_buffer_fixed(&entry.without_predictor);
    write_f64_array(&mut out, &exec_time);
    write_f64_array(&mut out, &plan_time);
    write_f64_array(&mut out, &est_error);

    let (exec_time_aqo, plan_time_aqo, est_error_aqo) = ring_buffer_fixed(&entry.with_predictor);
    write_f64_array(&mut out, &exec_time_aqo);
    write_f64_array(&mut out, &plan_time_aqo);
    write_f64_array(&mut out, &est_error_aqo);

    out
}

fn decode_stat(bytes: &[u8]) -> std::result::Result<(Fs, StatEntry), String> {
    let mut cursor = io::Cursor::new(bytes);
    let fs = cursor.read_u64::<LittleEndian>().map_err(|e| e.to_string())?;
    let execs_with = cursor.read_i64::<LittleEndian>().map_err(|e| e.to_string())?;
    let execs_without = cursor.read_i64::<LittleEndian>().map_err(|e| e.to_string())?;
    let slot = cursor.read_i32::<LittleEndian>().map_err(|e| e.to_string())?;
    let slot_with = cursor.read_i32::<LittleEndian>().map_err(|e| e.to_string())?;

    let read_block = |cursor: &mut io::Cursor<&[u8]>, count: usize| -> std::result::Result<Vec<f64>, String> {
        (0..STAT_SAMPLE_SIZE)
            .map(|_| cursor.read_f64::<LittleEndian>().map_err(|e| e.to_string()))
            .collect::<std::result::Result<Vec<f64>, String>>()
            .map(|v| v.into_iter().take(count).collect())
    };

    let without_count = slot.max(0) as usize;
    let with_count = slot_with.max(0) as usize;

    let exec_time = read_block(&mut cursor, without_count)?;
    let plan_time = read_block(&mut cursor, without_count)?;
    let est_error = read_block(&mut cursor, without_count)?;
    let exec_time_aqo = read_block(&mut cursor, with_count)?;
    let plan_time_aqo = read_block(&mut cursor, with_count)?;
    let est_error_aqo = read_block(&mut cursor, with_count)?;

    let without_predictor = (0..without_count.min(exec_time.len()))
        .map(|i| Sample {
            exec_time: exec_time[i],
            plan_time: plan_time[i],
            est_error: est_error[i],
        })
        .collect();
    let with_predictor = (0..with_count.min(exec_time_aqo.len()))
        .map(|i| Sample {
            exec_time: exec_time_aqo[i],
            plan_time: plan_time_aqo[i],
            est_error: est_error_aqo[i],
        })
        .collect();

    Ok((
        fs,
        StatEntry {
            with_predictor,
            without_predictor,
            execs_with,
            execs_without,
        },
    ))
}

fn encode_qtext(fs: Fs, text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + text.len() + 1);
    out.extend_from_slice(&fs.to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out.push(0);
    out
}

fn decode_qtext(bytes: &[u8]) -> std::result::Result<(Fs, String), String> {
    if bytes.len() < 8 {
        return Err("qtext record too short".to_string());
    }
    let fs = u64::from_le_bytes(bytes[0..8].try_into().map_err(|_| "bad fs".to_string())?);
    let rest = &bytes[8..];
    let nul_pos = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    let text = String::from_utf8_lossy(&rest[..nul_pos]).into_owned();
    Ok((fs, text))
}

fn encode_data(fs: Fs, fss: Fss, entry: &DataEntry) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&fs.to_le_bytes());
    out.extend_from_slice(&fss.to_le_bytes());
    out.extend_from_slice(&(entry.matrix.cols() as i32).to_le_bytes());
    out.extend_from_slice(&(entry.matrix.rows() as i32).to_le_bytes());
    out.extend_from_slice(&(entry.reloids.len() as i32).to_le_bytes());
    for row in entry.matrix.rows_data() {
        write_f64_array(&mut out, row);
    }
    write_f64_array(&mut out, entry.matrix.targets());
    write_f64_array(&mut out, entry.matrix.rfactors());
    for &r in &entry.reloids {
        out.extend_from_slice(&r.to_le_bytes());
    }
    out
}

fn decode_data(bytes: &[u8]) -> std::result::Result<((Fs, Fss), DataEntry), String> {
    let mut cursor = io::Cursor::new(bytes);
    let fs = cursor.read_u64::<LittleEndian>().map_err(|e| e.to_string())?;
    let fss = cursor.read_i32::<LittleEndian>().map_err(|e| e.to_string())?;
    let cols = cursor.read_i32::<LittleEndian>().map_err(|e| e.to_string())? as usize;
    let rows = cursor.read_i32::<LittleEndian>().map_err(|e| e.to_string())? as usize;
    let nrels = cursor.read_i32::<LittleEndian>().map_err(|e| e.to_string())? as usize;

    let mut matrix = Vec::with_capacity(rows);
    for _ in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for _ in 0..cols {
            row.push(cursor.read_f64::<LittleEndian>().map_err(|e| e.to_string())?);
        }
        matrix.push(row);
    }
    let mut targets = Vec::with_capacity(rows);
    for _ in 0..rows {
        targets.push(cursor.read_f64::<LittleEndian>().map_err(|e| e.to_string())?);
    }
    let mut rfactors = Vec::with_capacity(rows);
    for _ in 0..rows {
        rfactors.push(cursor.read_f64::<LittleEndian>().map_err(|e| e.to_string())?);
    }
    let mut reloids = Vec::with_capacity(nrels);
    for _ in 0..nrels {
        reloids.push(cursor.read_u64::<LittleEndian>().map_err(|e| e.to_string())?);
    }

    let heap_bytes = cols * crate::store::DATA_ENTRY_HEAP_ESTIMATE_BYTES_PER_COL;
    Ok((
        (fs, fss),
        DataEntry {
            matrix: KnnMatrix::from_parts(cols, matrix, targets, rfactors),
            reloids,
            heap_bytes,
        },
    ))
}

fn encode_queries(fs: Fs, prefs: &Preferences) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + 8 + 3);
    out.extend_from_slice(&fs.to_le_bytes());
    out.extend_from_slice(&prefs.target_fs.to_le_bytes());
    out.push(u8::from(prefs.learn));
    out.push(u8::from(prefs.use_predictor));
    out.push(u8::from(prefs.auto_tune));
    out
}

fn decode_queries(bytes: &[u8]) -> std::result::Result<(Fs, Preferences), String> {
    if bytes.len() < 19 {
        return Err("queries record too short".to_string());
    }
    let fs = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let target_fs = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let learn = bytes[16] != 0;
    let use_predictor = bytes[17] != 0;
    let auto_tune = bytes[18] != 0;
    Ok((
        fs,
        Preferences {
            target_fs,
            learn,
            use_predictor,
            auto_tune,
        },
    ))
}

/// Flushes every dirty table to its snapshot file under `dir`, clearing
/// each table's dirty flag only if its write succeeds. Grounded in
/// `storage.c`'s conditional, per-table flush.
///
/// # Errors
///
/// Returns the first write error encountered; tables after it are still
/// attempted (a failure on one table does not block flushing the rest).
pub fn flush(store: &Store, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let dirty = store.dirty_flags();
    let mut first_error = None;
    let mut cleared = [false; 4];

    if dirty[0] {
        let records: Vec<Vec<u8>> = store
            .stat_table()
            .read()
            .iter()
            .map(|(&fs, e)| encode_stat(fs, e))
            .collect();
        match write_framed(&dir.join("aqo_stat.bin"), &records) {
            Ok(()) => cleared[0] = true,
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    if dirty[1] {
        let records: Vec<Vec<u8>> = store
            .qtext_table()
            .read()
            .iter()
            .map(|(&fs, t)| encode_qtext(fs, t))
            .collect();
        match write_framed(&dir.join("aqo_qtext.bin"), &records) {
            Ok(()) => cleared[1] = true,
            Err(e) => { first_error.get_or_insert(e); }
        }
    }
    if dirty[2] {
        let records: Vec<Vec<u8>> = store
            .data_table()
            .read()
            .iter()
            .map(|(&(fs, fss), e)| encode_data(fs, fss, e))
            .collect();
        match write_framed(&dir.join("aqo_data.bin"), &records) {
            Ok(()) => cleared[2] = true,
            Err(e) => { first_error.get_or_insert(e); }
        }
    }
    if dirty[3] {
        let records: Vec<Vec<u8>> = store
            .queries_table()
            .read()
            .iter()
            .map(|(&fs, p)| encode_queries(fs, p))
            .collect();
        match write_framed(&dir.join("aqo_queries.bin"), &records) {
            Ok(()) => cleared[3] = true,
            Err(e) => { first_error.get_or_insert(e); }
        }
    }

    store.clear_dirty_flags(cleared);
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Loads every table's snapshot file under `dir` into `store`, replacing
/// its current in-memory contents. Any table whose file is missing or
/// corrupt is left empty (abandoning the file rather than partially
/// applying it), and the common feature space is re-seeded afterward so it is
/// never lost to a corrupt `queries`/`qtext` snapshot.
pub fn load(store: &Store, dir: &Path) -> Result<()> {
    {
        let mut table = store.stat_table().write();
        table.clear();
        for record in read_framed(&dir.join("aqo_stat.bin")) {
            match decode_stat(&record) {
                Ok((fs, entry)) => {
                    table.insert(fs, entry);
                }
                Err(reason) => tracing::warn!(%reason, "skipping malformed stat record"),
            }
        }
    }
    {
        let mut table = store.qtext_table().write();
        table.clear();
        for record in read_framed(&dir.join("aqo_qtext.bin")) {
            match decode_qtext(&record) {
                Ok((fs, text)) => {
                    table.insert(fs, text);
                }
                Err(reason) => tracing::warn!(%reason, "skipping malformed qtext record"),
            }
        }
    }
    {
        let mut table = store.data_table().write();
        table.clear();
        let heap = store.heap();
        heap.release_all();
        for record in read_framed(&dir.join("aqo_data.bin")) {
            match decode_data(&record) {
                Ok((key, entry)) => {
                    if heap.try_reserve(entry.heap_bytes).is_ok() {
                        table.insert(key, entry);
                    } else {
                        tracing::warn!("heap exhausted while loading data snapshot, entry dropped");
                    }
                }
                Err(reason) => tracing::warn!(%reason, "skipping malformed data record"),
            }
        }
    }
    {
        let mut table = store.queries_table().write();
        table.clear();
        for record in read_framed(&dir.join("aqo_queries.bin")) {
            match decode_queries(&record) {
                Ok((fs, prefs)) => {
                    table.insert(fs, prefs);
                }
                Err(reason) => tracing::warn!(%reason, "skipping malformed queries record"),
            }
        }
    }

    if store.preferences(crate::store::COMMON_FEATURE_SPACE).is_none() {
        store.update_preferences(
            crate::store::COMMON_FEATURE_SPACE,
            Preferences {
                target_fs: crate::store::COMMON_FEATURE_SPACE,
                learn: true,
                use_predictor: true,
                auto_tune: false,
            },
        );
    }
    if store.query_text(crate::store::COMMON_FEATURE_SPACE).is_none() {
        let _ = store.set_query_text(crate::store::COMMON_FEATURE_SPACE, "");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::knn::KnnParams;

    #[test]
    fn round_trip_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(StoreConfig::default());

        store.set_query_text(7, "select 1").unwrap();
        store
            .record_stat(
                7,
                true,
                Sample {
                    plan_time: 1.0,
                    exec_time: 2.0,
                    est_error: 0.1,
                },
            )
            .unwrap();
        store
            .with_data_entry(7, 42, 2, |e| {
                e.matrix.learn(&[0.1, 0.2], 3.0, 1.0, &KnnParams::default());
            })
            .unwrap();
        store
            .seed_class(
                7,
                Preferences {
                    target_fs: 7,
                    learn: true,
                    use_predictor: false,
                    auto_tune: true,
                },
            )
            .unwrap();

        flush(&store, dir.path()).unwrap();

        let reloaded = Store::new(StoreConfig::default());
        load(&reloaded, dir.path()).unwrap();

        assert_eq!(reloaded.query_text(7), Some("select 1".to_string()));
        assert_eq!(reloaded.stat_entry(7).unwrap().execs_with, 1);
        assert_eq!(reloaded.data_matrix(7, 42).unwrap().rows(), 1);
        assert_eq!(reloaded.preferences(7).unwrap().auto_tune, true);
    }

    #[test]
    fn corrupt_file_is_abandoned_not_propagated() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("aqo_stat.bin"), b"not a snapshot").unwrap();
        let store = Store::new(StoreConfig::default());
        load(&store, dir.path()).unwrap();
        assert!(store.stat_snapshot().is_empty());
    }
}
