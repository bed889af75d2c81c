use crate::error::JobjarError;
use crate::host::Record;
use crate::writable::Writable;
use anyhow::{Context, Result};
use memchr::memchr;
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    fs::create_dir_all(path.as_ref()).with_context(|| format!("create_dir_all {}", path.as_ref().display()))
}

/// Input files below `path`, sorted. Names starting with `_` or `.` are
/// markers or hidden files and never count as input.
pub fn list_files_recursive(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_string_lossy().as_ref()));
    for entry in walker {
        let entry = entry.with_context(|| format!("listing {}", path.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

pub fn open_writer(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    if let Some(parent) = path.as_ref().parent() {
        ensure_dir(parent)?;
    }
    let file = File::create(path.as_ref()).with_context(|| format!("create {}", path.as_ref().display()))?;
    Ok(BufWriter::new(file))
}

/// Maps a file read-only. Empty files have no mapping.
pub fn map_file(path: impl AsRef<Path>) -> Result<Option<Mmap>> {
    let file = File::open(path.as_ref()).with_context(|| format!("open {}", path.as_ref().display()))?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    let map = unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", path.as_ref().display()))?;
    Ok(Some(map))
}

/// Line records of one text file: the key is the byte offset of the line,
/// the value the line without its terminator. A line that is not valid
/// UTF-8 is a conversion error for that record.
pub struct TextRecords {
    map: Option<Mmap>,
    off: usize,
}

impl TextRecords {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { map: map_file(path)?, off: 0 })
    }
}

impl Iterator for TextRecords {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = &self.map.as_ref()?[..];
        if self.off >= bytes.len() {
            return None;
        }
        let start = self.off;
        let (mut end, next) = match memchr(b'\n', &bytes[start..]) {
            Some(i) => (start + i, start + i + 1),
            None => (bytes.len(), bytes.len()),
        };
        if end > start && bytes[end - 1] == b'\r' {
            end -= 1;
        }
        self.off = next;
        match std::str::from_utf8(&bytes[start..end]) {
            Ok(line) => Some(Ok((Writable::Long(start as i64), Writable::Text(line.to_string())))),
            Err(e) => Some(Err(JobjarError::conversion(format!("line at byte {} is not valid UTF-8: {}", start, e)).into())),
        }
    }
}

/// Appends one `[klen u32 le][vlen u32 le][k][v]` record.
pub fn write_bin(buf: &mut Vec<u8>, key: &Writable, value: &Writable) -> Result<()> {
    let key_bytes = bincode::serialize(key).context("bincode key")?;
    let val_bytes = bincode::serialize(value).context("bincode value")?;
    buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(val_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&key_bytes);
    buf.extend_from_slice(&val_bytes);
    Ok(())
}

/// Splits the record starting at `off` into key bytes, value bytes and the
/// offset of the next record. `None` at the end or on a truncated record.
pub fn read_bin_line(bytes: &[u8], off: usize) -> Option<(&[u8], &[u8], usize)> {
    let header = bytes.get(off..off + 8)?;
    let klen = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let vlen = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let key_start = off + 8;
    let val_start = key_start + klen;
    let end = val_start + vlen;
    let key = bytes.get(key_start..val_start)?;
    let value = bytes.get(val_start..end)?;
    Some((key, value, end))
}

pub fn decode_bin(key: &[u8], value: &[u8]) -> Result<Record> {
    let k: Writable = bincode::deserialize(key).context("bad key bin")?;
    let v: Writable = bincode::deserialize(value).context("bad value bin")?;
    Ok((k, v))
}

/// Every record of an intermediate file, in file order.
pub fn read_bin_file(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let Some(map) = map_file(path.as_ref())? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    let mut off = 0usize;
    while let Some((k, v, next)) = read_bin_line(&map, off) {
        out.push(decode_bin(k, v).with_context(|| format!("in {}", path.as_ref().display()))?);
        off = next;
    }
    if off != map.len() {
        anyhow::bail!("{} ends with a truncated record at byte {}", path.as_ref().display(), off);
    }
    Ok(out)
}

/// Text output format: `key<TAB>value`.
pub fn write_text_line(writer: &mut impl Write, key: &Writable, value: &Writable) -> Result<()> {
    writeln!(writer, "{}\t{}", key, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_records_carry_byte_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        fs::write(&path, "one\r\ntwo\n\nlast").unwrap();
        let records: Vec<Record> = TextRecords::open(&path).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(
            records,
            vec![
                (Writable::Long(0), Writable::text("one")),
                (Writable::Long(5), Writable::text("two")),
                (Writable::Long(9), Writable::text("")),
                (Writable::Long(10), Writable::text("last")),
            ]
        );
        fs::write(dir.path().join("empty.txt"), "").unwrap();
        assert_eq!(TextRecords::open(dir.path().join("empty.txt")).unwrap().count(), 0);
    }

    #[test]
    fn invalid_utf8_lines_are_conversion_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        fs::write(&path, b"ok\n\xff\xfe\nafter\n").unwrap();
        let records: Vec<Result<Record>> = TextRecords::open(&path).unwrap().collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].as_ref().unwrap(), &(Writable::Long(0), Writable::text("ok")));
        let err = records[1].as_ref().unwrap_err();
        assert!(matches!(err.downcast_ref::<JobjarError>(), Some(JobjarError::Conversion(_))));
        assert_eq!(records[2].as_ref().unwrap(), &(Writable::Long(6), Writable::text("after")));
    }

    #[test]
    fn bin_files_are_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spill.bin");
        let mut buf = Vec::new();
        write_bin(&mut buf, &Writable::text("alice"), &Writable::Long(2)).unwrap();
        write_bin(&mut buf, &Writable::Array(vec![Writable::text("a")]), &Writable::Null).unwrap();
        fs::write(&path, &buf).unwrap();
        let records = read_bin_file(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], (Writable::text("alice"), Writable::Long(2)));

        fs::write(&path, &buf[..buf.len() - 1]).unwrap();
        assert!(read_bin_file(&path).is_err());
    }

    #[test]
    fn markers_and_hidden_files_are_not_input() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        for name in ["b.txt", "a.txt", "_SUCCESS", ".crc", "sub/c.txt"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        let files = list_files_recursive(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub/c.txt"]);
    }
}
