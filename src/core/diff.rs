//! Purpose: Publish before/after payload records to a directory polled by an external observer.
//! Exports: `DiffRecord`, `DecodedRecord`, `DiffChannel`, `encode`, `decode`, `read_dir`, `dir_names`.
//! Role: Diff channel; the only component that touches the filesystem at dispatch time.
//! Invariants: A record becomes visible only through an atomic rename from the staging dir.
//! Invariants: Sequence numbers come from one atomic counter; names never collide.
//! Invariants: Failed emissions unlink their staging file and are never retried.
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::error::{Error, ErrorKind};

/// Written in place of a missing plugin name or subject.
pub const UNKNOWN: &str = "unknown";

const STAGING_SUFFIX: &str = "_tmp";

#[derive(Clone, Copy, Debug)]
pub struct DiffRecord<'a> {
    pub plugin: &'a str,
    pub subject: Option<&'a [u8]>,
    pub original: &'a [u8],
    pub transformed: &'a [u8],
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedRecord {
    pub seq: Option<u64>,
    pub plugin: String,
    pub subject: String,
    pub original: Vec<u8>,
    pub transformed: Vec<u8>,
}

impl DecodedRecord {
    pub fn changed(&self) -> bool {
        self.original != self.transformed
    }
}

pub fn encode(record: &DiffRecord<'_>, out: &mut impl Write) -> io::Result<()> {
    let plugin = if record.plugin.is_empty() {
        UNKNOWN
    } else {
        record.plugin
    };
    out.write_all(plugin.as_bytes())?;
    out.write_all(b"\n")?;
    out.write_all(record.subject.unwrap_or(UNKNOWN.as_bytes()))?;
    write!(
        out,
        "\n{}\n{}\n",
        record.original.len(),
        record.transformed.len()
    )?;
    out.write_all(record.original)?;
    out.write_all(record.transformed)?;
    Ok(())
}

pub fn decode(bytes: &[u8]) -> Result<DecodedRecord, Error> {
    let mut rest = bytes;
    let mut header = [""; 4];
    for field in header.iter_mut() {
        let newline = rest
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| Error::new(ErrorKind::Corrupt).with_message("truncated header"))?;
        *field = std::str::from_utf8(&rest[..newline]).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("header is not utf-8")
                .with_source(err)
        })?;
        rest = &rest[newline + 1..];
    }
    let [plugin, subject, old_len, new_len] = header;
    let old_len = parse_len(old_len)?;
    let new_len = parse_len(new_len)?;
    if rest.len() != old_len + new_len {
        return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
            "payload is {} bytes, header declares {}",
            rest.len(),
            old_len + new_len
        )));
    }
    let (original, transformed) = rest.split_at(old_len);
    Ok(DecodedRecord {
        seq: None,
        plugin: plugin.to_string(),
        subject: subject.to_string(),
        original: original.to_vec(),
        transformed: transformed.to_vec(),
    })
}

fn parse_len(text: &str) -> Result<usize, Error> {
    text.parse::<usize>().map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("invalid length: {text}"))
            .with_source(err)
    })
}

/// Public and staging directory for the process `pid` under `base`.
pub fn dir_names(base: &Path, pid: u32) -> (PathBuf, PathBuf) {
    let public = base.join(format!("njvm{pid}"));
    let staging = base.join(format!("njvm{pid}{STAGING_SUFFIX}"));
    (public, staging)
}

/// Reads every published record in `dir`, ordered by sequence number.
pub fn read_dir(dir: &Path) -> Result<Vec<DecodedRecord>, Error> {
    let entries = fs::read_dir(dir).map_err(|err| io_error("failed to read diff dir", dir, err))?;
    let mut records = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| io_error("failed to read diff dir", dir, err))?;
        let Some(seq) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u64>().ok())
        else {
            continue;
        };
        let path = entry.path();
        let bytes = fs::read(&path).map_err(|err| io_error("failed to read record", &path, err))?;
        let mut record = decode(&bytes).map_err(|err| err.with_path(&path).with_seq(seq))?;
        record.seq = Some(seq);
        records.push(record);
    }
    records.sort_by_key(|record| record.seq);
    Ok(records)
}

#[derive(Debug)]
pub struct DiffChannel {
    public: PathBuf,
    staging: PathBuf,
    next_seq: AtomicU64,
}

impl DiffChannel {
    /// Creates both directories fresh, removing stale ones left by an earlier run.
    pub fn create(base: &Path, pid: u32) -> Result<Self, Error> {
        let (public, staging) = dir_names(base, pid);
        remove_dir_if_present(&public)?;
        remove_dir_if_present(&staging)?;

        make_dir(&public)?;
        if let Err(err) = make_dir(&staging) {
            let _ = remove_dir_if_present(&public);
            return Err(err);
        }
        tracing::debug!(public = %public.display(), staging = %staging.display(), "diff directories ready");

        Ok(Self {
            public,
            staging,
            next_seq: AtomicU64::new(0),
        })
    }

    pub fn public_dir(&self) -> &Path {
        &self.public
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Writes `record` to the staging dir and renames it into the public dir.
    pub fn emit(&self, record: &DiffRecord<'_>) -> Result<u64, Error> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let staged = self.staging.join(seq.to_string());
        let published = self.public.join(seq.to_string());

        if let Err(err) = write_staged(&staged, record) {
            let _ = fs::remove_file(&staged);
            return Err(io_error("failed to write staging file", &staged, err).with_seq(seq));
        }
        if let Err(err) = fs::rename(&staged, &published) {
            let _ = fs::remove_file(&staged);
            return Err(io_error("failed to publish record", &published, err).with_seq(seq));
        }
        tracing::debug!(
            path = %published.display(),
            plugin = record.plugin,
            old_len = record.original.len(),
            new_len = record.transformed.len(),
            "wrote diff record"
        );
        Ok(seq)
    }

    /// Deletes both directories and everything in them.
    pub fn remove(&self) -> Result<(), Error> {
        let staging = remove_dir_if_present(&self.staging);
        let public = remove_dir_if_present(&self.public);
        staging.and(public)
    }
}

fn write_staged(path: &Path, record: &DiffRecord<'_>) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    encode(record, &mut out)?;
    out.into_inner().map_err(io::IntoInnerError::into_error)?;
    Ok(())
}

fn make_dir(path: &Path) -> Result<(), Error> {
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder
        .create(path)
        .map_err(|err| io_error("failed to create directory", path, err))
}

fn remove_dir_if_present(path: &Path) -> Result<(), Error> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_error("failed to remove directory", path, err)),
    }
}

fn io_error(message: &str, path: &Path, err: io::Error) -> Error {
    let kind = match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        _ => ErrorKind::Io,
    };
    Error::new(kind)
        .with_message(message)
        .with_path(path)
        .with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn record<'a>(plugin: &'a str, original: &'a [u8], transformed: &'a [u8]) -> DiffRecord<'a> {
        DiffRecord {
            plugin,
            subject: Some(b"java/lang/String"),
            original,
            transformed,
        }
    }

    #[test]
    fn encodes_header_then_raw_payloads() {
        let mut out = Vec::new();
        encode(&record("alpha", &[1, 2, 3], &[9]), &mut out).expect("encode");
        let mut expected = b"alpha\njava/lang/String\n3\n1\n".to_vec();
        expected.extend_from_slice(&[1, 2, 3, 9]);
        assert_eq!(out, expected);
    }

    #[test]
    fn missing_names_use_the_sentinel() {
        let mut out = Vec::new();
        let rec = DiffRecord {
            plugin: "",
            subject: None,
            original: b"",
            transformed: b"",
        };
        encode(&rec, &mut out).expect("encode");
        assert_eq!(out, b"unknown\nunknown\n0\n0\n");
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let err = decode(b"alpha\nX\n3\n1\nab").expect_err("short payload");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        let err = decode(b"alpha\nX\nthree\n1\n").expect_err("bad length");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        let err = decode(b"alpha\nX").expect_err("no header");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn payloads_may_contain_newlines() {
        let mut out = Vec::new();
        encode(&record("alpha", b"a\nb", b"\n\n"), &mut out).expect("encode");
        let decoded = decode(&out).expect("decode");
        assert_eq!(decoded.original, b"a\nb");
        assert_eq!(decoded.transformed, b"\n\n");
        assert!(decoded.changed());
    }

    #[test]
    fn create_replaces_stale_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (public, staging) = dir_names(temp.path(), 42);
        fs::create_dir_all(&public).expect("stale public");
        fs::write(public.join("0"), b"stale").expect("stale record");
        fs::create_dir_all(&staging).expect("stale staging");

        let channel = DiffChannel::create(temp.path(), 42).expect("create");
        assert_eq!(channel.public_dir(), public);
        assert_eq!(channel.staging_dir(), staging);
        assert!(public.is_dir());
        assert!(staging.is_dir());
        assert_eq!(fs::read_dir(&public).expect("read").count(), 0);
    }

    #[test]
    fn directory_names_follow_the_pid() {
        let (public, staging) = dir_names(Path::new("/tmp"), 1234);
        assert_eq!(public, Path::new("/tmp/njvm1234"));
        assert_eq!(staging, Path::new("/tmp/njvm1234_tmp"));
    }

    #[test]
    fn emit_publishes_sequential_complete_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let channel = DiffChannel::create(temp.path(), 7).expect("create");
        let original = vec![0xCA; 100];
        let transformed = vec![0xFE; 120];

        assert_eq!(channel.emit(&record("alpha", &original, &transformed)).expect("emit"), 0);
        assert_eq!(channel.emit(&record("beta", &original, &original)).expect("emit"), 1);

        let bytes = fs::read(channel.public_dir().join("0")).expect("read");
        assert!(bytes.starts_with(b"alpha\njava/lang/String\n100\n120\n"));
        let header_len = b"alpha\njava/lang/String\n100\n120\n".len();
        assert_eq!(bytes.len() - header_len, 220);

        let records = read_dir(channel.public_dir()).expect("read dir");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, Some(0));
        assert_eq!(records[0].plugin, "alpha");
        assert!(records[0].changed());
        assert_eq!(records[1].plugin, "beta");
        assert!(!records[1].changed());
        assert_eq!(fs::read_dir(channel.staging_dir()).expect("staging").count(), 0);
    }

    #[test]
    fn failed_emit_is_reported_and_leaves_no_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let channel = DiffChannel::create(temp.path(), 8).expect("create");
        fs::remove_dir_all(channel.staging_dir()).expect("remove staging");

        let err = channel.emit(&record("alpha", b"a", b"b")).expect_err("no staging dir");
        assert_eq!(err.seq(), Some(0));
        assert_eq!(fs::read_dir(channel.public_dir()).expect("read").count(), 0);

        fs::create_dir(channel.staging_dir()).expect("recreate staging");
        assert_eq!(channel.emit(&record("alpha", b"a", b"b")).expect("emit"), 1);
    }

    #[test]
    fn concurrent_emits_never_collide() {
        let temp = tempfile::tempdir().expect("tempdir");
        let channel = Arc::new(DiffChannel::create(temp.path(), 9).expect("create"));
        let threads = 8;
        let per_thread = 25;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let channel = Arc::clone(&channel);
                std::thread::spawn(move || {
                    let name = format!("plugin{t}");
                    let payload = vec![t as u8; 64 + t];
                    (0..per_thread)
                        .map(|_| {
                            channel
                                .emit(&record(&name, &payload, &payload))
                                .expect("emit")
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let seqs: HashSet<u64> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("join"))
            .collect();
        let total = (threads * per_thread) as u64;
        assert_eq!(seqs, (0..total).collect::<HashSet<_>>());

        let records = read_dir(channel.public_dir()).expect("read dir");
        assert_eq!(records.len(), total as usize);
        for (expected, record) in records.iter().enumerate() {
            assert_eq!(record.seq, Some(expected as u64));
            let t: usize = record.plugin["plugin".len()..].parse().expect("thread id");
            assert_eq!(record.original, vec![t as u8; 64 + t]);
        }
    }

    #[test]
    fn remove_deletes_both_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let channel = DiffChannel::create(temp.path(), 10).expect("create");
        channel.emit(&record("alpha", b"a", b"b")).expect("emit");
        channel.remove().expect("remove");
        assert!(!channel.public_dir().exists());
        assert!(!channel.staging_dir().exists());
        channel.remove().expect("idempotent");
    }
}
