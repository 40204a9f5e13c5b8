//! Tar stream codec
//!
//! Encodes a single byte stream into a one-entry archive for upload into a
//! pod, and unpacks archives produced by `tar cf -` inside a pod onto local
//! disk. The async entry points run the blocking `tar` crate on the blocking
//! pool, bridged to tokio pipes with `SyncIoBridge`.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tar::{Archive, Builder, EntryType, Header};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Mode recorded for uploaded files
const UPLOAD_MODE: u32 = 0o777;

/// Mode used for directories created while unpacking
const DIR_MODE: u32 = 0o755;

/// Write a one-entry archive named after the base name of `dest_path`
///
/// Exactly `size` bytes are read from `source`; a shorter or longer source is
/// an encoding error rather than a silently malformed archive. Returns the
/// number of body bytes written.
pub fn make_tar<R: Read, W: Write>(source: R, size: u64, dest_path: &str, writer: W) -> Result<u64> {
    let name = base_name(dest_path)
        .ok_or_else(|| Error::Encoding(format!("no file name in destination '{}'", dest_path)))?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut header = Header::new_gnu();
    header
        .set_path(&name)
        .map_err(|e| Error::Encoding(format!("writing tar header for '{}': {}", name, e)))?;
    header.set_size(size);
    header.set_mode(UPLOAD_MODE);
    header.set_entry_type(EntryType::Regular);
    header.set_mtime(now);
    if let Some(gnu) = header.as_gnu_mut() {
        gnu.set_atime(now);
        gnu.set_ctime(now);
    }
    header.set_cksum();

    let mut body = ExactReader::new(source, size);
    let mut builder = Builder::new(writer);
    builder
        .append(&header, &mut body)
        .map_err(|e| encoding_error(format!("copying body of '{}'", name), e))?;
    let mut writer = builder
        .into_inner()
        .map_err(|e| encoding_error("finishing archive", e))?;
    writer
        .flush()
        .map_err(|e| encoding_error("flushing archive", e))?;

    Ok(body.consumed())
}

/// A closed archive sink stays an [`Error::Io`] with
/// [`io::ErrorKind::BrokenPipe`] so callers can blame the reader that went away
fn encoding_error(context: impl std::fmt::Display, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::BrokenPipe {
        Error::Io(e)
    } else {
        Error::Encoding(format!("{}: {}", context, e))
    }
}

/// Run [`make_tar`] on the blocking pool between two async pipes
///
/// The sink is shut down once the archive is complete. On failure the sink is
/// dropped without the end-of-archive marker and the error is returned from
/// the join handle, so the consumer can tell truncation from a clean end.
pub fn spawn_encoder<R, W>(source: R, size: u64, dest_path: String, sink: W) -> JoinHandle<Result<u64>>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let source = SyncIoBridge::new(source);
    let mut sink = SyncIoBridge::new(sink);
    tokio::task::spawn_blocking(move || {
        let written = make_tar(source, size, &dest_path, &mut sink)?;
        sink.shutdown()
            .map_err(|e| encoding_error("closing archive stream", e))?;
        Ok(written)
    })
}

/// Unpack every entry of `reader` under `dest_root`
///
/// `strip_prefix` is removed from each recorded name before it is re-rooted.
/// Names are cleaned so that no entry can land outside `dest_root`. Returns
/// the number of entries seen; an empty archive is [`Error::NoSuchEntry`].
pub fn untar_all<R: Read>(reader: R, dest_root: &Path, strip_prefix: &str) -> Result<usize> {
    let prefix = clean_components(strip_prefix);
    let mut archive = Archive::new(reader);
    let mut seen = 0usize;

    {
        let entries = archive
            .entries()
            .map_err(|e| Error::Decoding(format!("reading archive: {}", e)))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| Error::Decoding(format!("reading entry: {}", e)))?;
            let entry_type = entry.header().entry_type();
            if entry_type.is_pax_global_extensions() || entry_type.is_pax_local_extensions() {
                continue;
            }

            let first = seen == 0;
            seen += 1;

            let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let name = clean_components(&raw_name);
            let relative = name.strip_prefix(prefix.as_slice()).unwrap_or(&name);
            let mut out = join_under(dest_root, relative);

            // a single file copied onto an existing directory lands inside it
            if first && !entry_type.is_dir() && out.is_dir() {
                if let Some(base) = name.last() {
                    out = out.join(base);
                }
            }

            // links unpacked by earlier entries must never be written through
            if let Some(link) = existing_symlink(dest_root, &out) {
                warn!(
                    entry = %raw_name,
                    link = %link.display(),
                    "Skipping tar entry that passes through a symlink"
                );
                continue;
            }

            if let Some(parent) = out.parent() {
                create_dir_all(parent)?;
            }

            if entry_type.is_dir() {
                create_dir_all(&out)?;
                continue;
            }

            if entry_type.is_symlink() {
                let target = entry
                    .link_name_bytes()
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
                    .unwrap_or_default();
                create_symlink(dest_root, &out, &target)?;
                continue;
            }

            if !(entry_type.is_file() || entry_type == EntryType::Continuous) {
                warn!(entry = %raw_name, kind = ?entry_type, "Skipping unsupported tar entry");
                continue;
            }

            debug!(entry = %raw_name, path = %out.display(), "Unpacking file");
            let mut file = File::create(&out)?;
            io::copy(&mut entry, &mut file)
                .map_err(|e| Error::Decoding(format!("reading body of '{}': {}", raw_name, e)))?;
            file.flush()?;
        }
    }

    // drain record padding so the producer never sees a closed pipe
    let mut rest = archive.into_inner();
    io::copy(&mut rest, &mut io::sink())
        .map_err(|e| Error::Decoding(format!("draining archive stream: {}", e)))?;

    if seen == 0 {
        return Err(Error::NoSuchEntry(strip_prefix.to_string()));
    }
    Ok(seen)
}

/// Run [`untar_all`] on the blocking pool, reading from an async pipe
pub fn spawn_decoder<R>(source: R, dest_root: PathBuf, strip_prefix: String) -> JoinHandle<Result<usize>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let source = SyncIoBridge::new(source);
    tokio::task::spawn_blocking(move || untar_all(source, &dest_root, &strip_prefix))
}

/// Resolve a slash separated path as if rooted at `/`, dropping `.` and
/// clamping `..` at the root
pub fn clean_components(path: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other.to_string()),
        }
    }
    out
}

fn join_under(root: &Path, components: &[String]) -> PathBuf {
    components
        .iter()
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// First existing symlink on the way from `root` down to `path`, the leaf
/// included
fn existing_symlink(root: &Path, path: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(root).ok()?;
    let mut current = root.to_path_buf();
    for part in relative.components() {
        current.push(part);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return Some(current),
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    None
}

fn base_name(path: &str) -> Option<String> {
    clean_components(path).pop()
}

fn create_dir_all(path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(path)?;
    Ok(())
}

/// Recreate a symlink, refusing targets that resolve outside `root`
fn create_symlink(root: &Path, link: &Path, target: &str) -> Result<()> {
    let Ok(link_rel) = link.strip_prefix(root) else {
        warn!(link = %link.display(), "Skipping symlink outside destination");
        return Ok(());
    };

    if target.starts_with('/') || escapes_root(link_rel, target) {
        warn!(
            link = %link.display(),
            target = %target,
            "Skipping symlink whose target leaves the destination"
        );
        return Ok(());
    }

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)?;
    }
    #[cfg(not(unix))]
    {
        warn!(link = %link.display(), "Symlinks are not supported on this platform");
    }
    Ok(())
}

fn escapes_root(link_rel: &Path, target: &str) -> bool {
    let mut depth: i64 = link_rel.components().count() as i64 - 1;
    for part in target.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            _ => depth += 1,
        }
    }
    false
}

/// Reader that yields exactly `expected` bytes from its inner reader
struct ExactReader<R> {
    inner: R,
    remaining: u64,
    consumed: u64,
}

impl<R> ExactReader<R> {
    fn new(inner: R, expected: u64) -> Self {
        Self {
            inner,
            remaining: expected,
            consumed: 0,
        }
    }

    fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl<R: Read> Read for ExactReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.remaining == 0 {
            let mut probe = [0u8; 1];
            return match self.inner.read(&mut probe)? {
                0 => Ok(0),
                _ => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("source is longer than the declared {} bytes", self.consumed),
                )),
            };
        }

        let max = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "source ended after {} of {} bytes",
                    self.consumed,
                    self.consumed + self.remaining
                ),
            ));
        }
        self.remaining -= n as u64;
        self.consumed += n as u64;
        Ok(n)
    }
}
