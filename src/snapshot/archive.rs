// ABOUTME: Blocking file helpers for bundle artifacts: tar.gz packing, gzip, copies, digests.
// ABOUTME: Callers run these on the blocking thread pool.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use walkdir::WalkDir;

/// Pack the contents of `src` into a gzip-compressed tarball at `dest`.
///
/// Entries are relative to `src`; symlinks are stored as links.
pub fn pack_dir(src: &Path, dest: &Path) -> io::Result<()> {
    let file = File::create(dest)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder.append_dir_all(".", src)?;
    let encoder = builder.into_inner()?;
    let file = encoder.finish()?;
    file.sync_all()
}

/// Unpack a tarball produced by [`pack_dir`] into `dest`, creating it.
pub fn unpack(archive: &Path, dest: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dest)?;
    let file = File::open(archive)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.unpack(dest)
}

/// Write `data` gzip-compressed to `dest`.
pub fn gzip_to(data: &[u8], dest: &Path) -> io::Result<()> {
    let file = File::create(dest)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(data)?;
    encoder.finish()?.sync_all()
}

/// Read and decompress a gzip file.
pub fn gunzip(path: &Path) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(path)?));
    let mut data = Vec::new();
    decoder.read_to_end(&mut data)?;
    Ok(data)
}

/// Copy a file or a directory tree from `src` to `dest`.
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    if src.is_file() {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dest)?;
        return Ok(());
    }

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping non-regular file");
        }
    }
    Ok(())
}

/// Size of a file, or the total size of the regular files under a directory.
pub fn measure(path: &Path) -> io::Result<u64> {
    let metadata = std::fs::metadata(path)?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }

    let mut total = 0;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(io::Error::from)?.len();
        }
    }
    Ok(total)
}

/// Hex sha256 of a file, or of every regular file under a directory taken in
/// sorted path order (each prefixed by its relative path).
pub fn digest(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();

    if std::fs::metadata(path)?.is_file() {
        hash_file(&mut hasher, path)?;
        return Ok(hex::encode(hasher.finalize()));
    }

    for entry in WalkDir::new(path)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(path)
            .map_err(|e| io::Error::other(e.to_string()))?;
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hash_file(&mut hasher, entry.path())?;
    }
    Ok(hex::encode(hasher.finalize()))
}

fn hash_file(hasher: &mut Sha256, path: &Path) -> io::Result<()> {
    let mut file = BufReader::new(File::open(path)?);
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        hasher.update(&buf[..n]);
    }
}

/// Remove a file or directory tree.
pub fn remove_path(path: &Path) -> io::Result<()> {
    if std::fs::symlink_metadata(path)?.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
