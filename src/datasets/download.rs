use std::{
    fs::{self, File},
    io::{BufWriter, Read, Write},
    path::{Component, Path, PathBuf},
};

use tracing::{debug, info};

use super::{catalog::RemoteFile, errors::RetrievalError};

/// Fetches the bytes behind a URL.
pub trait Transport: Send + Sync {
    fn download(&self, url: &str, verbose: bool) -> Result<Vec<u8>, RetrievalError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn download(&self, url: &str, verbose: bool) -> Result<Vec<u8>, RetrievalError> {
        (**self).download(url, verbose)
    }
}

#[cfg(feature = "download")]
pub use curl_transport::CurlTransport;

#[cfg(feature = "download")]
mod curl_transport {
    use curl::easy::Easy;
    use tracing::info;

    use super::{RetrievalError, Transport};

    #[derive(Debug, Clone, Copy, Default)]
    pub struct CurlTransport;

    impl Transport for CurlTransport {
        fn download(&self, url: &str, verbose: bool) -> Result<Vec<u8>, RetrievalError> {
            let network = |e: curl::Error| RetrievalError::network(url, e);

            let mut compressed = Vec::new();
            let mut easy = Easy::new();
            easy.url(url).map_err(network)?;
            easy.follow_location(true).map_err(network)?;
            easy.fail_on_error(true).map_err(network)?;
            easy.progress(verbose).map_err(network)?;

            info!(url, "downloading");
            {
                let mut dl = easy.transfer();
                let pb = if verbose {
                    indicatif::ProgressBar::new(1)
                } else {
                    indicatif::ProgressBar::hidden()
                };
                dl.progress_function(move |total_dl, cur_dl, _, _| {
                    pb.set_length(total_dl as u64);
                    pb.set_position(cur_dl as u64);
                    true
                })
                .map_err(network)?;
                dl.write_function(|data| {
                    compressed.extend_from_slice(data);
                    Ok(data.len())
                })
                .map_err(network)?;
                dl.perform().map_err(network)?;
            }
            Ok(compressed)
        }
    }
}

/// Checks size and md5 before anything touches the disk.
pub(crate) fn verify(file: &RemoteFile, bytes: &[u8]) -> Result<(), RetrievalError> {
    if let Some(size) = file.size {
        if bytes.len() as u64 != size {
            return Err(RetrievalError::Integrity {
                url: file.url.clone(),
                expected: format!("{size} bytes"),
                found: format!("{} bytes", bytes.len()),
            });
        }
    }
    if let Some(md5) = &file.md5 {
        debug!(url = %file.url, md5 = %md5, "verifying hash");
        let digest = format!("{:x}", md5::compute(bytes));
        if !digest.eq_ignore_ascii_case(md5) {
            return Err(RetrievalError::Integrity {
                url: file.url.clone(),
                expected: md5.clone(),
                found: digest,
            });
        }
    }
    Ok(())
}

fn url_file_name(url: &str) -> &str {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    url.rsplit('/').next().unwrap_or(url)
}

/// Rejects absolute paths and `..` so nothing escapes the cache entry.
fn relative_target(root: &Path, relative: &str) -> Result<PathBuf, RetrievalError> {
    let relative = Path::new(relative);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.as_os_str().is_empty() || escapes {
        return Err(RetrievalError::InvalidCatalog(format!(
            "`{}` is not a relative path inside the cache entry",
            relative.display()
        )));
    }
    Ok(root.join(relative))
}

fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut uncompressed = Vec::new();
    flate2::read::GzDecoder::new(bytes).read_to_end(&mut uncompressed)?;
    Ok(uncompressed)
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    debug!("Writing {} bytes to {}", bytes.len(), path.display());
    let mut o = BufWriter::new(File::create(path)?);
    o.write_all(bytes)?;
    o.flush()
}

/// Places a verified download under `root`.
///
/// `.tar.gz`/`.tgz` archives are unpacked into `path` (default `root`), `.gz`
/// files are deflated to `path` (default: URL file name minus `.gz`), and
/// everything else is written verbatim.
pub(crate) fn unpack(root: &Path, file: &RemoteFile, bytes: Vec<u8>) -> Result<(), RetrievalError> {
    let name = url_file_name(&file.url);
    if name.is_empty() && file.path.is_none() {
        return Err(RetrievalError::InvalidCatalog(format!(
            "cannot infer a file name from {}",
            file.url
        )));
    }

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let target = match &file.path {
            Some(p) => relative_target(root, p)?,
            None => root.to_path_buf(),
        };
        info!("Deflating {} bytes", bytes.len());
        let uncompressed = gunzip(&bytes)?;
        fs::create_dir_all(&target)?;
        let mut archive = tar::Archive::new(&uncompressed[..]);
        archive.unpack(&target)?;
    } else if let Some(stripped) = name.strip_suffix(".gz") {
        let target = relative_target(root, file.path.as_deref().unwrap_or(stripped))?;
        info!("Deflating {} bytes", bytes.len());
        write_file(&target, &gunzip(&bytes)?)?;
    } else {
        let target = relative_target(root, file.path.as_deref().unwrap_or(name))?;
        write_file(&target, &bytes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(bytes).unwrap();
        gz.finish().unwrap()
    }

    fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *content).unwrap();
        }
        gzip(&builder.into_inner().unwrap())
    }

    #[test]
    fn verify_checks_md5_and_size() {
        let bytes = b"a\tb\n";
        let digest = format!("{:x}", md5::compute(bytes));
        let file = RemoteFile::new("https://example.org/e.tsv")
            .with_md5(digest.to_uppercase())
            .with_size(4);
        verify(&file, bytes).unwrap();

        let err = verify(&file.clone().with_md5("0".repeat(32)), bytes).unwrap_err();
        assert!(matches!(err, RetrievalError::Integrity { .. }));
        let err = verify(&file.with_size(5), bytes).unwrap_err();
        assert!(matches!(err, RetrievalError::Integrity { .. }));
    }

    #[test]
    fn plain_files_use_the_url_name() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = RemoteFile::new("https://example.org/data/edges.tsv?download=1");
        unpack(tmp.path(), &file, b"a\tb\n".to_vec()).unwrap();
        assert_eq!(fs::read(tmp.path().join("edges.tsv")).unwrap(), b"a\tb\n");
    }

    #[test]
    fn gz_files_are_deflated() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = RemoteFile::new("https://example.org/edges.tsv.gz");
        unpack(tmp.path(), &file, gzip(b"x\ty\n")).unwrap();
        assert_eq!(fs::read(tmp.path().join("edges.tsv")).unwrap(), b"x\ty\n");

        let file = file.with_path("nested/renamed.tsv");
        unpack(tmp.path(), &file, gzip(b"x\ty\n")).unwrap();
        assert!(tmp.path().join("nested/renamed.tsv").exists());
    }

    #[test]
    fn tarballs_are_unpacked() {
        let tmp = tempfile::TempDir::new().unwrap();
        let archive = tar_gz(&[("graph/edges.tsv", b"a\tb\n"), ("graph/nodes.tsv", b"a\nb\n")]);
        let file = RemoteFile::new("https://example.org/graph.tar.gz").with_path("unpacked");
        unpack(tmp.path(), &file, archive).unwrap();
        assert!(tmp.path().join("unpacked/graph/edges.tsv").exists());
        assert!(tmp.path().join("unpacked/graph/nodes.tsv").exists());
    }

    #[test]
    fn paths_cannot_escape_the_entry() {
        let tmp = tempfile::TempDir::new().unwrap();
        for path in ["../outside.tsv", "/etc/passwd", ""] {
            let file = RemoteFile::new("https://example.org/e.tsv").with_path(path);
            let err = unpack(tmp.path(), &file, Vec::new()).unwrap_err();
            assert!(matches!(err, RetrievalError::InvalidCatalog(_)), "{path}");
        }
    }
}
