use std::io;
use std::path::{Path, PathBuf};

const CACHE_DIR_NAME: &str = "meteostations";

pub fn get_cache_dir() -> io::Result<PathBuf> {
    dirs::cache_dir()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine system cache directory",
            )
        })
        .map(|p| p.join(CACHE_DIR_NAME))
}

pub async fn ensure_cache_dir_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!(
                        "Cache path exists but is not a directory: {}",
                        path.display()
                    ),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("Creating cache directory: {}", path.display());
            tokio::fs::create_dir_all(path).await
        }
        Err(e) => Err(e),
    }
}

/// Extracts the host of a URL for log messages, falling back to the whole URL.
pub(crate) fn domain(url: &reqwest::Url) -> String {
    url.host_str()
        .map(str::to_string)
        .unwrap_or_else(|| url.to_string())
}
