/// Local copy of each finished strip
///
/// Offered to the guest as soon as the print finishes, whether or not the
/// upload succeeded.

use std::path::{Path, PathBuf};

use crate::compositor::CompositeStrip;
use crate::error::SaveError;

/// Write the strip to `dir/filename`, creating `dir` if needed
pub async fn save_strip(
    dir: &Path,
    filename: &str,
    strip: &CompositeStrip,
) -> Result<PathBuf, SaveError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| SaveError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

    let path = dir.join(filename);
    tokio::fs::write(&path, &strip.png[..])
        .await
        .map_err(|source| SaveError::Write {
            path: path.clone(),
            source,
        })?;

    tracing::info!("💾 Saved strip to {}", path.display());
    Ok(path)
}
