/// Staging of uploaded images. The file lives as long as the guard and is
/// removed on drop, whether the request succeeded or not.
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::ParserResult;

pub const UPLOAD_PREFIX: &str = "upload_";
const DEFAULT_EXTENSION: &str = "png";

pub struct TempUpload {
    path: PathBuf,
    _file: NamedTempFile,
}

impl TempUpload {
    /// Write `bytes` to a fresh `upload_*.<ext>` file inside `dir`.
    pub fn write(dir: &Path, extension: &str, bytes: &[u8]) -> ParserResult<Self> {
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::Builder::new()
            .prefix(UPLOAD_PREFIX)
            .suffix(&format!(".{extension}"))
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        let path = file.path().to_path_buf();
        debug!(path = %path.display(), size = bytes.len(), "upload staged");
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRef<Path> for TempUpload {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Extension of the client's file name, if it is a plain alphanumeric one.
/// Image decoding sniffs content, so the extension only shapes output names.
pub fn upload_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
