//! Image attachments, sent to the server as standard base64 strings.

use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use snafu::{ResultExt, Snafu, ensure};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AttachmentError {
    #[snafu(display("[{stage}] failed to read image {}: {source}", path.display()))]
    ReadImage {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("[{stage}] image {} is empty", path.display()))]
    EmptyImage { stage: &'static str, path: PathBuf },
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;

pub fn encode_image_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn encode_image_file(path: &Path) -> AttachmentResult<String> {
    let bytes = std::fs::read(path).context(ReadImageSnafu {
        stage: "read-image-file",
        path: path.to_path_buf(),
    })?;
    ensure!(
        !bytes.is_empty(),
        EmptyImageSnafu {
            stage: "read-image-file",
            path: path.to_path_buf(),
        }
    );

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "encoded image attachment");
    Ok(encode_image_bytes(&bytes))
}
