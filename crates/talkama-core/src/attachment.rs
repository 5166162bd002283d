//! Image attachments
//!
//! Turns a picked file or a drag-and-drop payload into a [`Base64Blob`], the single
//! encoded form the request pipeline passes through to the backend. The loader only
//! reads local files; it never touches the network.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as Base64Standard, Engine};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::AttachmentError;

/// Base64 text of arbitrary binary image bytes. Never inspected, only passed through.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Base64Blob(String);

impl Base64Blob {
    pub fn encode(bytes: impl AsRef<[u8]>) -> Self {
        Self(Base64Standard.encode(bytes))
    }

    /// Accept already-encoded text, checking that it decodes.
    pub fn from_base64(encoded: impl Into<String>) -> Result<Self, AttachmentError> {
        let encoded = encoded.into();
        Base64Standard.decode(encoded.as_bytes())?;
        Ok(Self(encoded))
    }

    /// Strip a `data:<mime>;base64,` prefix and keep the bare payload.
    pub fn from_data_url(data_url: &str) -> Result<Self, AttachmentError> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or_else(|| AttachmentError::InvalidDataUrl("missing data: scheme".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| AttachmentError::InvalidDataUrl("missing ',' separator".to_string()))?;

        if !header.ends_with(";base64") {
            return Err(AttachmentError::InvalidDataUrl(format!(
                "unsupported encoding in '{}'",
                header
            )));
        }

        Self::from_base64(payload)
    }

    pub fn decode(&self) -> Result<Vec<u8>, AttachmentError> {
        Ok(Base64Standard.decode(self.0.as_bytes())?)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Size of the original bytes, computed from the encoded length.
    pub fn decoded_len(&self) -> usize {
        let padding = self.0.bytes().rev().take_while(|b| *b == b'=').count();
        (self.0.len() / 4 * 3).saturating_sub(padding)
    }
}

impl fmt::Debug for Base64Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Base64Blob({} bytes)", self.decoded_len())
    }
}

/// One entry of a drag-and-drop payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DroppedItem {
    Path(PathBuf),
    DataUrl(String),
}

impl DroppedItem {
    fn from_token(token: &str) -> Self {
        if token.starts_with("data:") {
            return DroppedItem::DataUrl(token.to_string());
        }

        if token.starts_with("file://") {
            if let Ok(path) = Url::parse(token).map_err(|_| ()).and_then(|u| u.to_file_path()) {
                return DroppedItem::Path(path);
            }
        }

        DroppedItem::Path(PathBuf::from(token))
    }
}

/// Split a dropped payload into entries.
///
/// Terminals deliver dropped files as pasted text: whitespace separated, each path
/// optionally quoted or with backslash-escaped spaces, sometimes as `file://` URLs.
/// A backslash only escapes whitespace or a quote, so `C:\Users\me\a.png` survives.
pub fn parse_drop_payload(payload: &str) -> Vec<DroppedItem> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = payload.chars().peekable();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => quote = Some(c),
            (None, '\\') => match chars.peek() {
                Some(&next) if next.is_whitespace() || next == '\'' || next == '"' => {
                    current.push(next);
                    chars.next();
                }
                _ => current.push('\\'),
            },
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens.iter().map(|t| DroppedItem::from_token(t)).collect()
}

/// The file-selection surface. `None` means the user cancelled.
#[async_trait]
pub trait FileDialog: Send + Sync {
    async fn select_file(&self) -> Option<PathBuf>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AttachmentLoader;

impl AttachmentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Ask the dialog for a file and encode it. Cancelling is not an error.
    pub async fn pick_file<D>(&self, dialog: &D) -> Result<Option<Base64Blob>, AttachmentError>
    where
        D: FileDialog + ?Sized,
    {
        let Some(path) = dialog.select_file().await else {
            debug!("file selection cancelled");
            return Ok(None);
        };

        self.load_path(&path).await.map(Some)
    }

    pub async fn load_path(&self, path: &Path) -> Result<Base64Blob, AttachmentError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| {
            warn!(path = %path.display(), error = %source, "failed to read attachment");
            AttachmentError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        debug!(path = %path.display(), bytes = bytes.len(), "attachment loaded");
        Ok(Base64Blob::encode(bytes))
    }

    /// Only the first dropped entry is used; the rest are ignored.
    pub async fn from_drop(&self, items: &[DroppedItem]) -> Result<Option<Base64Blob>, AttachmentError> {
        let Some(first) = items.first() else {
            return Ok(None);
        };

        if items.len() > 1 {
            debug!(ignored = items.len() - 1, "only the first dropped file is attached");
        }

        let blob = match first {
            DroppedItem::Path(path) => self.load_path(path).await?,
            DroppedItem::DataUrl(data_url) => Base64Blob::from_data_url(data_url)?,
        };
        Ok(Some(blob))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct FixedDialog(Option<PathBuf>);

    #[async_trait]
    impl FileDialog for FixedDialog {
        async fn select_file(&self) -> Option<PathBuf> {
            self.0.clone()
        }
    }

    #[test]
    fn test_blob_decodes_to_original_bytes() {
        let bytes = [0u8, 159, 146, 150, 255, 1];
        let blob = Base64Blob::encode(bytes);
        assert_eq!(blob.decode().unwrap(), bytes);
        assert_eq!(blob.decoded_len(), bytes.len());
    }

    #[test]
    fn test_data_url_prefix_is_stripped() {
        let blob = Base64Blob::from_data_url("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(blob.as_str(), "aGVsbG8=");
        assert_eq!(blob.decode().unwrap(), b"hello");
    }

    #[test]
    fn test_data_url_without_base64_is_rejected() {
        let err = Base64Blob::from_data_url("data:text/plain,hello").unwrap_err();
        assert!(matches!(err, AttachmentError::InvalidDataUrl(_)));
        assert!(Base64Blob::from_data_url("image/png;base64,aGVsbG8=").is_err());
        assert!(Base64Blob::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_parse_drop_payload_variants() {
        let items = parse_drop_payload("'/tmp/my pic.png' /tmp/other\\ one.jpg\nfile:///tmp/third.gif");
        assert_eq!(
            items,
            vec![
                DroppedItem::Path(PathBuf::from("/tmp/my pic.png")),
                DroppedItem::Path(PathBuf::from("/tmp/other one.jpg")),
                DroppedItem::Path(PathBuf::from("/tmp/third.gif")),
            ]
        );

        let items = parse_drop_payload(r"C:\Users\me\a.png \\server\share\b.png");
        assert_eq!(
            items,
            vec![
                DroppedItem::Path(PathBuf::from(r"C:\Users\me\a.png")),
                DroppedItem::Path(PathBuf::from(r"\\server\share\b.png")),
            ]
        );

        let items = parse_drop_payload("data:image/png;base64,aGVsbG8=");
        assert_eq!(items, vec![DroppedItem::DataUrl("data:image/png;base64,aGVsbG8=".to_string())]);

        assert!(parse_drop_payload("   \n").is_empty());
    }

    #[tokio::test]
    async fn test_pick_file_cancel_returns_none() {
        let loader = AttachmentLoader::new();
        let picked = loader.pick_file(&FixedDialog(None)).await.unwrap();
        assert!(picked.is_none());
    }

    #[tokio::test]
    async fn test_pick_file_reads_and_encodes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x89PNG fake image").unwrap();

        let loader = AttachmentLoader::new();
        let blob = loader
            .pick_file(&FixedDialog(Some(file.path().to_path_buf())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(blob.decode().unwrap(), b"\x89PNG fake image");
    }

    #[tokio::test]
    async fn test_pick_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");

        let loader = AttachmentLoader::new();
        let err = loader.pick_file(&FixedDialog(Some(missing.clone()))).await.unwrap_err();
        match err {
            AttachmentError::Read { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_drop_uses_first_entry_only() {
        let mut first = tempfile::NamedTempFile::new().unwrap();
        first.write_all(b"first").unwrap();
        let dir = tempfile::tempdir().unwrap();

        let items = vec![
            DroppedItem::Path(first.path().to_path_buf()),
            DroppedItem::Path(dir.path().join("does-not-exist.png")),
        ];
        let blob = AttachmentLoader::new().from_drop(&items).await.unwrap().unwrap();
        assert_eq!(blob.decode().unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_drop_data_url_and_empty() {
        let loader = AttachmentLoader::new();
        assert!(loader.from_drop(&[]).await.unwrap().is_none());

        let items = vec![DroppedItem::DataUrl("data:image/jpeg;base64,AAEC".to_string())];
        let blob = loader.from_drop(&items).await.unwrap().unwrap();
        assert_eq!(blob.as_str(), "AAEC");
    }
}
