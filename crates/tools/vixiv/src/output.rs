//! File payloads returned by the Voxelize service
//!
//! Mesh results come back inline as hex-encoded bytes together with the
//! server-side filename. This module decodes them and writes them to disk.

use crate::types::{Result, VixivError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Inline file returned by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    /// Server-side file name (no directory components are trusted)
    pub filename: String,
    /// Hex-encoded file bytes
    pub file_content: String,
}

impl FilePayload {
    /// Decode the hex content into raw bytes
    pub fn decode(&self) -> Result<Vec<u8>> {
        decode_hex(&self.file_content)
    }

    /// File name with any directory components stripped
    pub fn file_name(&self) -> Result<&str> {
        Path::new(&self.filename)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                VixivError::ParseError(format!("Invalid file name in response: {:?}", self.filename))
            })
    }
}

/// Decode a hex string (either case) into bytes
pub fn decode_hex(input: &str) -> Result<Vec<u8>> {
    let input = input.trim();
    if input.len() % 2 != 0 {
        return Err(VixivError::Decode(format!(
            "Hex content has odd length {}",
            input.len()
        )));
    }

    input
        .as_bytes()
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| match (hex_value(pair[0]), hex_value(pair[1])) {
            (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
            _ => Err(VixivError::Decode(format!(
                "Invalid hex digit near offset {}",
                i * 2
            ))),
        })
        .collect()
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Default destination for a voxelized network: `voxelized_<name>` next to the skin
pub fn default_network_path(skin_path: &Path, payload: &FilePayload) -> Result<PathBuf> {
    let dir = skin_path.parent().unwrap_or_else(|| Path::new(""));
    Ok(dir.join(format!("voxelized_{}", payload.file_name()?)))
}

/// Decode a payload and write it to `path`, creating parent directories
pub async fn write_payload(payload: &FilePayload, path: &Path) -> Result<PathBuf> {
    let bytes = payload.decode()?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, &bytes).await?;
    tracing::info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(path.to_path_buf())
}
