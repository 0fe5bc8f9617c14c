use serde::{Deserialize, Serialize};

/// One node of a user's directory tree, as sent to the browser.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileSystemEntry>>,
}

impl FileSystemEntry {
    pub fn file(name: String, path: String, size: u64) -> Self {
        Self {
            name,
            path,
            is_directory: false,
            size: Some(size),
            children: None,
        }
    }

    pub fn directory(name: String, path: String, children: Vec<FileSystemEntry>) -> Self {
        Self {
            name,
            path,
            is_directory: true,
            size: None,
            children: Some(children),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageUsage {
    pub used: u64,
    pub max: u64,
}

/// One file of a multipart upload, already read into memory.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub name: String,
    pub data: bytes::Bytes,
}
