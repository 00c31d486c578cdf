use std::fs;
use std::path::{Path, PathBuf};

use super::document::Document;
use super::index::VectorIndex;
use crate::error::AssistantError;

const DOCUMENTS_FILE: &str = "documents.json";
const INDEX_FILE: &str = "index.json";

/// On-disk layout of the recipe store: the document set (source of truth)
/// and a cached copy of the vector index.
pub struct DocumentStorage {
    dir: PathBuf,
}

impl DocumentStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load_documents(&self) -> Result<Vec<Document>, AssistantError> {
        let path = self.dir.join(DOCUMENTS_FILE);

        match fs::read_to_string(&path) {
            Ok(contents) => {
                if contents.trim().is_empty() {
                    return Ok(Vec::new());
                }

                serde_json::from_str(&contents).map_err(|error| {
                    AssistantError::Storage(format!(
                        "failed to parse documents {}: {error}",
                        path.display()
                    ))
                })
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(AssistantError::Storage(format!(
                "failed to read documents {}: {error}",
                path.display()
            ))),
        }
    }

    pub fn save_documents(&self, documents: &[Document]) -> Result<(), AssistantError> {
        let json = serde_json::to_string_pretty(documents).map_err(|error| {
            AssistantError::Storage(format!("failed to serialize documents: {error}"))
        })?;

        self.write(DOCUMENTS_FILE, json)
    }

    /// The cached index, or `None` when absent or unreadable
    pub fn load_index(&self) -> Option<VectorIndex> {
        let path = self.dir.join(INDEX_FILE);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("failed to read index cache {}: {error}", path.display());
                }
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(index) => Some(index),
            Err(error) => {
                log::warn!("discarding unreadable index cache {}: {error}", path.display());
                None
            }
        }
    }

    pub fn save_index(&self, index: &VectorIndex) -> Result<(), AssistantError> {
        let json = serde_json::to_string(index).map_err(|error| {
            AssistantError::Storage(format!("failed to serialize index: {error}"))
        })?;

        self.write(INDEX_FILE, json)
    }

    pub fn remove_index(&self) -> Result<(), AssistantError> {
        let path = self.dir.join(INDEX_FILE);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(AssistantError::Storage(format!(
                "failed to remove index cache {}: {error}",
                path.display()
            ))),
        }
    }

    fn write(&self, file_name: &str, contents: String) -> Result<(), AssistantError> {
        fs::create_dir_all(&self.dir).map_err(|error| {
            AssistantError::Storage(format!(
                "failed to create store directory {}: {error}",
                self.dir.display()
            ))
        })?;

        let path = self.dir.join(file_name);
        fs::write(&path, contents).map_err(|error| {
            AssistantError::Storage(format!("failed to write {}: {error}", path.display()))
        })
    }
}
