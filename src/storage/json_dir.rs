//! Flat-file backend writing one JSON document per channel.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use super::{ChannelRecord, EndpointRecord, StorageBackend, StorageError};
use crate::channel::{Channel, ChannelKey};
use crate::endpoint::Location;
use crate::CHANNEL_FILE_EXTENSION;

/// On-disk document for a single channel.
#[derive(Debug, Serialize, Deserialize)]
struct ChannelDocument {
    #[serde(flatten)]
    record: ChannelRecord,
    #[serde(default)]
    endpoints: Vec<EndpointRecord>,
}

impl ChannelDocument {
    fn into_channel(self) -> Result<Channel, StorageError> {
        let endpoints = self
            .endpoints
            .into_iter()
            .map(EndpointRecord::into_endpoint)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Channel {
            name: self.record.name,
            owners: self.record.owners,
            endpoints,
        })
    }
}

/// Stores each channel as `<dir>/<key>.json`.
///
/// Keys are case-folded, so `Red` and `red` share one file. Characters that
/// are unsafe in file names are percent-encoded.
#[derive(Debug, Clone)]
pub struct JsonDirBackend {
    dir: PathBuf,
}

impl JsonDirBackend {
    /// Creates a backend rooted at `dir`. Nothing is touched until `init`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the channel documents.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &ChannelKey) -> PathBuf {
        let mut file = String::with_capacity(key.as_str().len());
        for byte in key.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                file.push(char::from(byte));
            } else {
                file.push_str(&format!("%{byte:02X}"));
            }
        }
        self.dir.join(format!("{file}.{CHANNEL_FILE_EXTENSION}"))
    }

    fn read(&self, key: &ChannelKey) -> Result<Option<ChannelDocument>, StorageError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::io(path, err)),
        }
    }

    fn read_existing(&self, key: &ChannelKey) -> Result<ChannelDocument, StorageError> {
        self.read(key)?
            .ok_or_else(|| StorageError::MissingChannel(key.to_string()))
    }

    fn write(&self, key: &ChannelKey, document: &ChannelDocument) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(document)?;
        fs::write(&tmp, bytes).map_err(|err| StorageError::io(&tmp, err))?;
        fs::rename(&tmp, &path).map_err(|err| StorageError::io(&path, err))?;
        debug!("wrote channel document {}", path.display());
        Ok(())
    }
}

impl StorageBackend for JsonDirBackend {
    fn init(&mut self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|err| StorageError::io(&self.dir, err))
    }

    fn list_channels(&mut self) -> Result<Vec<Channel>, StorageError> {
        let entries = fs::read_dir(&self.dir).map_err(|err| StorageError::io(&self.dir, err))?;
        let mut channels = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| StorageError::io(&self.dir, err))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CHANNEL_FILE_EXTENSION) {
                continue;
            }
            let bytes = fs::read(&path).map_err(|err| StorageError::io(&path, err))?;
            let document: ChannelDocument = serde_json::from_slice(&bytes)?;
            channels.push(document.into_channel()?);
        }
        channels.sort_by_key(Channel::key);
        Ok(channels)
    }

    fn channel(&mut self, key: &ChannelKey) -> Result<Option<Channel>, StorageError> {
        self.read(key)?.map(ChannelDocument::into_channel).transpose()
    }

    fn insert_channel(&mut self, record: &ChannelRecord) -> Result<(), StorageError> {
        let key = ChannelKey::new(&record.name);
        let endpoints = self.read(&key)?.map(|d| d.endpoints).unwrap_or_default();
        self.write(
            &key,
            &ChannelDocument {
                record: record.clone(),
                endpoints,
            },
        )
    }

    fn update_channel(
        &mut self,
        key: &ChannelKey,
        record: &ChannelRecord,
    ) -> Result<(), StorageError> {
        let mut document = self.read_existing(key)?;
        document.record = record.clone();
        self.write(key, &document)
    }

    fn delete_channel(&mut self, key: &ChannelKey) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::io(path, err)),
        }
    }

    fn insert_endpoint(
        &mut self,
        key: &ChannelKey,
        record: &EndpointRecord,
    ) -> Result<(), StorageError> {
        let mut document = self.read_existing(key)?;
        let location = record.location();
        document.endpoints.retain(|e| e.location() != location);
        document.endpoints.push(record.clone());
        self.write(key, &document)
    }

    fn delete_endpoint(
        &mut self,
        key: &ChannelKey,
        location: &Location,
    ) -> Result<(), StorageError> {
        let Some(mut document) = self.read(key)? else {
            return Ok(());
        };
        document.endpoints.retain(|e| &e.location() != location);
        self.write(key, &document)
    }
}
