//! Persistent installation identity.
//!
//! The device id is generated once on first read and then returned
//! unchanged for the lifetime of the installation. It lives outside the
//! sample database so that wiping the cache does not change identity.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};
use uuid::Uuid;

use geotrack_types::DeviceId;

use crate::error::{Error, Result};

/// Source of the stable device identifier.
///
/// Implementations create the id on first access and return the same value
/// afterwards.
pub trait DeviceIdStore: Send + Sync {
    /// Return the persisted id, generating and persisting one if absent.
    fn load_or_create(&self) -> Result<DeviceId>;
}

/// Generate a fresh random device id (`device_` followed by 8 hex chars).
pub fn generate_device_id() -> DeviceId {
    let token = Uuid::new_v4().simple().to_string();
    DeviceId::new(format!("device_{}", &token[..8]))
        .unwrap_or_else(|_| unreachable!("generated id is never blank"))
}

/// Device id persisted as a single line in a file.
#[derive(Debug, Clone)]
pub struct FileDeviceIdStore {
    path: PathBuf,
}

impl FileDeviceIdStore {
    /// Use the given file.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Use the platform default location.
    pub fn open_default() -> Self {
        Self::new(crate::default_device_id_path())
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_existing(&self) -> Result<Option<DeviceId>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(DeviceId::new(content).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Identity {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    fn persist(&self, id: &DeviceId) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(&self.path, format!("{}\n", id)).map_err(|e| Error::Identity {
            path: self.path.clone(),
            source: e,
        })
    }
}

impl DeviceIdStore for FileDeviceIdStore {
    fn load_or_create(&self) -> Result<DeviceId> {
        if let Some(id) = self.read_existing()? {
            debug!("Loaded device id {} from {}", id, self.path.display());
            return Ok(id);
        }

        let id = generate_device_id();
        self.persist(&id)?;
        info!("Generated device id {} at {}", id, self.path.display());
        Ok(id)
    }
}

/// In-memory device id, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryDeviceIdStore {
    id: Mutex<Option<DeviceId>>,
}

impl MemoryDeviceIdStore {
    /// Start empty; an id is generated on first access.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a fixed id.
    pub fn with_id(id: DeviceId) -> Self {
        Self {
            id: Mutex::new(Some(id)),
        }
    }
}

impl DeviceIdStore for MemoryDeviceIdStore {
    fn load_or_create(&self) -> Result<DeviceId> {
        let mut slot = self.id.lock().unwrap_or_else(|e| e.into_inner());
        Ok(slot.get_or_insert_with(generate_device_id).clone())
    }
}
