// State module - durable store of service records

use crate::config::ServiceDefaults;
use crate::error::{OverseerError, Result};
use crate::process::spawner::parse_command;
use crate::service::{ServiceId, ServiceRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Version of the services file format
const STATE_VERSION: &str = "1";

/// Request to register a new service
#[derive(Debug, Clone, Default)]
pub struct NewService {
    pub name: String,
    pub command: String,
    /// Falls back to the configured default when unset
    pub auto_restart: Option<bool>,
    /// Falls back to the caller's current directory when unset
    pub working_directory: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
    pub max_restart_attempts: Option<u32>,
    pub restart_delay: Option<u64>,
}

impl NewService {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Self::default()
        }
    }
}

/// On-disk layout: every record keyed by id
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServicesDocument {
    version: String,
    services: BTreeMap<ServiceId, ServiceRecord>,
}

impl ServicesDocument {
    fn validate(&self) -> Result<()> {
        if self.version != STATE_VERSION {
            return Err(OverseerError::StateCorruption(format!(
                "Incompatible services file version: expected {}, found {}",
                STATE_VERSION, self.version
            )));
        }

        let mut seen_names = HashSet::new();
        for (id, record) in &self.services {
            if *id != record.id {
                return Err(OverseerError::StateCorruption(format!(
                    "Service keyed as {} carries id {}",
                    id, record.id
                )));
            }
            if !seen_names.insert(record.name.as_str()) {
                return Err(OverseerError::StateCorruption(format!(
                    "Duplicate service name found: {}",
                    record.name
                )));
            }
        }

        Ok(())
    }
}

/// Keyed repository of service records backed by a single JSON document.
///
/// The whole document is rewritten on every mutation through a temporary
/// file and an atomic rename, so readers never observe a partial write.
pub struct ServiceStore {
    path: PathBuf,
    services: HashMap<ServiceId, ServiceRecord>,
}

impl ServiceStore {
    /// Open the store at `path`, loading any existing records
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let services = Self::load(&path)?;
        Ok(Self { path, services })
    }

    /// Re-read the document so changes made by other processes are visible
    pub fn reload(&mut self) -> Result<()> {
        self.services = Self::load(&self.path)?;
        Ok(())
    }

    /// Register a new service and persist it
    pub fn add(&mut self, new: NewService, defaults: &ServiceDefaults) -> Result<ServiceRecord> {
        self.reload()?;

        let name = new.name.trim().to_string();
        if name.is_empty() || name.chars().any(char::is_control) {
            return Err(OverseerError::InvalidName(format!("{:?}", new.name)));
        }
        parse_command(&new.command)?;

        if self.get_by_name(&name).is_some() {
            return Err(OverseerError::DuplicateName(name));
        }

        let working_directory = match new.working_directory {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };

        let mut record = ServiceRecord::new(
            self.generate_id(),
            name,
            new.command.trim().to_string(),
            working_directory,
        );
        record.auto_restart = new.auto_restart.unwrap_or(defaults.auto_restart);
        record.max_restart_attempts = new
            .max_restart_attempts
            .unwrap_or(defaults.max_restart_attempts);
        record.restart_delay = new.restart_delay.unwrap_or(defaults.restart_delay);
        record.environment = new.environment;

        // Listing order is creation order, so creation times must be distinct
        if let Some(latest) = self.services.values().map(|s| s.created_at).max() {
            if record.created_at <= latest {
                record.created_at = latest + chrono::Duration::microseconds(1);
                record.updated_at = record.created_at;
            }
        }

        self.services.insert(record.id.clone(), record.clone());
        if let Err(e) = self.save() {
            self.services.remove(&record.id);
            return Err(e);
        }

        debug!(service = %record.name, id = %record.id, "service added");
        Ok(record)
    }

    pub fn get_by_id(&self, id: &str) -> Option<&ServiceRecord> {
        self.services.get(&ServiceId::new(id))
    }

    pub fn get_by_name(&self, name: &str) -> Option<&ServiceRecord> {
        self.services.values().find(|s| s.name == name)
    }

    /// Resolve an identifier, trying the id first and then the name
    pub fn find_by_id_or_name(&self, id_or_name: &str) -> Option<&ServiceRecord> {
        self.get_by_id(id_or_name)
            .or_else(|| self.get_by_name(id_or_name))
    }

    /// All records in creation order
    pub fn list_all(&self) -> Vec<ServiceRecord> {
        let mut services: Vec<ServiceRecord> = self.services.values().cloned().collect();
        services.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        services
    }

    /// Replace an existing record and persist
    pub fn update(&mut self, record: ServiceRecord) -> Result<()> {
        self.reload()?;

        let Some(slot) = self.services.get_mut(&record.id) else {
            return Err(OverseerError::NotFound(record.id.to_string()));
        };
        let previous = std::mem::replace(slot, record);

        if let Err(e) = self.save() {
            self.services.insert(previous.id.clone(), previous);
            return Err(e);
        }

        Ok(())
    }

    /// Delete a record and persist
    pub fn remove(&mut self, id: &ServiceId) -> Result<ServiceRecord> {
        self.reload()?;

        let removed = self
            .services
            .remove(id)
            .ok_or_else(|| OverseerError::NotFound(id.to_string()))?;

        if let Err(e) = self.save() {
            self.services.insert(removed.id.clone(), removed);
            return Err(e);
        }

        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Get the path to the services file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn generate_id(&self) -> ServiceId {
        loop {
            let id = ServiceId::generate();
            if !self.services.contains_key(&id) {
                return id;
            }
        }
    }

    fn load(path: &Path) -> Result<HashMap<ServiceId, ServiceRecord>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let file = File::open(path).map_err(|e| {
            OverseerError::StateLoadError(format!("Failed to open services file: {}", e))
        })?;

        let document: ServicesDocument = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| {
                OverseerError::StateLoadError(format!("Failed to parse services file: {}", e))
            })?;

        document.validate()?;

        Ok(document.services.into_iter().collect())
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                OverseerError::StateSaveError(format!("Failed to create state directory: {}", e))
            })?;
        }

        let document = ServicesDocument {
            version: STATE_VERSION.to_string(),
            services: self
                .services
                .iter()
                .map(|(id, record)| (id.clone(), record.clone()))
                .collect(),
        };

        // Unique per write: handles in one process must not share a temp file
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "services.json".to_string());
        let temp_path = self.path.with_file_name(format!(
            ".{}.{}.{}.tmp",
            file_name,
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ));

        {
            let file = File::create(&temp_path).map_err(|e| {
                OverseerError::StateSaveError(format!("Failed to create temp services file: {}", e))
            })?;

            let mut writer = BufWriter::new(file);

            serde_json::to_writer_pretty(&mut writer, &document).map_err(|e| {
                OverseerError::StateSaveError(format!("Failed to serialize services: {}", e))
            })?;

            writer.flush().map_err(|e| {
                OverseerError::StateSaveError(format!("Failed to flush services file: {}", e))
            })?;

            writer.get_ref().sync_all().map_err(|e| {
                OverseerError::StateSaveError(format!("Failed to sync services file: {}", e))
            })?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            OverseerError::StateSaveError(format!("Failed to rename temp services file: {}", e))
        })?;

        Ok(())
    }
}
