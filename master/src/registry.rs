use std::collections::BTreeMap;
use std::sync::Mutex;

use common::ContainerRecord;
use tracing::debug;

use crate::error::RegistryError;

/// Service registry donde se publican los endpoints de cada contenedor.
/// Las tareas lo llaman de forma síncrona; si falla sólo se loguea.
pub trait Registry: Send + Sync {
    fn set_container_record(&self, key: &str, host: &str, port: u16) -> Result<(), RegistryError>;

    fn deregister_container(&self, key: &str) -> Result<(), RegistryError>;
}

/// Registry en memoria, expuesto por HTTP en /api/v1/registry.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    records: Mutex<BTreeMap<String, ContainerRecord>>,
}

impl InMemoryRegistry {
    pub fn records(&self) -> Result<Vec<ContainerRecord>, RegistryError> {
        let records = self
            .records
            .lock()
            .map_err(|_| RegistryError::Unavailable("lock records".to_string()))?;
        Ok(records.values().cloned().collect())
    }
}

impl Registry for InMemoryRegistry {
    fn set_container_record(&self, key: &str, host: &str, port: u16) -> Result<(), RegistryError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| RegistryError::Unavailable("lock records".to_string()))?;

        debug!("registry: {} -> {}:{}", key, host, port);
        records.insert(
            key.to_string(),
            ContainerRecord {
                key: key.to_string(),
                host: host.to_string(),
                port,
            },
        );
        Ok(())
    }

    fn deregister_container(&self, key: &str) -> Result<(), RegistryError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| RegistryError::Unavailable("lock records".to_string()))?;

        match records.remove(key) {
            Some(_) => {
                debug!("registry: {} dado de baja", key);
                Ok(())
            }
            None => Err(RegistryError::UnknownRecord(key.to_string())),
        }
    }
}
