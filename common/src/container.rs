use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::job::ApplicationAttemptId;

/// Perfil de recursos que pide una tarea.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub cpus: f64,
    pub memory_mb: u64,
}

impl Resource {
    pub fn new(cpus: f64, memory_mb: u64) -> Self {
        Self { cpus, memory_mb }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<cpus={}, mem={}MB>", self.cpus, self.memory_mb)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// container_<cluster_ts>_<app:04>_<attempt:02>_<seq:06>
    pub fn new(attempt: &ApplicationAttemptId, seq: u64) -> Self {
        Self(format!(
            "container_{}_{:04}_{:02}_{:06}",
            attempt.cluster_timestamp, attempt.app_id, attempt.attempt, seq
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contenedor concedido por el resource manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub node_host: String,
    pub node_port: u16,
    pub resource: Resource,
}

/// Entrada del service registry para descubrir un contenedor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub key: String,
    pub host: String,
    pub port: u16,
}

/// Cómo se ejecuta el comando de la tarea dentro del contenedor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Docker,
    Process,
}

impl FromStr for EngineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(EngineType::Docker),
            "process" | "default" => Ok(EngineType::Process),
            other => Err(format!("engine desconocido: {other}")),
        }
    }
}
