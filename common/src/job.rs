use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

use crate::task::{TaskId, TaskReport};

/// Error al parsear un id textual (job_..., task_..., worker_...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("id inválido {input:?}: {reason}")]
pub struct IdParseError {
    pub input: String,
    pub reason: String,
}

impl IdParseError {
    pub(crate) fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Separa "<prefix>_a_b_c" en sus componentes numéricos.
pub(crate) fn parse_parts(
    prefix: &str,
    input: &str,
    expected: usize,
) -> Result<Vec<u64>, IdParseError> {
    let rest = input
        .strip_prefix(prefix)
        .and_then(|r| r.strip_prefix('_'))
        .ok_or_else(|| IdParseError::new(input, format!("se esperaba el prefijo '{prefix}_'")))?;

    let parts: Vec<&str> = rest.split('_').collect();
    if parts.len() != expected {
        return Err(IdParseError::new(
            input,
            format!("se esperaban {} componentes, hay {}", expected, parts.len()),
        ));
    }

    parts
        .iter()
        .map(|p| {
            p.parse::<u64>()
                .map_err(|_| IdParseError::new(input, format!("componente no numérico '{p}'")))
        })
        .collect()
}

pub(crate) fn to_u32(input: &str, value: u64) -> Result<u32, IdParseError> {
    u32::try_from(value).map_err(|_| IdParseError::new(input, format!("{value} no cabe en u32")))
}

/// Intento de aplicación asignado por el resource manager.
/// Formato: appattempt_<cluster_ts>_<app:04>_<attempt:06>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApplicationAttemptId {
    pub cluster_timestamp: u64,
    pub app_id: u32,
    pub attempt: u32,
}

impl ApplicationAttemptId {
    pub fn new(cluster_timestamp: u64, app_id: u32, attempt: u32) -> Self {
        Self {
            cluster_timestamp,
            app_id,
            attempt,
        }
    }
}

impl fmt::Display for ApplicationAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "appattempt_{}_{:04}_{:06}",
            self.cluster_timestamp, self.app_id, self.attempt
        )
    }
}

impl FromStr for ApplicationAttemptId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let p = parse_parts("appattempt", s, 3)?;
        Ok(Self::new(p[0], to_u32(s, p[1])?, to_u32(s, p[2])?))
    }
}

/// El job se identifica por el intento de aplicación que lo ejecuta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(ApplicationAttemptId);

impl JobId {
    pub fn new(attempt: ApplicationAttemptId) -> Self {
        Self(attempt)
    }

    pub fn attempt(&self) -> &ApplicationAttemptId {
        &self.0
    }

    /// Sufijo común que heredan task y worker ids.
    pub(crate) fn suffix(&self) -> String {
        format!(
            "{}_{:04}_{:06}",
            self.0.cluster_timestamp, self.0.app_id, self.0.attempt
        )
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job_{}", self.suffix())
    }
}

impl FromStr for JobId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let p = parse_parts("job", s, 3)?;
        Ok(Self(ApplicationAttemptId::new(
            p[0],
            to_u32(s, p[1])?,
            to_u32(s, p[2])?,
        )))
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for JobId {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
    Killed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Killed => "KILLED",
        };
        f.write_str(s)
    }
}

/// Foto del job que publica el master después de cada evento.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,

    /// -------- Métricas del job --------
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    pub killed_tasks: u32,

    pub tasks: Vec<TaskReport>,
}

impl JobReport {
    pub fn task(&self, id: &TaskId) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Tareas en estado terminal, sea cual sea el resultado.
    pub fn finished_tasks(&self) -> u32 {
        self.completed_tasks + self.failed_tasks + self.killed_tasks
    }
}

/// Respuesta de los endpoints que sólo encolan un evento.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub ok: bool,
    pub event: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_id_se_formatea_como_yarn() {
        let attempt = ApplicationAttemptId::new(1465186316357, 1, 1);
        assert_eq!(attempt.to_string(), "appattempt_1465186316357_0001_000001");
        assert_eq!(
            "appattempt_1465186316357_0001_000001".parse::<ApplicationAttemptId>(),
            Ok(attempt)
        );
    }

    #[test]
    fn job_id_parse_and_display() {
        let id = JobId::new(ApplicationAttemptId::new(1465186316357, 1, 1));
        let text = id.to_string();
        assert_eq!(text, "job_1465186316357_0001_000001");
        assert_eq!(text.parse::<JobId>().unwrap(), id);
    }

    #[test]
    fn job_id_rechaza_prefijo_y_componentes_invalidos() {
        assert!("task_1_0001_000001".parse::<JobId>().is_err());
        assert!("job_1_0001".parse::<JobId>().is_err());
        assert!("job_1_x_000001".parse::<JobId>().is_err());
        assert!("job_1_99999999999_000001".parse::<JobId>().is_err());
    }

    #[test]
    fn job_id_se_serializa_como_string() {
        let id = JobId::new(ApplicationAttemptId::new(7, 2, 3));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"job_7_0002_000003\"");
        let back: JobId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<JobId>("\"nope\"").is_err());
    }

    #[test]
    fn job_status_terminal() {
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Killed.is_terminal());
    }
}
