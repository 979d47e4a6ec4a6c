use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::Utc;
use common::{ApplicationAttemptId, EngineType, Resource};

use crate::error::ConfigError;
use crate::task::TaskSpec;

/// Configuración del master, leída de variables de entorno al arrancar.
///
/// - Local: todo por defecto, corre `TASK_COMMAND` con `sh -c`.
/// - Docker: `TASK_ENGINE=docker` y `TASK_IMAGE=<imagen>`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub attempt: ApplicationAttemptId,
    pub job_name: String,
    pub instances: usize,
    pub base_port: u16,
    pub task: TaskSpec,
}

fn parse<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|e| ConfigError {
            var,
            value: value.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_bool(var: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "") => Ok(false),
        Some(v) => Err(ConfigError {
            var,
            value: v,
            reason: "se esperaba true/false".to_string(),
        }),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Igual que `from_env` pero con otra fuente de variables (tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = parse("MASTER_BIND", lookup("MASTER_BIND"), SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        let attempt = match lookup("APP_ATTEMPT_ID") {
            Some(raw) => parse("APP_ATTEMPT_ID", Some(raw), ApplicationAttemptId::new(0, 1, 1))?,
            None => ApplicationAttemptId::new(Utc::now().timestamp_millis() as u64, 1, 1),
        };

        let cpus: f64 = parse("TASK_CPUS", lookup("TASK_CPUS"), 1.0)?;
        if cpus <= 0.0 {
            return Err(ConfigError {
                var: "TASK_CPUS",
                value: cpus.to_string(),
                reason: "tiene que ser mayor que cero".to_string(),
            });
        }

        let task = TaskSpec {
            resource: Resource::new(cpus, parse("TASK_MEMORY_MB", lookup("TASK_MEMORY_MB"), 128)?),
            priority: parse("TASK_PRIORITY", lookup("TASK_PRIORITY"), 0)?,
            command: lookup("TASK_COMMAND").unwrap_or_else(|| "cat /proc/1/cgroup".to_string()),
            image: lookup("TASK_IMAGE").unwrap_or_else(|| "centos_yarn".to_string()),
            engine: parse("TASK_ENGINE", lookup("TASK_ENGINE"), EngineType::Process)?,
            use_local_image: parse_bool("USE_LOCAL_IMAGE", lookup("USE_LOCAL_IMAGE"))?,
        };

        Ok(Self {
            bind,
            attempt,
            job_name: lookup("JOB_NAME").unwrap_or_else(|| "simple-job".to_string()),
            instances: parse("TASK_INSTANCES", lookup("TASK_INSTANCES"), 1)?,
            base_port: parse("CONTAINER_BASE_PORT", lookup("CONTAINER_BASE_PORT"), 9000)?,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn valores_por_defecto() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind.port(), 8080);
        assert_eq!(cfg.instances, 1);
        assert_eq!(cfg.base_port, 9000);
        assert_eq!(cfg.task.engine, EngineType::Process);
        assert!(!cfg.task.use_local_image);
        assert_eq!(cfg.task.resource, Resource::new(1.0, 128));
        assert!(cfg.attempt.cluster_timestamp > 0);
    }

    #[test]
    fn lee_todas_las_variables() {
        let cfg = config(&[
            ("MASTER_BIND", "127.0.0.1:9999"),
            ("APP_ATTEMPT_ID", "appattempt_1465186316357_0001_000001"),
            ("JOB_NAME", "simple-docker"),
            ("TASK_COMMAND", "echo hola"),
            ("TASK_IMAGE", "alpine"),
            ("TASK_ENGINE", "docker"),
            ("TASK_CPUS", "2"),
            ("TASK_MEMORY_MB", "512"),
            ("TASK_INSTANCES", "3"),
            ("TASK_PRIORITY", "5"),
            ("USE_LOCAL_IMAGE", "true"),
            ("CONTAINER_BASE_PORT", "20000"),
        ])
        .unwrap();

        assert_eq!(cfg.bind.to_string(), "127.0.0.1:9999");
        assert_eq!(cfg.attempt, ApplicationAttemptId::new(1465186316357, 1, 1));
        assert_eq!(cfg.job_name, "simple-docker");
        assert_eq!(cfg.instances, 3);
        assert_eq!(cfg.base_port, 20000);
        assert_eq!(cfg.task.command, "echo hola");
        assert_eq!(cfg.task.image, "alpine");
        assert_eq!(cfg.task.engine, EngineType::Docker);
        assert_eq!(cfg.task.resource, Resource::new(2.0, 512));
        assert_eq!(cfg.task.priority, 5);
        assert!(cfg.task.use_local_image);
    }

    #[test]
    fn valores_invalidos_dan_config_error() {
        let err = config(&[("TASK_INSTANCES", "muchas")]).unwrap_err();
        assert_eq!(err.var, "TASK_INSTANCES");
        assert_eq!(err.value, "muchas");

        let err = config(&[("TASK_ENGINE", "lxc")]).unwrap_err();
        assert_eq!(err.var, "TASK_ENGINE");

        let err = config(&[("USE_LOCAL_IMAGE", "quizas")]).unwrap_err();
        assert_eq!(err.var, "USE_LOCAL_IMAGE");

        let err = config(&[("TASK_CPUS", "0")]).unwrap_err();
        assert_eq!(err.var, "TASK_CPUS");
    }
}
