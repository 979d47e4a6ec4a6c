use common::{JobId, TaskId, WorkerId};
use thiserror::Error;

use crate::event::EventCategory;

/// Errores de las máquinas de estado de job, task y worker.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// El par (estado, evento) no está en la tabla. El estado no cambia.
    #[error("transición inválida: {entity} en estado {state} no acepta {event}")]
    Invalid {
        entity: String,
        state: String,
        event: String,
    },

    #[error("{event} para {entity} llegó sin {payload}")]
    MissingPayload {
        entity: String,
        event: String,
        payload: &'static str,
    },
}

impl TransitionError {
    pub fn invalid(
        entity: impl ToString,
        state: impl ToString,
        event: impl ToString,
    ) -> Self {
        TransitionError::Invalid {
            entity: entity.to_string(),
            state: state.to_string(),
            event: event.to_string(),
        }
    }

    pub fn missing(entity: impl ToString, event: impl ToString, payload: &'static str) -> Self {
        TransitionError::MissingPayload {
            entity: entity.to_string(),
            event: event.to_string(),
            payload,
        }
    }
}

/// Errores al rutear un evento hasta su entidad.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no hay handler registrado para eventos de {0}")]
    NoHandler(EventCategory),

    #[error("job {0} no encontrado")]
    JobNotFound(JobId),

    #[error("task {0} no encontrada")]
    TaskNotFound(TaskId),

    #[error("worker {0} no encontrado")]
    WorkerNotFound(WorkerId),

    #[error("evento de {got} entregado al dispatcher de {expected}")]
    UnexpectedCategory {
        expected: EventCategory,
        got: EventCategory,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl DispatchError {
    /// Errores de ruteo: la entidad destino no existe.
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            DispatchError::JobNotFound(_)
                | DispatchError::TaskNotFound(_)
                | DispatchError::WorkerNotFound(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry no disponible: {0}")]
    Unavailable(String),

    #[error("no hay registro para {0}")]
    UnknownRecord(String),
}

#[derive(Debug, Error)]
#[error("variable {var}={value:?} inválida: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}
