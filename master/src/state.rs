// master/src/state.rs

use common::JobReport;
use std::sync::Arc;
use tokio::sync::watch;

use crate::event::EventSender;
use crate::registry::InMemoryRegistry;

/// Estado compartido de los handlers HTTP. No toca las entidades: lee el
/// último reporte publicado y encola eventos para el dispatcher.
#[derive(Clone)]
pub struct AppState {
    pub reports: watch::Receiver<JobReport>,
    pub events: EventSender,
    pub registry: Arc<InMemoryRegistry>,
}

impl AppState {
    pub fn new(
        reports: watch::Receiver<JobReport>,
        events: EventSender,
        registry: Arc<InMemoryRegistry>,
    ) -> Self {
        Self {
            reports,
            events,
            registry,
        }
    }

    /// Copia del último reporte, sin retener el lock del canal.
    pub fn report(&self) -> JobReport {
        self.reports.borrow().clone()
    }
}
