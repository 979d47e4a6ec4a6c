use common::{JobId, JobReport};
use tokio::sync::watch;

use crate::dispatcher::Context;
use crate::error::DispatchError;
use crate::event::EventSender;
use crate::job::Job;

/// Contexto de la aplicación: dueño de la jerarquía Job -> Task -> Worker.
/// Sólo lo toca el consumidor del dispatcher; el resto del proceso ve el
/// estado a través del canal `watch` con el último `JobReport`.
pub struct AppContext {
    job: Job,
    events: EventSender,
    reports: watch::Sender<JobReport>,
}

impl AppContext {
    pub fn new(job: Job, events: EventSender) -> (Self, watch::Receiver<JobReport>) {
        let (reports, rx) = watch::channel(job.report());
        (
            Self {
                job,
                events,
                reports,
            },
            rx,
        )
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn job_mut(&mut self) -> &mut Job {
        &mut self.job
    }

    pub fn event_sender(&self) -> &EventSender {
        &self.events
    }

    pub fn subscribe(&self) -> watch::Receiver<JobReport> {
        self.reports.subscribe()
    }

    /// Resuelve el job de un evento. Hay un único job por master.
    pub fn job_for(&mut self, id: &JobId) -> Result<&mut Job, DispatchError> {
        if self.job.id() == id {
            Ok(&mut self.job)
        } else {
            Err(DispatchError::JobNotFound(*id))
        }
    }
}

impl Context for AppContext {
    fn event_processed(&mut self) {
        self.reports.send_replace(self.job.report());
    }
}
