//! Router de eventos asíncrono.
//!
//! Una sola cola MPSC y un solo consumidor: los productores (colaboradores,
//! handlers HTTP, las propias entidades) encolan con `EventSender::submit`
//! y el consumidor entrega cada evento, en orden FIFO, al handler
//! registrado para su categoría. Todas las transiciones de estado corren en
//! ese consumidor, así que las entidades no necesitan locks.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{DispatchError, TransitionError};
use crate::event::{Event, EventCategory, EventSender};

/// Capacidad común de todo lo que recibe eventos desde el router.
pub trait EventHandler<C>: Send {
    fn handle(&mut self, ctx: &mut C, event: Event) -> Result<(), DispatchError>;
}

/// Lo que implementan job, task y worker: consumir su propio tipo de evento
/// y avanzar su máquina de estados.
pub trait Handle<E> {
    fn handle(&mut self, event: E) -> Result<(), TransitionError>;
}

/// Contexto compartido que el router pasa a cada handler.
pub trait Context {
    /// Se llama después de cada evento, haya fallado o no.
    fn event_processed(&mut self) {}
}

pub struct AsyncDispatcher<C> {
    handlers: HashMap<EventCategory, Box<dyn EventHandler<C>>>,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    processed: u64,
}

impl<C: Context> AsyncDispatcher<C> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handlers: HashMap::new(),
            tx,
            rx,
            processed: 0,
        }
    }

    /// Un handler por categoría; registrar otra vez reemplaza el anterior.
    pub fn register(&mut self, category: EventCategory, handler: Box<dyn EventHandler<C>>) {
        if self.handlers.insert(category, handler).is_some() {
            warn!("reemplazando handler de eventos de {}", category);
        }
    }

    pub fn sender(&self) -> EventSender {
        EventSender::new(self.tx.clone())
    }

    /// Eventos procesados desde que arrancó el router.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Entrega un evento al handler de su categoría, en el hilo actual.
    pub fn dispatch(&mut self, ctx: &mut C, event: Event) -> Result<(), DispatchError> {
        let category = event.category();
        let handler = self
            .handlers
            .get_mut(&category)
            .ok_or(DispatchError::NoHandler(category))?;
        handler.handle(ctx, event)
    }

    fn process(&mut self, ctx: &mut C, event: Event) {
        debug!("procesando {}", event);
        let label = event.to_string();

        if let Err(e) = self.dispatch(ctx, event) {
            if e.is_routing() {
                warn!("error de ruteo, descartando {}: {}", label, e);
            } else {
                warn!("evento descartado {}: {}", label, e);
            }
        }

        self.processed += 1;
        ctx.event_processed();
    }

    /// Procesa todo lo que haya en la cola, incluidos los eventos que se
    /// encolen mientras tanto. Devuelve cuántos procesó.
    pub fn drain(&mut self, ctx: &mut C) -> usize {
        let mut count = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.process(ctx, event);
            count += 1;
        }
        count
    }

    /// Loop consumidor. Termina cuando `shutdown` se resuelve y devuelve el
    /// contexto con el estado final.
    pub async fn run<F>(mut self, mut ctx: C, shutdown: F) -> C
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("dispatcher de eventos iniciado");

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                event = self.rx.recv() => event,
            };

            match next {
                Some(event) => self.process(&mut ctx, event),
                None => break,
            }
        }

        info!(
            "dispatcher de eventos detenido ({} eventos procesados)",
            self.processed
        );
        ctx
    }
}

impl<C: Context> Default for AsyncDispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}
