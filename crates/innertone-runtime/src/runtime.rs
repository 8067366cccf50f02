//! Session runtime - drives the machine from one event queue
//!
//! Bridges, channels and the user all push into the same unbounded queue;
//! a periodic tick advances the call timer and the synthesis keep-alive.

use innertone_core::{EventSink, InnertoneError, InnertoneResult};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{SessionConfig, SessionEvent, SessionMachine, SessionServices, SessionSnapshot, UserAction};

/// Owns the machine and its queue
pub struct SessionRuntime {
    machine: SessionMachine,
    queue: mpsc::UnboundedReceiver<SessionEvent>,
    config: SessionConfig,
}

/// Cloneable front end for a running [`SessionRuntime`]
#[derive(Clone)]
pub struct SessionHandle {
    queue: mpsc::UnboundedSender<SessionEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionRuntime {
    pub fn new(config: SessionConfig, services: SessionServices) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink_tx = tx.clone();
        let events = EventSink::new(move |event| {
            // Receiver gone means the runtime stopped; late events are moot.
            let _ = sink_tx.send(event);
        });
        let (machine, snapshot) = SessionMachine::new(config.clone(), services, events);

        let runtime = Self {
            machine,
            queue: rx,
            config,
        };
        let handle = SessionHandle {
            queue: tx,
            snapshot,
        };
        (runtime, handle)
    }

    /// Replace the machine's options before running
    pub fn configure(mut self, f: impl FnOnce(SessionMachine) -> SessionMachine) -> Self {
        self.machine = f(self.machine);
        self
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    /// Run until [`SessionHandle::shutdown`]
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_ms = self.config.tick_interval_ms, "session runtime started");

        loop {
            let event = tokio::select! {
                event = self.queue.recv() => match event {
                    Some(event) => event,
                    None => SessionEvent::Shutdown,
                },
                _ = interval.tick() => SessionEvent::Tick,
            };
            let shutdown = matches!(event, SessionEvent::Shutdown);

            if let Err(err) = self.machine.handle(event).await {
                warn!(%err, state = ?self.machine.state(), "rejected");
            }
            if shutdown {
                break;
            }
        }
        debug!("session runtime stopped");
    }
}

impl SessionHandle {
    /// Queue a user action
    pub fn send(&self, action: UserAction) -> InnertoneResult<()> {
        self.queue
            .send(SessionEvent::User(action))
            .map_err(|_| InnertoneError::ChannelClosed)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// End any session and stop the runtime loop
    pub fn shutdown(&self) {
        let _ = self.queue.send(SessionEvent::Shutdown);
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}
