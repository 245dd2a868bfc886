//! Lifecycle events emitted while orchestrating a project.
//!
//! The orchestrator reports every per-service step to an [`EventSink`]
//! handed to it at construction. [`TracingSink`] forwards events to
//! `tracing`; [`RecordingSink`] keeps them in memory.

use std::sync::{Mutex, PoisonError};

use flotilla_common::types::ContainerId;

/// A per-service lifecycle step that completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Stopped containers of the service were started.
    Started {
        /// Service name.
        service: String,
    },
    /// Running containers of the service were stopped.
    Stopped {
        /// Service name.
        service: String,
    },
    /// Running containers of the service were killed.
    Killed {
        /// Service name.
        service: String,
    },
    /// Containers of the service were restarted.
    Restarted {
        /// Service name.
        service: String,
    },
    /// The service image was built.
    Built {
        /// Service name.
        service: String,
        /// Image ID reported by the runtime.
        image: String,
    },
    /// The service runs a prebuilt image, so there was nothing to build.
    BuildSkipped {
        /// Service name.
        service: String,
    },
    /// The service image was pulled.
    Pulled {
        /// Service name.
        service: String,
    },
    /// There was nothing to pull for the service.
    PullSkipped {
        /// Service name.
        service: String,
        /// Whether the image is built locally; otherwise no image is declared.
        builds_locally: bool,
    },
    /// Stopped containers of the service were removed.
    RemovedStopped {
        /// Service name.
        service: String,
        /// Number of containers removed.
        count: usize,
    },
    /// The service was brought up.
    Up {
        /// Service name.
        service: String,
        /// Containers now running for the service.
        containers: Vec<ContainerId>,
    },
}

impl LifecycleEvent {
    /// Name of the service the event concerns.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::Started { service }
            | Self::Stopped { service }
            | Self::Killed { service }
            | Self::Restarted { service }
            | Self::Built { service, .. }
            | Self::BuildSkipped { service }
            | Self::Pulled { service }
            | Self::PullSkipped { service, .. }
            | Self::RemovedStopped { service, .. }
            | Self::Up { service, .. } => service,
        }
    }
}

/// Receives lifecycle events.
pub trait EventSink: Send + Sync {
    /// Handles one event.
    fn emit(&self, event: LifecycleEvent);
}

/// Sink that logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: LifecycleEvent) {
        match &event {
            LifecycleEvent::BuildSkipped { service } => {
                tracing::info!(service = %service, "{service} uses an image, skipping");
            }
            LifecycleEvent::PullSkipped {
                service,
                builds_locally: true,
            } => {
                tracing::info!(service = %service, "{service} builds its image, skipping pull");
            }
            LifecycleEvent::PullSkipped {
                service,
                builds_locally: false,
            } => {
                tracing::info!(service = %service, "{service} declares no image, skipping pull");
            }
            LifecycleEvent::Built { service, image } => {
                tracing::info!(service = %service, image = %image, "service built");
            }
            LifecycleEvent::RemovedStopped { service, count } => {
                tracing::info!(service = %service, count, "stopped containers removed");
            }
            LifecycleEvent::Up {
                service,
                containers,
            } => {
                tracing::info!(service = %service, containers = containers.len(), "service up");
            }
            other => {
                tracing::info!(service = %other.service(), event = ?other, "service lifecycle");
            }
        }
    }
}

/// Sink that stores events in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
