//! Readiness and liveness of the managed streams.
//!
//! Each stage owns one [`StreamHealth`]; the HTTP surface reads them through a
//! [`HealthRegistry`] and reports the logical AND.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamState {
    Starting,
    Running,
    Error,
    Stopped,
}

#[derive(Debug)]
struct Transition {
    state: StreamState,
    since: Instant,
}

/// Health state of one managed stream.
///
/// `ready` is true only while running. `healthy` stays true for
/// `unready_after_stopped` after the stream errors or stops, so a short
/// broker blip does not flap dependent probes.
#[derive(Debug)]
pub struct StreamHealth {
    name: String,
    unready_after_stopped: Duration,
    transition: Mutex<Transition>,
}

impl StreamHealth {
    pub fn new(name: impl Into<String>, unready_after_stopped: Duration) -> Self {
        Self {
            name: name.into(),
            unready_after_stopped,
            transition: Mutex::new(Transition {
                state: StreamState::Starting,
                since: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StreamState {
        self.lock().state
    }

    pub fn ready(&self) -> bool {
        self.state() == StreamState::Running
    }

    pub fn healthy(&self) -> bool {
        let transition = self.lock();
        match transition.state {
            StreamState::Starting | StreamState::Running => true,
            StreamState::Error | StreamState::Stopped => {
                transition.since.elapsed() < self.unready_after_stopped
            }
        }
    }

    pub fn mark_starting(&self) {
        self.set(StreamState::Starting);
    }

    pub fn mark_running(&self) {
        self.set(StreamState::Running);
    }

    pub fn mark_failed(&self) {
        self.set(StreamState::Error);
    }

    pub fn mark_stopped(&self) {
        self.set(StreamState::Stopped);
    }

    pub fn snapshot(&self) -> StreamHealthSnapshot {
        StreamHealthSnapshot {
            name: self.name.clone(),
            state: self.state(),
            ready: self.ready(),
            healthy: self.healthy(),
        }
    }

    fn set(&self, state: StreamState) {
        let mut transition = self.lock();
        if transition.state == state {
            return;
        }
        let previous = transition.state;
        transition.state = state;
        transition.since = Instant::now();
        drop(transition);

        match state {
            StreamState::Error => warn!(
                stream = %self.name,
                from = ?previous,
                unready_after_secs = self.unready_after_stopped.as_secs(),
                "stream entered error state"
            ),
            _ => info!(stream = %self.name, from = ?previous, to = ?state, "stream state changed"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Transition> {
        // The guarded value is plain data, a panicking writer cannot corrupt it.
        self.transition
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamHealthSnapshot {
    pub name: String,
    pub state: StreamState,
    pub ready: bool,
    pub healthy: bool,
}

/// Aggregates the health of every managed stream in the process.
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    streams: Vec<Arc<StreamHealth>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, health: Arc<StreamHealth>) {
        self.streams.push(health);
    }

    pub fn is_ready(&self) -> bool {
        self.streams.iter().all(|s| s.ready())
    }

    pub fn is_healthy(&self) -> bool {
        self.streams.iter().all(|s| s.healthy())
    }

    pub fn snapshot(&self) -> Vec<StreamHealthSnapshot> {
        self.streams.iter().map(|s| s.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// An external system the stages depend on, checked on demand by `/health`.
///
/// Dependency results are informational: a failing dependency is reported but
/// never turns the process unhealthy, since restarting it would not help.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DependencyCheck: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyState {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    pub name: String,
    pub status: DependencyState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run every check concurrently, each bounded by `timeout`.
pub async fn check_dependencies(
    checks: &[Arc<dyn DependencyCheck>],
    timeout: Duration,
) -> Vec<DependencyStatus> {
    let pending = checks.iter().map(|check| async move {
        let outcome = match tokio::time::timeout(timeout, check.check()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(_) => Err(format!("no answer within {}ms", timeout.as_millis())),
        };

        match outcome {
            Ok(()) => {
                debug!(dependency = check.name(), "dependency check passed");
                DependencyStatus {
                    name: check.name().to_string(),
                    status: DependencyState::Up,
                    error: None,
                }
            }
            Err(error) => {
                warn!(dependency = check.name(), error = %error, "dependency check failed");
                DependencyStatus {
                    name: check.name().to_string(),
                    status: DependencyState::Down,
                    error: Some(error),
                }
            }
        }
    });

    futures::future::join_all(pending).await
}
