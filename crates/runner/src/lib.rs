//! Runs the long-lived processes of a service side by side and shuts them down together.
//!
//! Every process is named and carries a [`FailurePolicy`]:
//! - [`FailurePolicy::Shutdown`]: an error cancels every other process
//! - [`FailurePolicy::Isolate`]: an error is logged and the process stays dead
//!   while the rest keep running, so health probes can observe the failure
//!
//! On SIGINT/SIGTERM all processes are cancelled and given a drain window to
//! finish in-flight work before being aborted. Closers run afterwards.
//!
//! # Example
//!
//! ```no_run
//! use benefit_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_app_process("ticker", |ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_drain_timeout(Duration::from_secs(30))
//!         .run()
//!         .await;
//! }
//! ```

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send>;

/// What the runner does when a process returns an error or panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Cancel everything and exit with a failure code
    Shutdown,
    /// Keep the other processes running
    Isolate,
}

struct NamedProcess {
    name: String,
    policy: FailurePolicy,
    process: AppProcess,
}

/// Outcome of [`Runner::run_until_complete`].
#[derive(Debug, Default)]
pub struct RunReport {
    /// Names of the processes that returned an error or panicked
    pub failed: Vec<String>,
    /// Names of the processes aborted because they outlived the drain timeout
    pub aborted: Vec<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

pub struct Runner {
    processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    drain_timeout: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Drain and closer timeouts default to 30 and 10 seconds.
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    /// Add a process whose failure shuts the whole runner down.
    pub fn with_app_process<F, Fut>(self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_process(name, FailurePolicy::Shutdown, process)
    }

    pub fn with_process<F, Fut>(
        mut self,
        name: impl Into<String>,
        policy: FailurePolicy,
        process: F,
    ) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.processes.push(NamedProcess {
            name: name.into(),
            policy,
            process: Box::new(|token| Box::pin(process(token))),
        });
        self
    }

    /// Closers run once every process has stopped, whatever the outcome.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// How long cancelled processes may keep running to finish in-flight work.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Disable SIGINT/SIGTERM handling, shutdown then only follows the token.
    pub fn without_signal_handling(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Run everything, then exit the process with the resulting code.
    pub async fn run(self) {
        let report = self.run_until_complete().await;
        if report.is_success() {
            info!("application exiting normally");
        } else {
            error!(failed = ?report.failed, "application exiting with error");
        }
        std::process::exit(report.exit_code());
    }

    /// Run all processes until they finish or shutdown is requested, drain
    /// them, run the closers and report what failed.
    pub async fn run_until_complete(self) -> RunReport {
        let token = self.cancellation_token;
        let mut report = RunReport::default();

        let signal_tasks = if self.handle_signals {
            spawn_signal_handlers(&token)
        } else {
            Vec::new()
        };

        let mut join_set = JoinSet::new();
        let mut running: Vec<String> = Vec::new();
        for NamedProcess {
            name,
            policy,
            process,
        } in self.processes
        {
            debug!(process = %name, ?policy, "starting process");
            running.push(name.clone());
            let process_token = token.clone();
            join_set.spawn(async move {
                let outcome = AssertUnwindSafe(process(process_token)).catch_unwind().await;
                let result = outcome.unwrap_or_else(|_| Err(anyhow::anyhow!("process panicked")));
                (name, policy, result)
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                joined = join_set.join_next() => {
                    let Some(joined) = joined else { break };
                    if let Some((name, policy)) = record(joined, &mut report, &mut running) {
                        match policy {
                            FailurePolicy::Shutdown => {
                                error!(process = %name, "process failed, shutting down");
                                token.cancel();
                            }
                            FailurePolicy::Isolate => {
                                warn!(process = %name, "process failed, the others keep running");
                            }
                        }
                    }
                }
            }
        }

        if !join_set.is_empty() {
            info!(
                timeout_ms = self.drain_timeout.as_millis(),
                "draining processes"
            );
            let drained = tokio::time::timeout(self.drain_timeout, async {
                while let Some(joined) = join_set.join_next().await {
                    record(joined, &mut report, &mut running);
                }
            })
            .await;

            if drained.is_err() {
                warn!(processes = ?running, "drain timeout elapsed, aborting processes");
                join_set.shutdown().await;
                report.aborted = running;
            }
        }

        for task in signal_tasks {
            task.abort();
        }

        if !self.closers.is_empty() {
            info!(timeout_ms = self.closer_timeout.as_millis(), "running closers");
            if tokio::time::timeout(self.closer_timeout, run_closers(self.closers))
                .await
                .is_err()
            {
                error!(
                    timeout_ms = self.closer_timeout.as_millis(),
                    "closers timed out"
                );
            }
        }

        report
    }
}

/// Book a finished process, returning its name and policy if it failed.
fn record(
    joined: Result<(String, FailurePolicy, anyhow::Result<()>), tokio::task::JoinError>,
    report: &mut RunReport,
    running: &mut Vec<String>,
) -> Option<(String, FailurePolicy)> {
    let (name, policy, result) = match joined {
        Ok(finished) => finished,
        // Panics are caught inside the task, so this is an abort
        Err(e) => {
            warn!(error = %e, "process task did not complete");
            return None;
        }
    };
    running.retain(|n| n != &name);

    match result {
        Ok(()) => {
            info!(process = %name, "process completed");
            None
        }
        Err(e) => {
            error!(process = %name, error = format!("{e:#}"), "process failed");
            report.failed.push(name.clone());
            Some((name, policy))
        }
    }
}

fn spawn_signal_handlers(token: &CancellationToken) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    let ctrl_c_token = token.clone();
    tasks.push(tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received SIGINT");
                ctrl_c_token.cancel();
            }
            Err(e) => error!(error = %e, "failed to listen for SIGINT"),
        }
    }));

    #[cfg(unix)]
    {
        let sigterm_token = token.clone();
        tasks.push(tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("received SIGTERM");
                    sigterm_token.cancel();
                }
                Err(e) => error!(error = %e, "failed to listen for SIGTERM"),
            }
        }));
    }

    tasks
}

/// Run all closers concurrently; a failing closer does not stop the others.
async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("closer completed"),
            Ok(Err(e)) => error!(error = format!("{e:#}"), "closer failed"),
            Err(e) => error!(error = %e, "closer panicked"),
        }
    }
}
