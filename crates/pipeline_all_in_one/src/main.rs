mod config;
mod health_server;

use benefit_runner::{FailurePolicy, Runner};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use common::{DependencyCheck, HttpArchivalGateway, NatsClient, ObjectStoreDocumentStore};
use config::ServiceConfig;
use std::sync::Arc;
use std::time::Duration;
use submission_worker::{SubmissionWorker, SubmissionWorkerDeps, TextSummaryRenderer};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        received_after = %config.received_after,
        exit_on_stage_failure = config.exit_on_stage_failure,
        "starting benefit submission pipeline"
    );
    debug!("Configuration: {:?}", config);

    let (nats_client, worker, dependencies) = match initialize(&config).await {
        Ok(initialized) => initialized,
        Err(e) => {
            error!(error = %e, "failed to initialize pipeline");
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    // A failed stage stays down and shows up on /health unless configured to exit
    let stage_policy = if config.exit_on_stage_failure {
        FailurePolicy::Shutdown
    } else {
        FailurePolicy::Isolate
    };

    let health = worker.health();
    let mut runner = Runner::new();
    for (name, process) in worker.into_runner_processes() {
        runner = runner.with_process(name, stage_policy, process);
    }

    let http_config = config.health_server_config();
    runner = runner
        .with_app_process("health_server", move |ctx| {
            health_server::serve(http_config, health, dependencies, ctx)
        })
        .with_closer(move || async move {
            info!("running cleanup tasks");
            if let Err(e) = nats_client.close().await {
                error!(error = %e, "failed to close NATS connection");
            }
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_drain_timeout(Duration::from_secs(config.drain_timeout_secs))
        .with_closer_timeout(Duration::from_secs(config.closer_timeout_secs));

    runner.run().await;
}

async fn initialize(
    config: &ServiceConfig,
) -> anyhow::Result<(NatsClient, SubmissionWorker, Vec<Arc<dyn DependencyCheck>>)> {
    info!("initializing NATS");
    let nats_client = NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await?;

    let topics = config.topics();
    for topic in topics.names() {
        nats_client.ensure_stream(topic).await?;
    }

    let bucket = nats_client
        .object_bucket(&config.document_store_bucket)
        .await?;
    let document_store = Arc::new(ObjectStoreDocumentStore::new(bucket));
    let archival_gateway = Arc::new(HttpArchivalGateway::new(config.archival_gateway_config())?);
    let dependencies = vec![
        archival_gateway.clone() as Arc<dyn DependencyCheck>,
        document_store.clone() as Arc<dyn DependencyCheck>,
    ];

    let worker = SubmissionWorker::new(
        SubmissionWorkerDeps {
            consumer: nats_client.create_consumer_client(),
            publisher: nats_client.create_publisher_client(),
            document_store,
            archival_gateway,
            renderer: Arc::new(TextSummaryRenderer::new()),
        },
        config.worker_config(),
    );

    Ok((nats_client, worker, dependencies))
}
