use anyhow::Result;
use clap::Parser;
use mockhive::config::Config;
use mockhive::engine::dispatcher::RoutingDispatcher;
use mockhive::host::HostManager;
use mockhive::provider::InMemoryProvider;
use mockhive::sink::{LogSink, TracingLogSink};
use mockhive::webhook::DispatchQueue;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mockhive", version, about = "Multi-tenant mock-API engine")]
struct Args {
    /// Shared listener port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,
    /// YAML config file with projects to serve
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let shared_port = args.port.unwrap_or(config.listen.port);

    let (queue, worker) = DispatchQueue::new();
    tokio::spawn(worker.run());

    let sink: Arc<dyn LogSink> = Arc::new(TracingLogSink);
    let provider = Arc::new(InMemoryProvider::new(config.projects.clone()));
    let manager = Arc::new(HostManager::new(queue.clone(), Arc::clone(&sink)));

    for project in config.projects.iter().filter(|p| p.port != 0) {
        match manager.start(project.clone()).await {
            Ok(instance) => info!(
                project = %instance.project().slug,
                port = instance.port,
                "dedicated host up"
            ),
            Err(e) => error!(project = %project.slug, "failed to start dedicated host: {e}"),
        }
    }

    let dispatcher = Arc::new(RoutingDispatcher::new(provider, queue, sink));
    let listener = TcpListener::bind(("0.0.0.0", shared_port)).await?;

    tokio::select! {
        result = Arc::clone(&dispatcher).run(listener) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            manager.stop_all().await;
        }
    }
    Ok(())
}
