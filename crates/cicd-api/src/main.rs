//! IoT CI/CD build server.

use anyhow::Context;
use cicd_api::{AppState, BuildPipeline, Metrics, ServiceHost, routes};
use cicd_config::{ServiceConfig, TlsKeyPair, split_args};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cicd-server")]
#[command(about = "Webhook-triggered firmware build server", long_about = None)]
struct Cli {
    /// KDL configuration file; flags override its values
    #[arg(long, env = "CICD_CONFIG")]
    config: Option<PathBuf>,

    /// Address (interface) to listen on [default: 127.0.0.1]
    #[arg(long, env = "CICD_ADDRESS")]
    address: Option<String>,

    /// Port to listen on for requests [default: 8080]
    #[arg(long, env = "CICD_PORT")]
    port: Option<u16>,

    /// Relative path to the build script [default: Device/build.sh]
    #[arg(long, env = "CICD_SCRIPT")]
    script: Option<PathBuf>,

    /// Comma-separated list of arguments given to the build script
    #[arg(long = "args", env = "CICD_ARGS")]
    build_args: Option<String>,

    /// Comma-separated list of arguments given to the build script when building on master
    #[arg(long, env = "CICD_MASTER_ARGS")]
    master_args: Option<String>,

    /// Git URL to clone for the build process
    #[arg(long, env = "CICD_REPO_URL")]
    repo_url: Option<String>,

    /// TLS certificate file (PEM)
    #[arg(long, env = "CICD_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// TLS private key file (PEM)
    #[arg(long, env = "CICD_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Well-known path the current checkout is published at [default: /tmp/iot-cicd]
    #[arg(long, env = "CICD_PUBLISH_PATH")]
    publish_path: Option<PathBuf>,

    /// Mount point of the build endpoint [default: /build/]
    #[arg(long, env = "CICD_BUILD_PATH")]
    build_path: Option<String>,

    /// Mount point of the metrics endpoint [default: /metrics]
    #[arg(long, env = "CICD_METRICS_PATH", conflicts_with = "no_metrics")]
    metrics_path: Option<String>,

    /// Disable the metrics endpoint
    #[arg(long)]
    no_metrics: bool,

    /// Directory temporary checkouts are created in
    #[arg(long, env = "CICD_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, env = "CICD_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    /// Layer flags over the config file (if any) over the defaults.
    fn into_config(self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ServiceConfig::default(),
        };

        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(script) = self.script {
            config.build_script = script;
        }
        if let Some(args) = self.build_args {
            config.build_args = split_args(&args);
        }
        if let Some(args) = self.master_args {
            config.master_args = split_args(&args);
        }
        if let Some(url) = self.repo_url {
            config.repository_url = url;
        }
        if let (Some(cert_file), Some(key_file)) = (self.tls_cert, self.tls_key) {
            config.tls = Some(TlsKeyPair {
                cert_file,
                key_file,
            });
        }
        if let Some(path) = self.publish_path {
            config.publish_path = path;
        }
        if let Some(path) = self.build_path {
            config.build_endpoint = path;
        }
        if let Some(path) = self.metrics_path {
            config.metrics_endpoint = Some(path);
        }
        if self.no_metrics {
            config.metrics_endpoint = None;
        }
        if let Some(dir) = self.scratch_dir {
            config.scratch_dir = Some(dir);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.into_config()?;
    let addr = config.socket_addr()?;

    // Create app state
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    let state = AppState::new(BuildPipeline::from_config(&config), metrics);

    info!(
        script = %config.build_script.display(),
        args = ?config.build_args,
        master_args = ?config.master_args,
        endpoint = %config.build_endpoint,
        "Registering build command"
    );
    let app = routes::router(
        state,
        &config.build_endpoint,
        config.metrics_endpoint.as_deref(),
    )
    .layer(TraceLayer::new_for_http());

    let mut host = ServiceHost::new(addr).register_endpoints(app);
    if let Some(tls) = config.tls.clone() {
        host = host.enable_tls(tls);
    }

    info!(addr = %addr, tls = config.tls.is_some(), "Starting to serve");
    host.start().await.context("Starting Server failed")?;

    info!("Server shut down");
    Ok(())
}
