//! tenantns daemon
//!
//! Hosts the namespace registry for a single node: builds the registry from
//! configuration, runs the idle reaper, serves health and tenant status over
//! HTTP and releases every tenant on shutdown.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         tenantns                               │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────────┐   ┌───────────────┐  │
//! │  │ Idle Reaper  │──▶│ NamespaceRegistry│◀──│ Status Server │  │
//! │  └──────────────┘   └──────────────────┘   └───────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tenantns::adapters::{InMemoryConfigProvider, LoggingEventPublisher, TenantDefaults};
use tenantns::config::{parse_duration, NamespaceConfig};
use tenantns::mount::{CommandRunner, ProcessRunner, ScriptedRunner};
use tenantns::{BackendLifecycle, NamespaceRegistry};

// =============================================================================
// CLI Arguments
// =============================================================================

/// tenantns - per-tenant storage namespaces with on-demand mounting
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML, or JSON by extension)
    #[arg(long, env = "TENANTNS_CONFIG")]
    config: Option<PathBuf>,

    /// Root under which tenant namespaces are mounted
    #[arg(long, env = "TENANTNS_BASE_MOUNT_PATH")]
    base_mount_path: Option<PathBuf>,

    /// Backend kind for tenants without a record
    #[arg(long, env = "TENANTNS_DEFAULT_BACKEND")]
    default_backend: Option<String>,

    /// Maximum number of active tenants (0 = unlimited)
    #[arg(long, env = "TENANTNS_MAX_TENANTS")]
    max_tenants: Option<usize>,

    /// Release tenants idle for longer than this (e.g. 30m)
    #[arg(long, env = "TENANTNS_IDLE_TIMEOUT")]
    idle_timeout: Option<String>,

    /// How often the idle reaper runs
    #[arg(long, env = "TENANTNS_REAP_INTERVAL", default_value = "60s")]
    reap_interval: String,

    /// Log mount commands instead of running them
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Status server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// File configuration with command-line overrides applied.
    fn namespace_config(&self) -> anyhow::Result<NamespaceConfig> {
        let mut config = match &self.config {
            Some(path) => NamespaceConfig::from_path(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => NamespaceConfig::default(),
        };
        if let Some(path) = &self.base_mount_path {
            config.base_mount_path = path.clone();
        }
        if let Some(kind) = &self.default_backend {
            config.default_backend = kind.clone();
        }
        if let Some(max) = self.max_tenants {
            config.max_tenants = max;
        }
        if let Some(idle) = &self.idle_timeout {
            config.idle_timeout = idle.clone();
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = args.namespace_config()?;
    let idle_timeout = config.idle_timeout()?;
    let reap_interval = parse_duration(&args.reap_interval).context("invalid --reap-interval")?;

    info!("Starting tenantns");
    info!("  Base mount path: {}", config.base_mount_path.display());
    info!("  Default backend: {}", config.default_backend);
    info!("  Max tenants: {}", config.max_tenants);
    info!("  Idle timeout: {:?}", idle_timeout);
    info!("  Dry-run mode: {}", args.dry_run);

    let runner: Arc<dyn CommandRunner> = if args.dry_run {
        warn!("Dry-run mode: mount commands are logged, not executed");
        Arc::new(ScriptedRunner::new())
    } else {
        Arc::new(ProcessRunner::new())
    };

    let provider = Arc::new(InMemoryConfigProvider::new(TenantDefaults::from_config(&config)?));
    let lifecycle = BackendLifecycle::new(&config, runner)?;
    let registry = NamespaceRegistry::new(
        lifecycle,
        provider,
        Arc::new(LoggingEventPublisher::info_level()),
        config.max_tenants,
    );

    let shutdown = CancellationToken::new();

    let reaper_registry = registry.clone();
    let reaper_shutdown = shutdown.clone();
    let reaper = tokio::spawn(async move {
        reaper_registry
            .run_idle_reaper(reap_interval, idle_timeout, reaper_shutdown)
            .await;
    });

    let health_addr = args.health_addr.clone();
    let status_registry = registry.clone();
    let status_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = run_status_server(&health_addr, status_registry, status_shutdown).await {
            error!("Status server error: {:#}", e);
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("Shutdown requested");
    shutdown.cancel();

    if let Err(e) = reaper.await {
        warn!("Idle reaper task ended abnormally: {}", e);
    }
    if let Err(e) = registry.release_all().await {
        error!("Some tenants could not be released cleanly: {}", e);
    }

    info!("tenantns shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// Status Server
// =============================================================================

async fn run_status_server(addr: &str, registry: NamespaceRegistry, shutdown: CancellationToken) -> anyhow::Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response
    }

    let addr: SocketAddr = addr.parse().context("invalid status server address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind status server on {}", addr))?;

    info!("Status server listening on {}", addr);

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted.context("status server accept error")?,
        };
        let io = TokioIo::new(stream);
        let registry = registry.clone();
        let shutdown = shutdown.clone();

        let service = service_fn(move |req: Request<hyper::body::Incoming>| {
            let registry = registry.clone();
            let shutting_down = shutdown.is_cancelled();
            async move {
                let response = match req.uri().path() {
                    "/healthz" | "/livez" => respond(StatusCode::OK, "ok"),
                    "/readyz" if shutting_down => respond(StatusCode::SERVICE_UNAVAILABLE, "shutting down"),
                    "/readyz" => respond(StatusCode::OK, "ok"),
                    "/tenants" => match serde_json::to_vec(&registry.tenant_statuses()) {
                        Ok(body) => {
                            let mut response = respond(StatusCode::OK, body);
                            response
                                .headers_mut()
                                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                            response
                        }
                        Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                    },
                    _ => respond(StatusCode::NOT_FOUND, "not found"),
                };
                Ok::<_, std::convert::Infallible>(response)
            }
        });

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::error!("Status server connection error: {}", e);
            }
        });
    }
}
