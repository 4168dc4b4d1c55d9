//! USB camera device service.

use clap::Parser;
use futures::FutureExt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use usbcam::config::{CliOverrides, Config};
use usbcam::discovery::DiscoveryService;
use usbcam::manager::{DeviceManager, ManagerParts};
use usbcam::registry::JsonFileRegistry;
use usbcam::rtsp_auth::{self, RtspAuth};
use usbcam::secrets::FileSecretStore;
use usbcam::state::AppState;
use usbcam::transcoder::TranscoderSettings;
use usbcam::usb::{CaptureBackend, UdevProbe, V4lBackend};
use usbcam::{create_app, events::EventBroadcaster};

/// USB camera device service with supervised RTSP transcoding
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port of the device API
    #[arg(short, long, env = "USBCAM_PORT")]
    port: Option<u16>,

    /// Directory holding the registry and secrets files
    #[arg(long, env = "USBCAM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Device registry file, overrides --data-dir
    #[arg(long, env = "USBCAM_REGISTRY_PATH")]
    registry_path: Option<PathBuf>,

    /// Secrets file, overrides --data-dir
    #[arg(long, env = "USBCAM_SECRETS_PATH")]
    secrets_path: Option<PathBuf>,

    /// Transcoder program
    #[arg(long)]
    transcoder: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "USBCAM_LOG_LEVEL")]
    log_level: Option<String>,
}

impl From<Args> for CliOverrides {
    fn from(args: Args) -> Self {
        Self {
            port: args.port,
            data_dir: args.data_dir,
            registry_path: args.registry_path,
            secrets_path: args.secrets_path,
            transcoder: args.transcoder,
            log_level: args.log_level,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_figment(args.into())?;
    let _log_guard = init_logging(&config)?;

    info!("Starting USB camera device service...");
    run(config)
}

/// Console logging plus an optional log file.
///
/// `RUST_LOG` wins over the configured level, which defaults to `info`.
fn init_logging(config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_level.as_deref().unwrap_or("info"))
    });
    let timer = UtcTime::new(time::format_description::well_known::Rfc3339);

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("invalid log file {}", path.display()))?;
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(timer.clone());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_timer(timer).compact())
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn run(config: Config) -> anyhow::Result<()> {
    let registry = Arc::new(JsonFileRegistry::new(&config.registry_path));
    let secrets = Arc::new(FileSecretStore::open(&config.secrets_path)?);
    let capture: Arc<dyn CaptureBackend> = Arc::new(V4lBackend);
    let events = EventBroadcaster::default();

    let manager = DeviceManager::new(ManagerParts {
        registry,
        secrets: secrets.clone(),
        probe: Arc::new(UdevProbe::new(capture.clone())),
        capture,
        events,
        rtsp: config.rtsp.clone(),
        transcoder: TranscoderSettings::new(&config.transcoder, &config.rtsp),
    });
    info!("Device manager created");

    {
        let manager = manager.clone();
        secrets.on_update(Arc::new(move || {
            let manager = manager.clone();
            async move { manager.on_secret_updated().await }.boxed()
        }));
    }
    if let Err(e) = secrets.watch() {
        warn!("Secret rotation is disabled: {}", e);
    }

    manager.initialize().await?;

    let discovery = DiscoveryService::new(manager.clone(), config.discovery.clone());
    discovery.start().await;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, shutting down gracefully...");
                    shutdown.cancel();
                }
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
        });
    }

    let gate = RtspAuth::new(secrets.clone(), config.rtsp.credential_secret.clone());
    let auth_addr = config.rtsp.auth_server.clone();
    let auth_server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = rtsp_auth::serve(gate, &auth_addr, shutdown.cancelled_owned()).await {
                error!("RTSP credential gate failed: {}", e);
            }
        })
    };

    let app = create_app(AppState::new(manager.clone(), discovery.clone()));

    // Bind to 0.0.0.0 to be accessible from all interfaces (Docker, network, etc.)
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    shutdown.cancel();
    discovery.stop().await;
    manager.shutdown().await;
    if let Err(e) = auth_server.await {
        warn!("RTSP credential gate task failed: {}", e);
    }

    info!("Server shut down");
    Ok(())
}
