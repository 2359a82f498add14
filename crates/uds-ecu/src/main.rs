//! UDS ECU Simulator
//!
//! Emulates the diagnostic service layer of an ECU over ISO-TP or DoIP.
//!
//! # Usage
//!
//! ISO-TP on a virtual CAN bus:
//! ```bash
//! ./uds-ecu --interface vcan0
//! ```
//!
//! DoIP with a custom service catalog:
//! ```bash
//! ./uds-ecu --transport doip --bind 0.0.0.0:13400 --catalog config/service_ids.yaml
//! ```
//!
//! With config file:
//! ```bash
//! ./uds-ecu --config config/ecu.toml
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use uds_core::{EcuProfile, ServiceCatalog};
use uds_ecu::transport::doip::DoipServer;
use uds_ecu::{EcuConfig, TransportKind};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Isotp,
    Doip,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Isotp => TransportKind::Isotp,
            TransportArg::Doip => TransportKind::Doip,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "uds-ecu")]
#[command(about = "Simulated UDS (ISO 14229) ECU")]
struct Args {
    /// Configuration file path (TOML or YAML)
    /// If provided, overrides command-line options
    #[arg(short, long)]
    config: Option<String>,

    /// CAN interface name
    #[arg(short, long, default_value = "vcan0")]
    interface: String,

    /// ECU's receive CAN ID (tester sends to this)
    #[arg(long, default_value = "0x18DA00F1")]
    rx_id: String,

    /// ECU's transmit CAN ID (ECU sends from this)
    #[arg(long, default_value = "0x18DAF100")]
    tx_id: String,

    /// Transport to listen on
    #[arg(short, long, value_enum, default_value = "isotp")]
    transport: TransportArg,

    /// DoIP listen address
    #[arg(long, default_value = "0.0.0.0:13400")]
    bind: String,

    /// Service catalog file (YAML or TOML)
    #[arg(long)]
    catalog: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        "uds_ecu=debug,uds_core=debug"
    } else {
        "uds_ecu=info,uds_core=info"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = if let Some(config_path) = &args.config {
        info!("Loading config from: {}", config_path);
        EcuConfig::load(config_path).context("Failed to load config")?
    } else {
        let mut config = EcuConfig::default();
        config.transport.kind = args.transport.into();
        config.transport.interface = args.interface.clone();
        config.transport.rx_id = args.rx_id.clone();
        config.transport.tx_id = args.tx_id.clone();
        config.transport.bind = args.bind.clone();
        config.catalog = args.catalog.clone();
        config
    };

    let profile = Arc::new(config.to_profile().context("Invalid ECU profile")?);
    let catalog = Arc::new(
        config
            .load_catalog()
            .context("Failed to load service catalog")?,
    );

    info!("Starting UDS ECU Simulator");
    info!(
        services = catalog.len(),
        vin = %String::from_utf8_lossy(&profile.vin),
        dtcs = profile.dtcs.len(),
        "ECU profile loaded"
    );

    match config.transport.kind {
        TransportKind::Doip => run_doip(&config, catalog, profile).await?,
        TransportKind::Isotp => run_isotp(&config, catalog, profile).await?,
    }

    info!("ECU Simulator stopped");
    Ok(())
}

async fn run_doip(
    config: &EcuConfig,
    catalog: Arc<ServiceCatalog>,
    profile: Arc<EcuProfile>,
) -> Result<()> {
    let server = DoipServer::bind(
        &config.transport.bind,
        config.transport.logical_address,
        catalog,
        profile,
    )
    .await?;

    info!("Press Ctrl+C to stop");
    tokio::select! {
        result = server.serve() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
    }
    Ok(())
}

#[cfg(all(target_os = "linux", feature = "socketcan"))]
async fn run_isotp(
    config: &EcuConfig,
    catalog: Arc<ServiceCatalog>,
    profile: Arc<EcuProfile>,
) -> Result<()> {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use uds_core::EcuSession;
    use uds_ecu::transport::isotp::IsoTpServer;
    use uds_ecu::transport::parse_can_id;

    let rx_id = parse_can_id(&config.transport.rx_id)?;
    let tx_id = parse_can_id(&config.transport.tx_id)?;
    let session = Arc::new(EcuSession::new(catalog, profile));

    let server = IsoTpServer::new(&config.transport.interface, rx_id, tx_id, session);
    let running = server.running();

    info!("Press Ctrl+C to stop");
    let serve = server.serve();
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => return result,
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
    }

    running.store(false, Ordering::SeqCst);
    let _ = tokio::time::timeout(Duration::from_secs(2), serve).await;
    Ok(())
}

#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
async fn run_isotp(
    _config: &EcuConfig,
    _catalog: Arc<ServiceCatalog>,
    _profile: Arc<EcuProfile>,
) -> Result<()> {
    anyhow::bail!("ISO-TP transport requires Linux and the `socketcan` feature; use --transport doip")
}
