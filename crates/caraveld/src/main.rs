//! caraveld — the Caravel ADC hub daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use caravel_hub::{Hub, HubConfig};

#[derive(Parser, Debug)]
#[command(name = "caraveld", version, about = "Caravel ADC hub daemon")]
struct Args {
    /// Config file path (default: $CARAVEL_CONFIG, then ~/.config/caravel/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:1411 (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Hub name (overrides config).
    #[arg(long)]
    name: Option<String>,

    /// Hub description (overrides config).
    #[arg(long)]
    desc: Option<String>,

    /// TLS certificate chain, PEM. Requires --key; enables adcs://.
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// TLS private key, PEM.
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = HubConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.network.listen = host;
    }
    if let Some(name) = args.name {
        config.hub.name = name;
    }
    if let Some(desc) = args.desc {
        config.hub.desc = desc;
    }
    if args.cert.is_some() {
        config.tls.cert = args.cert;
    }
    if args.key.is_some() {
        config.tls.key = args.key;
    }

    let tls = tls_acceptor(&config)?;
    let listener = TcpListener::bind(&config.network.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.network.listen))?;
    let local = listener.local_addr()?;
    let scheme = if tls.is_some() { "adcs" } else { "adc" };
    tracing::info!(name = %config.hub.name, "listening on {scheme}://{local}");

    let hub = Hub::new(config);
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        let hub = hub.clone();
        let tls = tls.clone();
        tokio::spawn(async move {
            let result = match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => hub.serve(stream, addr).await,
                    Err(e) => {
                        tracing::warn!(%addr, error = %e, "TLS accept failed");
                        return;
                    }
                },
                None => hub.serve(stream, addr).await,
            };
            if let Err(e) = result {
                tracing::warn!(%addr, error = %e, "connection ended with error");
            }
        });
    }
}

/// Build the TLS acceptor from the configured PEM files, if any.
fn tls_acceptor(config: &HubConfig) -> Result<Option<TlsAcceptor>> {
    let (cert_path, key_path) = match (config.tls.cert.as_ref(), config.tls.key.as_ref()) {
        (None, None) => return Ok(None),
        (Some(cert), Some(key)) => (cert, key),
        _ => anyhow::bail!("TLS requires both cert and key paths"),
    };

    let mut reader = std::io::BufReader::new(
        std::fs::File::open(cert_path)
            .with_context(|| format!("failed to open certificate {}", cert_path.display()))?,
    );
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse certificate PEM")?;

    let mut reader = std::io::BufReader::new(
        std::fs::File::open(key_path)
            .with_context(|| format!("failed to open key {}", key_path.display()))?,
    );
    let key = rustls_pemfile::private_key(&mut reader)
        .context("failed to parse key PEM")?
        .context("no private key found in key file")?;

    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid certificate/key pair")?;
    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}
