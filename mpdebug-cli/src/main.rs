//! mpdebug: step through S3 multipart uploads from the command line

use anyhow::Context;
use mpdebug_client::{CancellationToken, MultipartUploadDriver, S3Store};
use mpdebug_core::ConnectionConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod output;

use cli::Multipart;

const TRACE_FILTER: &str = "mpdebug=debug,aws_smithy_runtime=trace,aws_sigv4=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli::build().get_matches();
    let config = ConnectionConfig::from_env(cli::config_flags(&matches));

    init_tracing(config.trace);

    let command = match matches.subcommand() {
        Some(("multipart", sub)) => Multipart::from_matches(sub).context("invalid arguments")?,
        _ => anyhow::bail!("a subcommand is required"),
    };

    let store = match S3Store::new(&config) {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot connect: {}", e);
            eprintln!("mpdebug: {}\n", e);
            cli::build().print_help()?;
            std::process::exit(1);
        }
    };
    info!("Using endpoint {}", store.endpoint());

    let driver = MultipartUploadDriver::new(store);
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let output = commands::run(&driver, command, &cancel)
        .await
        .context("multipart command failed")?;
    println!("{}", output.render()?);

    Ok(())
}

/// Log to stderr so stdout only carries results
fn init_tracing(trace: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(trace)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Filter used when `RUST_LOG` is unset
fn default_filter(trace: bool) -> &'static str {
    if trace {
        TRACE_FILTER
    } else {
        "warn"
    }
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Interrupted, cancelling in-flight request");
        cancel.cancel();
    }
}
