use crate::{
    model::event::EventSink,
    store::JobStore,
};
use anyhow::{
    anyhow,
    Context,
    Result,
};
use clap::Parser;
use log::{
    error,
    info,
};
use std::{
    net::{
        Ipv4Addr,
        SocketAddrV4,
    },
    path::PathBuf,
    sync::Arc,
};
use tokio::net::{
    TcpListener,
    UdpSocket,
};

mod console;
mod error;
mod jetdirect;
mod model;
mod snmp;
mod store;

/// Events buffered between the listeners and the console.
const EVENT_BUFFER: usize = 256;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
/// A network printer that stores every raw print job it receives and
/// answers SNMP status queries about itself
struct Cli {
    /// What address to bind to
    #[clap(short, long, default_value = "0.0.0.0", env = "FAUXPRINT_ADDRESS")]
    address: Ipv4Addr,
    /// What port to accept raw print jobs on
    #[clap(short, long, default_value = "9100", env = "FAUXPRINT_PORT")]
    port: u16,
    /// What port to answer SNMP queries on
    #[clap(short, long, default_value = "161", env = "FAUXPRINT_SNMP_PORT")]
    snmp_port: u16,
    /// Where to store job logs
    #[clap(short, long, default_value = "print_jobs", env = "FAUXPRINT_JOBS_DIR")]
    jobs_dir: PathBuf,
    /// Echo received print data to stdout
    #[clap(short, long, env = "FAUXPRINT_ECHO")]
    echo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Cli::parse();
    let print_addr = SocketAddrV4::new(args.address, args.port);
    let snmp_addr = SocketAddrV4::new(args.address, args.snmp_port);

    let (events, event_rx) = EventSink::channel(EVENT_BUFFER);
    let store = Arc::new(
        JobStore::open(&args.jobs_dir, events.clone())
            .await
            .context("cannot initialise job storage")?,
    );

    info!("Starting fauxprint on {} (SNMP on {})", print_addr, snmp_addr);
    let print_socket = TcpListener::bind(&print_addr)
        .await
        .with_context(|| format!("cannot bind {}", print_addr))?;
    let snmp_socket = UdpSocket::bind(&snmp_addr)
        .await
        .with_context(|| format!("cannot bind {}", snmp_addr))?;

    let prints = tokio::spawn(jetdirect::server::run(print_socket, store.clone(), events.clone()));
    let status = tokio::spawn(snmp::agent::run(snmp_socket, store.clone(), events));
    let console = tokio::spawn(console::run(store.clone(), event_rx, args.echo));

    tokio::select! {
        result = async { tokio::try_join!(prints, status, console) } => {
            let (prints, status, console) = result.map_err(|e| anyhow!(e))?;
            prints?;
            status?;
            console?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down");
        }
    }

    if let Err(e) = store.close().await {
        error!("Failed to sync the active job; error = {}", e);
    }
    Ok(())
}
