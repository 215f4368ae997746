//! # tcpipc CLI Entry Point
//!
//! Hosts and calls the demo services over tcpipc.
//!
//! ## Usage
//!
//! ```bash
//! # Host a calculator and advertise it on the local network
//! tcpipc serve-calculator -b 0.0.0.0:62001 --advertise
//!
//! # Add two numbers, finding the calculator through discovery
//! tcpipc add 2 3
//!
//! # Share a directory and fetch a file from it
//! tcpipc serve-files -d ./shared
//! tcpipc fetch -s 127.0.0.1:63000 photo.bmp
//!
//! # Discovery on its own
//! tcpipc advertise Calculator
//! tcpipc discover Calculator
//! ```

use anyhow::{bail, Result};
use argh::FromArgs;
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tcpipc_cli::{
    BasicCalculator, Calculator, DirectoryShare, FileTransfer, CALCULATOR_PORT, FILE_TRANSFER_PORT,
};
use tcpipc_client::Client;
use tcpipc_common::contract::RemoteContract;
use tcpipc_discovery::{
    DiscoveryConfig, ServiceAdvertiser, ServiceDiscoverer, DEFAULT_GROUP, DEFAULT_PORT,
};
use tcpipc_server::{Server, ServerConfig, ServerEvent};

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// tcpipc - synchronous RPC over TCP
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    ServeCalculator(ServeCalculatorArgs),
    Add(AddArgs),
    ServeFiles(ServeFilesArgs),
    ListFiles(ListFilesArgs),
    Fetch(FetchArgs),
    Advertise(AdvertiseArgs),
    Discover(DiscoverArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "serve-calculator")]
/// host the calculator service until Enter is pressed
struct ServeCalculatorArgs {
    /// address to listen on
    #[argh(option, short = 'b', default = "format!(\"127.0.0.1:{}\", CALCULATOR_PORT)")]
    bind: String,

    /// announce the service on the discovery group
    #[argh(switch)]
    advertise: bool,

    /// UDP port announcements are sent to
    #[argh(option, long = "discovery-port", default = "DEFAULT_PORT")]
    discovery_port: u16,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "add")]
/// add two numbers on a remote calculator
///
/// Without --server the calculator is located through discovery.
struct AddArgs {
    /// first operand
    #[argh(positional)]
    a: i64,

    /// second operand
    #[argh(positional)]
    b: i64,

    /// calculator address (host:port)
    #[argh(option, short = 's')]
    server: Option<String>,

    /// TCP port of a discovered calculator
    #[argh(option, default = "CALCULATOR_PORT")]
    port: u16,

    /// UDP port to listen on for announcements
    #[argh(option, long = "discovery-port", default = "DEFAULT_PORT")]
    discovery_port: u16,

    /// how long to wait for discovery, in milliseconds
    #[argh(option, long = "timeout-ms", default = "5000")]
    timeout_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "serve-files")]
/// share the files of a directory until Enter is pressed
struct ServeFilesArgs {
    /// directory to share
    #[argh(option, short = 'd', default = "\".\".into()")]
    dir: String,

    /// address to listen on
    #[argh(option, short = 'b', default = "format!(\"127.0.0.1:{}\", FILE_TRANSFER_PORT)")]
    bind: String,

    /// announce the service on the discovery group
    #[argh(switch)]
    advertise: bool,

    /// UDP port announcements are sent to
    #[argh(option, long = "discovery-port", default = "DEFAULT_PORT")]
    discovery_port: u16,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "list-files")]
/// list the files of a remote share
struct ListFilesArgs {
    /// share address (host:port)
    #[argh(option, short = 's', default = "format!(\"127.0.0.1:{}\", FILE_TRANSFER_PORT)")]
    server: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "fetch")]
/// download a file from a remote share
///
/// The file is written to <name>.cpy unless --output is given.
struct FetchArgs {
    /// name of the file in the share
    #[argh(positional)]
    name: String,

    /// share address (host:port)
    #[argh(option, short = 's', default = "format!(\"127.0.0.1:{}\", FILE_TRANSFER_PORT)")]
    server: String,

    /// where to write the file
    #[argh(option, short = 'o')]
    output: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "advertise")]
/// announce a type identifier until Enter is pressed
struct AdvertiseArgs {
    /// type identifier to announce
    #[argh(positional)]
    type_id: String,

    /// multicast group
    #[argh(option, default = "DEFAULT_GROUP")]
    group: Ipv4Addr,

    /// UDP port
    #[argh(option, default = "DEFAULT_PORT")]
    port: u16,

    /// time between announcements, in milliseconds
    #[argh(option, long = "interval-ms", default = "1000")]
    interval_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "discover")]
/// wait for a type identifier to be announced and print the sender
struct DiscoverArgs {
    /// type identifier to look for
    #[argh(positional)]
    type_id: String,

    /// multicast group
    #[argh(option, default = "DEFAULT_GROUP")]
    group: Ipv4Addr,

    /// UDP port
    #[argh(option, default = "DEFAULT_PORT")]
    port: u16,

    /// how long to wait, in milliseconds
    #[argh(option, long = "timeout-ms", default = "5000")]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Logs go to stderr so command output stays pipeable.
    // Default level is INFO, RUST_LOG overrides it.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::ServeCalculator(args) => run_serve_calculator(args),
        Commands::Add(args) => run_add(args),
        Commands::ServeFiles(args) => run_serve_files(args),
        Commands::ListFiles(args) => run_list_files(args),
        Commands::Fetch(args) => run_fetch(args),
        Commands::Advertise(args) => run_advertise(args),
        Commands::Discover(args) => run_discover(args),
    }
}

fn run_serve_calculator(args: ServeCalculatorArgs) -> Result<()> {
    let handle = Server::new::<dyn Calculator>(BasicCalculator::default())?
        .with_config(
            ServerConfig::new()
                .with_bind_addr(args.bind)
                .with_dispatcher_name("calculator-dispatcher"),
        )
        .on_event(print_event)
        .listen()?;

    let _advertiser = start_advertiser(
        args.advertise,
        <dyn Calculator as RemoteContract>::NAME,
        args.discovery_port,
    )?;

    println!(
        "Calculator service running on {}, press Enter to exit.",
        handle.local_addr()
    );
    wait_for_enter()?;
    handle.shutdown();
    Ok(())
}

fn run_add(args: AddArgs) -> Result<()> {
    let server = resolve_server(
        args.server,
        <dyn Calculator as RemoteContract>::NAME,
        args.port,
        DiscoveryConfig::new().with_port(args.discovery_port),
        Duration::from_millis(args.timeout_ms),
    )?;

    let client = Client::connect(server.as_str())?;
    let mut calculator = client.proxy::<dyn Calculator>();
    println!("{}", calculator.add(args.a, args.b)?);
    Ok(())
}

fn run_serve_files(args: ServeFilesArgs) -> Result<()> {
    let share = DirectoryShare::new(&args.dir)?;
    let root = share.root().display().to_string();

    let handle = Server::new::<dyn FileTransfer>(share)?
        .with_config(
            ServerConfig::new()
                .with_bind_addr(args.bind)
                .with_dispatcher_name("file-transfer-dispatcher"),
        )
        .on_event(print_event)
        .listen()?;

    let _advertiser = start_advertiser(
        args.advertise,
        <dyn FileTransfer as RemoteContract>::NAME,
        args.discovery_port,
    )?;

    println!(
        "Sharing '{}' on {}, press Enter to exit.",
        root,
        handle.local_addr()
    );
    wait_for_enter()?;
    handle.shutdown();
    Ok(())
}

fn run_list_files(args: ListFilesArgs) -> Result<()> {
    let client = Client::connect(args.server.as_str())?;
    let mut share = client.proxy::<dyn FileTransfer>();
    for name in share.list_files()? {
        println!("{}", name);
    }
    Ok(())
}

fn run_fetch(args: FetchArgs) -> Result<()> {
    let client = Client::connect(args.server.as_str())?;
    client.on_bulk_progress(|percent| {
        eprint!("\r{:>5.1}%", percent);
        let _ = io::stderr().flush();
    });

    let mut share = client.proxy::<dyn FileTransfer>();
    let started = Instant::now();
    let mut payload = share.transfer_file(args.name.clone())?;
    let elapsed = started.elapsed();
    eprintln!();

    let output = args
        .output
        .map(PathBuf::from)
        .unwrap_or_else(|| copy_name(&args.name));
    let mut file = File::create(&output)?;
    let written = io::copy(&mut payload, &mut file)?;

    println!(
        "Successfully wrote '{}' ({} bytes) @ {:.1} MB/s",
        output.display(),
        written,
        megabytes_per_second(written, elapsed)
    );
    Ok(())
}

fn run_advertise(args: AdvertiseArgs) -> Result<()> {
    let config = DiscoveryConfig::new()
        .with_group(args.group)
        .with_port(args.port)
        .with_interval(Duration::from_millis(args.interval_ms));

    let advertiser = ServiceAdvertiser::start_with_callback(args.type_id, config, |at| {
        tracing::debug!("Advertised at {:?}", at);
    })?;

    println!(
        "Advertising '{}' on {}:{}, press Enter to exit.",
        advertiser.type_id(),
        args.group,
        args.port
    );
    wait_for_enter()?;
    advertiser.stop();
    Ok(())
}

fn run_discover(args: DiscoverArgs) -> Result<()> {
    let config = DiscoveryConfig::new().with_group(args.group).with_port(args.port);
    let timeout = Duration::from_millis(args.timeout_ms);

    match ServiceDiscoverer::wait_for(args.type_id.as_str(), config, timeout)? {
        Some(addr) => {
            println!("{}", addr);
            Ok(())
        }
        None => bail!("no '{}' announcement within {:?}", args.type_id, timeout),
    }
}

/// Uses `server` when given, otherwise the first host announcing `contract`.
fn resolve_server(
    server: Option<String>,
    contract: &str,
    port: u16,
    discovery: DiscoveryConfig,
    timeout: Duration,
) -> Result<String> {
    if let Some(server) = server {
        return Ok(server);
    }

    tracing::info!("No server given, discovering '{}'", contract);
    match ServiceDiscoverer::wait_for(contract, discovery, timeout)? {
        Some(ip) => Ok(SocketAddr::new(ip, port).to_string()),
        None => bail!("no '{}' service found within {:?}", contract, timeout),
    }
}

fn start_advertiser(enabled: bool, contract: &str, port: u16) -> Result<Option<ServiceAdvertiser>> {
    if !enabled {
        return Ok(None);
    }
    let advertiser = ServiceAdvertiser::start(contract, DiscoveryConfig::new().with_port(port))?;
    Ok(Some(advertiser))
}

fn print_event(event: ServerEvent) {
    match event {
        ServerEvent::ClientConnected(addr) => println!("[+] client '{}' connected", addr),
        ServerEvent::ClientDisconnected(addr) => println!("[-] client '{}' disconnected", addr),
    }
}

fn wait_for_enter() -> Result<()> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

/// `<file name>.cpy` in the current directory.
fn copy_name(name: &str) -> PathBuf {
    let file_name = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    PathBuf::from(format!("{}.cpy", file_name))
}

fn megabytes_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds == 0.0 {
        return 0.0;
    }
    bytes as f64 / (1024.0 * 1024.0) / seconds
}
