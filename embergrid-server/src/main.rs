//! Site process entry point: parses CLI flags, loads a `SiteConfig`
//! from TOML, wires the in-process demo transport, stands up a
//! `SiteSupervisor`, and blocks until Ctrl-C.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use embergrid_base::partition_set_of;
use embergrid_net::{InProcessTransport, Rows, Transport, Value};
use embergrid_proc::{ExecutorContext, ProcedureRegistry, StoredProcedure};
use embergrid_site::{SiteConfig, SiteSupervisor};
use embergrid_txn::ExecError;

#[derive(Parser, Debug)]
#[command(name = "embergrid-server")]
#[command(about = "Runs a single site's partition executors")]
struct Args {
    /// Path to this site's TOML configuration file.
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Runs the built-in `echo` smoke-test procedure against the
    /// site's first hosted partition once startup completes, then
    /// exits instead of waiting for Ctrl-C.
    #[arg(long)]
    smoke_test: bool,
}

fn main() -> ExitCode {
    setup_tracing();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(target: "embergrid", error = %e, "site process exiting with error");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> embergrid_base::Result<()> {
    let contents = std::fs::read_to_string(&args.config)
        .map_err(|e| embergrid_base::err(format!("reading {}: {e}", args.config.display())))?;
    let config = SiteConfig::from_toml_str(&contents)?;

    tracing::info!(
        target: "embergrid",
        site = config.site.id,
        partitions = ?config.site.partitions,
        "starting site"
    );

    let transport: Arc<dyn Transport> = Arc::new(InProcessTransport::new());
    let mut supervisor = SiteSupervisor::new(&config, transport, register_procedures)?;
    supervisor.start();

    if args.smoke_test {
        run_smoke_test(&supervisor)?;
        supervisor.shutdown();
        return Ok(());
    }

    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let signal_flag = running.clone();
    ctrlc::set_handler(move || {
        signal_flag.store(false, std::sync::atomic::Ordering::SeqCst);
    })
    .map_err(|e| embergrid_base::err(format!("failed to install Ctrl-C handler: {e}")))?;

    while running.load(std::sync::atomic::Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    tracing::info!(target: "embergrid", "shutdown signal received, draining site");
    supervisor.shutdown();
    Ok(())
}

/// Submits one `echo` transaction against the first hosted partition
/// and logs its outcome, for confirming a config file is wired up
/// correctly without a separate client binary.
fn run_smoke_test(supervisor: &SiteSupervisor) -> embergrid_base::Result<()> {
    let partition = *supervisor
        .hosted_partitions()
        .first()
        .ok_or_else(|| embergrid_base::err("site hosts no partitions"))?;

    let resp = supervisor.submit_and_wait(
        partition,
        "echo",
        b"hello".to_vec(),
        partition_set_of([partition]),
        true,
        true,
        Duration::from_secs(5),
    )?;
    tracing::info!(target: "embergrid", status = ?resp.status, "smoke test transaction finished");
    Ok(())
}

/// Registers the procedures this binary ships with. A real deployment
/// would load these from a plugin or a generated catalog; this demo
/// binary only carries the one smoke-test procedure.
fn register_procedures(registry: &mut ProcedureRegistry) {
    registry.register("echo", None, || Box::new(EchoProc));
}

struct EchoProc;

impl StoredProcedure for EchoProc {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn call(
        &mut self,
        _ctx: &mut dyn ExecutorContext,
        params: &embergrid_net::ParamBlob,
    ) -> Result<Vec<Rows>, ExecError> {
        Ok(vec![vec![vec![Value::Bytes(params.clone())]]])
    }
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

