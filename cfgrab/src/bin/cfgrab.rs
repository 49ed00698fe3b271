//! cfgrab: fetch running configurations from network devices.
//!
//! # Usage
//!
//! One device, configuration on stdout:
//! ```bash
//! cfgrab --host r1.lab.example.net --family enable_shell --user backup \
//!     --password-file /etc/cfgrab/backup.pw
//! ```
//!
//! A JSON inventory, one file per host:
//! ```bash
//! cfgrab --inventory devices.json --output-dir /var/lib/cfgrab --concurrency 16
//! ```
//!
//! Set `RUST_LOG=debug` for a step-by-step trace of each session.

use std::collections::BTreeMap;
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use cfgrab::error::{CancelReason, ConfigError};
use cfgrab::filter::OutputFilter;
use cfgrab::transport::{HostKeyVerification, TransportAuth};
use cfgrab::{
    CredentialSet, EngineConfig, FailureKind, Invocation, ProtocolRegistry, SessionEngine,
    SessionError, SessionPlan, SshConfig, SshTransport, inventory,
};

#[derive(Parser, Debug)]
#[command(name = "cfgrab")]
#[command(about = "Retrieve running configurations from interactive network device shells")]
#[command(version)]
struct Args {
    /// Device host in dotted form
    #[arg(short = 'H', long, conflicts_with = "inventory")]
    host: Option<String>,

    /// Device family (see --list-families)
    #[arg(short, long, alias = "model")]
    family: Option<String>,

    /// Login user
    #[arg(short, long)]
    user: Option<String>,

    /// File holding the login password
    #[arg(long)]
    password_file: Option<PathBuf>,

    /// File holding the privileged-mode password
    #[arg(long)]
    privileged_password_file: Option<PathBuf>,

    /// Key-exchange algorithm to prefer
    #[arg(long)]
    kex: Option<String>,

    /// Cipher to prefer
    #[arg(long)]
    cipher: Option<String>,

    /// Host-key algorithm to prefer
    #[arg(long)]
    hostkey: Option<String>,

    /// SSH port
    #[arg(short, long, default_value_t = 22)]
    port: u16,

    /// Short hostname used in prompts, when the host is an address
    #[arg(long)]
    hostname: Option<String>,

    /// JSON inventory of devices (requires --output-dir)
    #[arg(short, long, requires = "output_dir")]
    inventory: Option<PathBuf>,

    /// Write each configuration to <DIR>/<host> instead of stdout
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Maximum number of concurrent sessions
    #[arg(short = 'j', long, default_value_t = 8)]
    concurrency: usize,

    /// Seconds to wait for each expected prompt
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,

    /// Seconds a whole session may take
    #[arg(long)]
    deadline: Option<u64>,

    /// Seconds to wait for the SSH handshake
    #[arg(long, default_value_t = 30)]
    connect_timeout: u64,

    /// Host key checking: strict, accept-new or disabled
    #[arg(long, default_value_t = HostKeyVerification::AcceptNew)]
    host_key_checking: HostKeyVerification,

    /// known_hosts file (default: ~/.ssh/known_hosts)
    #[arg(long)]
    known_hosts: Option<PathBuf>,

    /// SSH-layer authentication: none or password
    #[arg(long, default_value = "none")]
    transport_auth: TransportAuth,

    /// Print the built-in device families and exit
    #[arg(long)]
    list_families: bool,
}

impl Args {
    /// The devices to visit, from the inventory or from single-device flags.
    fn invocations(&self) -> cfgrab::Result<Vec<Invocation>> {
        if let Some(path) = &self.inventory {
            return inventory::load(path);
        }

        let password_file = self
            .password_file
            .clone()
            .ok_or_else(|| missing("password-file"))?;

        Ok(vec![Invocation {
            host: self.host.clone().ok_or_else(|| missing("host"))?,
            family: self.family.clone().ok_or_else(|| missing("family"))?,
            user: self.user.clone().ok_or_else(|| missing("user"))?,
            password_file,
            privileged_password_file: self.privileged_password_file.clone(),
            kex_algorithm: self.kex.clone(),
            cipher: self.cipher.clone(),
            host_key_algorithm: self.hostkey.clone(),
            port: self.port,
            hostname: self.hostname.clone(),
            timeout_secs: None,
            filter_config: None,
            extra_expect_params: vec![],
        }])
    }
}

fn missing(flag: &str) -> cfgrab::Error {
    ConfigError::Invalid {
        message: format!("--{} is required without --inventory", flag),
    }
    .into()
}

/// Settings shared by every session in a run.
#[derive(Debug)]
struct Options {
    timeout: Duration,
    deadline: Option<Duration>,
    connect_timeout: Duration,
    host_key_checking: HostKeyVerification,
    known_hosts: Option<PathBuf>,
    transport_auth: TransportAuth,
}

/// Where captured configurations go.
trait CaptureSink: Send + Sync {
    fn store(&self, host: &str, config: &[u8]) -> io::Result<()>;
}

/// Writes the capture of a single device to stdout.
struct StdoutSink;

impl CaptureSink for StdoutSink {
    fn store(&self, _host: &str, config: &[u8]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(config)?;
        out.flush()
    }
}

/// Writes `<dir>/<host>`, replacing the previous capture only on success.
struct DirectorySink {
    dir: PathBuf,
}

impl CaptureSink for DirectorySink {
    fn store(&self, host: &str, config: &[u8]) -> io::Result<()> {
        let path = self.dir.join(host);
        let partial = self.dir.join(format!(".{}.partial", host));
        std::fs::write(&partial, config)?;
        std::fs::rename(&partial, &path)?;
        debug!("{}: wrote {}", host, path.display());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.list_families {
        list_families();
        return ExitCode::SUCCESS;
    }

    let devices = match args.invocations() {
        Ok(devices) => devices,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    let sink: Arc<dyn CaptureSink> = match &args.output_dir {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                error!("Cannot create {}: {}", dir.display(), e);
                return ExitCode::from(2);
            }
            Arc::new(DirectorySink { dir: dir.clone() })
        }
        None => Arc::new(StdoutSink),
    };

    let options = Arc::new(Options {
        timeout: Duration::from_secs(args.timeout),
        deadline: args.deadline.map(Duration::from_secs),
        connect_timeout: Duration::from_secs(args.connect_timeout),
        host_key_checking: args.host_key_checking,
        known_hosts: args.known_hosts.clone(),
        transport_auth: args.transport_auth,
    });

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling sessions");
            interrupt.cancel();
        }
    });

    let limit = Arc::new(Semaphore::new(args.concurrency.max(1)));
    let handles: Vec<_> = devices
        .into_iter()
        .map(|device| {
            let options = options.clone();
            let sink = sink.clone();
            let limit = limit.clone();
            let cancel = cancel.child_token();
            tokio::spawn(async move {
                let host = device.host.clone();
                let result = match grab(device, &options, &limit, cancel).await {
                    Ok(config) => sink.store(&host, &config).map_err(|e| {
                        error!("{}: failed to store capture: {}", host, e);
                        FailureKind::Config
                    }),
                    Err(e) => {
                        error!("{}: {}", host, e);
                        Err(e.kind())
                    }
                };
                (host, result)
            })
        })
        .collect();

    let mut succeeded = 0usize;
    let mut failures: BTreeMap<FailureKind, Vec<String>> = BTreeMap::new();
    for joined in futures_util::future::join_all(handles).await {
        match joined {
            Ok((_, Ok(()))) => succeeded += 1,
            Ok((host, Err(kind))) => failures.entry(kind).or_default().push(host),
            Err(e) => {
                error!("Session task failed: {}", e);
                failures
                    .entry(FailureKind::Transport)
                    .or_default()
                    .push("<unknown>".to_string());
            }
        }
    }

    report(succeeded, &failures);
    if failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// A device session with everything resolved except the network.
struct Prepared {
    plan: SessionPlan,
    ssh: SshConfig,
    engine: EngineConfig,
    filter: Option<OutputFilter>,
}

/// Resolve protocol, credentials, plan and filter for one device.
///
/// Every configuration problem surfaces here, before a connection is opened.
fn prepare(device: &Invocation, options: &Options) -> cfgrab::Result<Prepared> {
    let protocol = ProtocolRegistry::lookup(&device.family)?;
    device.validate(&protocol)?;
    let filter = device.filter()?;

    let target = device.target();
    let credentials = CredentialSet::load_from(&device.credential_source())?;
    let plan = SessionPlan::new(&target, credentials, &protocol)?;

    let mut ssh = SshConfig::for_target(&target)
        .with_port(device.port)
        .with_auth(options.transport_auth)
        .with_timeout(options.connect_timeout)
        .with_terminal_size(protocol.terminal_width, protocol.terminal_height)
        .with_host_key_verification(options.host_key_checking);
    if let Some(path) = &options.known_hosts {
        ssh = ssh.with_known_hosts_path(path);
    }

    let engine = EngineConfig::default().with_timeout(device.timeout().unwrap_or(options.timeout));

    Ok(Prepared {
        plan,
        ssh,
        engine,
        filter,
    })
}

/// Run `fut` unless the token fires or the deadline passes first.
async fn guarded<T>(
    fut: impl Future<Output = cfgrab::Result<T>>,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> cfgrab::Result<T> {
    let expired = async {
        match deadline {
            Some(at) => time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled(CancelReason::Requested)),
        _ = expired => Err(cancelled(CancelReason::Deadline)),
        result = fut => result,
    }
}

fn cancelled(reason: CancelReason) -> cfgrab::Error {
    SessionError::Cancelled { step: 0, reason }.into()
}

/// Run one device session end to end.
///
/// The deadline starts once a concurrency slot is free and covers the
/// connection as well as the dialogue.
async fn grab(
    device: Invocation,
    options: &Options,
    limit: &Semaphore,
    cancel: CancellationToken,
) -> cfgrab::Result<Vec<u8>> {
    let Prepared {
        plan,
        ssh,
        mut engine,
        filter,
    } = prepare(&device, options)?;

    let slot = async { Ok::<_, cfgrab::Error>(limit.acquire().await.ok()) };
    let _permit = guarded(slot, &cancel, None).await?;
    let deadline = options.deadline.map(|d| Instant::now() + d);

    let (transport, mut channel) = guarded(
        async {
            let transport = SshTransport::connect(ssh, plan.credentials()).await?;
            let channel = transport.open_channel().await?;
            Ok::<_, cfgrab::Error>((transport, channel))
        },
        &cancel,
        deadline,
    )
    .await?;

    if let Some(at) = deadline {
        engine = engine.with_deadline(at.saturating_duration_since(Instant::now()));
    }

    let result = SessionEngine::new(plan, engine)
        .with_cancellation(cancel)
        .run(&mut channel)
        .await;

    if let Err(e) = transport.close().await {
        debug!("{}: disconnect failed: {}", device.host, e);
    }

    let capture = result?;
    Ok(match filter {
        Some(filter) => filter.apply(capture.as_bytes()),
        None => capture.as_bytes().to_vec(),
    })
}

fn list_families() {
    let registry = match ProtocolRegistry::global().read() {
        Ok(registry) => registry,
        Err(poisoned) => poisoned.into_inner(),
    };
    for name in registry.names() {
        println!("{}", name);
    }
}

fn report(succeeded: usize, failures: &BTreeMap<FailureKind, Vec<String>>) {
    let failed: usize = failures.values().map(Vec::len).sum();
    info!("{} succeeded, {} failed", succeeded, failed);
    for (kind, hosts) in failures {
        warn!("{} ({}): {}", kind, hosts.len(), hosts.join(", "));
    }
}
