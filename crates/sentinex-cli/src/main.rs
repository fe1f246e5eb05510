use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sentinex_core::{GateMode, GeoCoordinate};
use std::path::PathBuf;

mod check;
mod session;

#[zbus::proxy(
    interface = "org.sentinex.Attendance1",
    default_service = "org.sentinex.Attendance1",
    default_path = "/org/sentinex/Attendance1"
)]
trait Attendance {
    fn login(&self, badge: &str) -> zbus::Result<String>;
    fn time_in(
        &self,
        badge: &str,
        latitude: f64,
        longitude: f64,
        has_fix: bool,
        selfie: &[u8],
    ) -> zbus::Result<String>;
    fn pull_out(
        &self,
        badge: &str,
        latitude: f64,
        longitude: f64,
        has_fix: bool,
        selfie: &[u8],
    ) -> zbus::Result<String>;
    fn register(&self, badge: &str, name: &str) -> zbus::Result<String>;
    fn list_fences(&self) -> zbus::Result<String>;
    fn reload_fences(&self) -> zbus::Result<String>;
    fn recent_logs(&self, badge: &str, limit: u32) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "sentinex", about = "Sentinex geofenced attendance CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with a registered badge number
    Login { badge: String },
    /// Forget the logged-in badge
    Logout,
    /// Show the logged-in badge
    Whoami,
    /// Record a Time In
    TimeIn(AttendArgs),
    /// Record a Pull Out
    PullOut(AttendArgs),
    /// Register a badge number
    Register {
        badge: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// List the active geofences
    Fences,
    /// Re-read the daemon's fence file and publish a new snapshot
    ReloadFences,
    /// Show recent attendance records
    Logs {
        /// Only this badge (default: every badge)
        #[arg(long)]
        badge: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show daemon status
    Status,
    /// Evaluate a position against a fence file without the daemon
    Check {
        #[arg(long)]
        fences: PathBuf,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Authorize regardless of fences
        #[arg(long)]
        unrestricted: bool,
    },
}

#[derive(Args)]
struct AttendArgs {
    /// Selfie image to verify
    #[arg(long)]
    selfie: PathBuf,
    /// Current latitude; omit both coordinates when there is no fix
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,
    /// Badge to use instead of the logged-in one
    #[arg(long)]
    badge: Option<String>,
}

impl AttendArgs {
    fn position(&self) -> Option<GeoCoordinate> {
        self.lat
            .zip(self.lon)
            .map(|(lat, lon)| GeoCoordinate::new(lat, lon))
    }
}

async fn connect(system: bool) -> Result<AttendanceProxy<'static>> {
    let conn = if system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("failed to connect to D-Bus")?;
    AttendanceProxy::new(&conn)
        .await
        .context("sentinexd is not reachable")
}

/// Surface the daemon's own message for failed calls.
fn daemon_error(err: zbus::Error) -> anyhow::Error {
    match err {
        zbus::Error::MethodError(_, Some(msg), _) => anyhow!(msg),
        other => anyhow!(other),
    }
}

fn print_json(reply: &str) -> Result<()> {
    let value: serde_json::Value =
        serde_json::from_str(reply).context("daemon sent invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn session_badge(explicit: Option<String>) -> Result<String> {
    if let Some(badge) = explicit {
        return Ok(badge);
    }
    match session::load(&session::default_session_path())? {
        Some(s) => Ok(s.badge_id),
        None => bail!("not logged in; run `sentinex login <badge>` first"),
    }
}

async fn attend(system: bool, args: AttendArgs, pull_out: bool) -> Result<()> {
    let badge = session_badge(args.badge.clone())?;
    let selfie = std::fs::read(&args.selfie)
        .with_context(|| format!("cannot read selfie {}", args.selfie.display()))?;
    let position = args.position();
    let (lat, lon) = position.map_or((0.0, 0.0), |p| (p.latitude, p.longitude));

    let proxy = connect(system).await?;
    let reply = if pull_out {
        proxy
            .pull_out(&badge, lat, lon, position.is_some(), &selfie)
            .await
    } else {
        proxy
            .time_in(&badge, lat, lon, position.is_some(), &selfie)
            .await
    }
    .map_err(daemon_error)?;

    let record: serde_json::Value = serde_json::from_str(&reply)?;
    let status = if pull_out { "Pulled Out" } else { "Timed In" };
    match record["deployment_label"].as_str() {
        Some(label) => println!("{status} at {label}"),
        None => println!("{status}"),
    }
    print_json(&reply)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let system = cli.system;

    match cli.command {
        Commands::Login { badge } => {
            let proxy = connect(system).await?;
            let reply = proxy.login(&badge).await.map_err(daemon_error)?;
            let session: session::Session = serde_json::from_str(&reply)?;
            let path = session::default_session_path();
            session::save(&path, &session)?;
            tracing::debug!(path = %path.display(), "session saved");
            match &session.name {
                Some(name) => println!("Logged in as {} ({name})", session.badge_id),
                None => println!("Logged in as {}", session.badge_id),
            }
        }
        Commands::Logout => {
            if session::clear(&session::default_session_path())? {
                println!("Logged out");
            } else {
                println!("Not logged in");
            }
        }
        Commands::Whoami => match session::load(&session::default_session_path())? {
            Some(s) => println!("{}", s.badge_id),
            None => println!("Not logged in"),
        },
        Commands::TimeIn(args) => attend(system, args, false).await?,
        Commands::PullOut(args) => attend(system, args, true).await?,
        Commands::Register { badge, name } => {
            let proxy = connect(system).await?;
            let reply = proxy
                .register(&badge, name.as_deref().unwrap_or(""))
                .await
                .map_err(daemon_error)?;
            print_json(&reply)?;
        }
        Commands::Fences => {
            let proxy = connect(system).await?;
            print_json(&proxy.list_fences().await.map_err(daemon_error)?)?;
        }
        Commands::ReloadFences => {
            let proxy = connect(system).await?;
            print_json(&proxy.reload_fences().await.map_err(daemon_error)?)?;
        }
        Commands::Logs { badge, limit } => {
            let proxy = connect(system).await?;
            let reply = proxy
                .recent_logs(badge.as_deref().unwrap_or(""), limit)
                .await
                .map_err(daemon_error)?;
            print_json(&reply)?;
        }
        Commands::Status => match connect(system).await {
            Ok(proxy) => print_json(&proxy.status().await.map_err(daemon_error)?)?,
            Err(e) => println!("sentinexd: not connected ({e:#})"),
        },
        Commands::Check {
            fences,
            lat,
            lon,
            unrestricted,
        } => {
            let mode = if unrestricted {
                GateMode::Unrestricted
            } else {
                GateMode::Geofenced
            };
            let out = check::evaluate(&fences, GeoCoordinate::new(lat, lon), mode)?;
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}
