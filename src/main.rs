#![forbid(unsafe_code)]

//! `rollcall` — terminal client for the classroom attendance service.
//!
//! Students verify face, speech and location, then mark attendance for an
//! active session. Teachers list, create, edit and delete sessions.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use rollcall::api::ApiClient;
use rollcall::desk::{MarkOutcome, StudentDesk, TeacherDesk};
use rollcall::editor::{parse_date, parse_time, SessionDraft, SessionEdit};
use rollcall::feed::spawn_feed_task;
use rollcall::location::{FixedLocation, IpLocator, LocationProvider, NoLocation};
use rollcall::models::verification::Coordinates;
use rollcall::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "rollcall", about = "Classroom attendance client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "rollcall.toml")]
    config: PathBuf,

    /// Log output format (text or json). Logs go to stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Student actions.
    Student {
        #[command(subcommand)]
        action: StudentCommand,
    },
    /// Teacher actions.
    Teacher {
        #[command(subcommand)]
        action: TeacherCommand,
    },
}

/// Where the student's position comes from.
#[derive(Debug, Clone, Args)]
struct LocationArgs {
    /// Current latitude.
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<f64>,
    /// Current longitude.
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<f64>,
    /// Resolve the position from the public IP address.
    #[arg(long, conflicts_with_all = ["lat", "lng"])]
    ip_locate: bool,
}

#[derive(Debug, Subcommand)]
enum StudentCommand {
    /// Show active and upcoming sessions.
    Sessions {
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Show my attendance records.
    History,
    /// Verify face, speech and location, then mark attendance.
    Mark {
        /// Session to mark.
        session_id: i64,
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Refresh the session list until interrupted.
    Watch {
        #[command(flatten)]
        location: LocationArgs,
    },
}

/// Fields of the session form.
#[derive(Debug, Clone, Args)]
struct SessionFields {
    /// Class name.
    #[arg(long)]
    class_name: Option<String>,
    /// Local date, YYYY-MM-DD.
    #[arg(long)]
    date: Option<String>,
    /// Local start time, HH:MM.
    #[arg(long)]
    start: Option<String>,
    /// Local end time, HH:MM.
    #[arg(long, conflicts_with = "duration")]
    end: Option<String>,
    /// Length in minutes (instead of --end).
    #[arg(long)]
    duration: Option<u32>,
    /// Geofence center latitude.
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,
    /// Geofence center longitude.
    #[arg(long, allow_hyphen_values = true)]
    lng: Option<f64>,
    /// Geofence radius in meters.
    #[arg(long)]
    radius: Option<f64>,
    /// Use the configured or IP-derived position as the geofence center.
    #[arg(long, conflicts_with_all = ["lat", "lng"])]
    here: bool,
}

#[derive(Debug, Subcommand)]
enum TeacherCommand {
    /// List sessions with attendance counts.
    List,
    /// Create a session.
    Create {
        #[command(flatten)]
        fields: SessionFields,
    },
    /// Edit a session; only the given fields change.
    Edit {
        /// Session to edit.
        id: i64,
        #[command(flatten)]
        fields: SessionFields,
        /// Remove the geofence.
        #[arg(long, conflicts_with_all = ["lat", "lng", "radius", "here"])]
        clear_geofence: bool,
    },
    /// Delete a session.
    Delete {
        /// Session to delete.
        id: i64,
    },
    /// Print the attendance count of a session.
    Count {
        /// Session to count.
        id: i64,
    },
    /// Download the attendance spreadsheet.
    Export {
        /// Destination file.
        path: PathBuf,
    },
    /// Refresh the session list until interrupted.
    Watch,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
        .inspect_err(|err| error!(%err, "rollcall failed"))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;
    info!(base_url = %config.base_url, "configuration loaded");

    let client = ApiClient::new(&config)?;
    match args.command {
        Command::Student { action } => run_student(action, client, &config).await,
        Command::Teacher { action } => run_teacher(action, client, &config).await,
    }
}

fn location_provider(
    args: &LocationArgs,
    config: &GlobalConfig,
) -> Result<Box<dyn LocationProvider>> {
    if args.ip_locate {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        return Ok(Box::new(IpLocator::new(http, config.ip_lookup_url.clone())));
    }
    if let (Some(lat), Some(lng)) = (args.lat, args.lng) {
        return Ok(Box::new(FixedLocation::new(Coordinates::new(lat, lng))));
    }
    Ok(match config.location {
        Some(fixed) => Box::new(FixedLocation::new(fixed.coordinates())),
        None => Box::new(NoLocation),
    })
}

fn location_requested(args: &LocationArgs, config: &GlobalConfig) -> bool {
    args.ip_locate || args.lat.is_some() || config.location.is_some()
}

async fn share_location(desk: &mut StudentDesk, provider: &dyn LocationProvider) {
    match desk.acquire_location(provider).await {
        Ok(pos) => println!("\u{1f4cd} {:.5}, {:.5}", pos.lat, pos.lng),
        Err(err) => println!("\u{274c} Location error: {err}"),
    }
}

async fn run_student(
    action: StudentCommand,
    client: ApiClient,
    config: &GlobalConfig,
) -> Result<()> {
    let mut desk = StudentDesk::new(client.clone(), config)?;
    match action {
        StudentCommand::Sessions { location } => {
            if location_requested(&location, config) {
                let provider = location_provider(&location, config)?;
                share_location(&mut desk, provider.as_ref()).await;
            }
            let now = Utc::now();
            let view = desk.refresh(now).await?;
            println!("{}", desk.render(&view, now));
        }
        StudentCommand::History => {
            let now = Utc::now();
            let view = desk.refresh(now).await?;
            let records = view.history.unwrap_or_default();
            if records.is_empty() {
                println!("No records yet.");
            }
            let offset = config.display_offset()?;
            for record in &records {
                println!(
                    "{}",
                    rollcall::render::history_entry(record, desk.sessions(), now, offset)
                );
            }
        }
        StudentCommand::Mark {
            session_id,
            location,
        } => {
            desk.student_id()?;
            let face = desk.verify_face().await?;
            if face.ok {
                println!("\u{2705} Face verified successfully");
            } else {
                println!(
                    "\u{274c} {}",
                    face.message.as_deref().unwrap_or("Face verification failed")
                );
            }

            let (phrase, speech) = desk.verify_speech().await?;
            println!("\u{1f4e2} Please read aloud: \"{phrase}\"");
            if speech.ok {
                println!("\u{2705} Speech verified successfully");
            } else {
                println!(
                    "\u{274c} {}",
                    speech.message.as_deref().unwrap_or("Speech verification failed")
                );
            }

            let provider = location_provider(&location, config)?;
            share_location(&mut desk, provider.as_ref()).await;
            println!("{}", rollcall::render::verify_badge(desk.gate().verified_count()));

            let outcome = desk.mark(session_id, Utc::now()).await?;
            match outcome {
                MarkOutcome::Marked(_) => println!("\u{2705} {}", outcome.user_message()),
                MarkOutcome::Blocked(_) | MarkOutcome::Rejected(_) => {
                    println!("\u{274c} {}", outcome.user_message());
                }
            }
        }
        StudentCommand::Watch { location } => {
            if location_requested(&location, config) {
                let provider = location_provider(&location, config)?;
                share_location(&mut desk, provider.as_ref()).await;
            }
            let cancel = CancellationToken::new();
            let (mut rx, handle) = spawn_feed_task(client, config.poll_interval(), cancel.clone());
            let shutdown = shutdown_signal();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    () = &mut shutdown => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let Some(feed) = rx.borrow_and_update().clone() else {
                            continue;
                        };
                        let now = Utc::now();
                        match desk.absorb(feed.iter().cloned().collect(), now).await {
                            Ok(view) => println!("{}\n", desk.render(&view, now)),
                            Err(err) => warn!(%err, "history refresh failed"),
                        }
                    }
                }
            }
            cancel.cancel();
            let _ = handle.await;
        }
    }
    Ok(())
}

async fn teacher_center(
    fields: &SessionFields,
    config: &GlobalConfig,
) -> Result<Option<Coordinates>> {
    if !fields.here {
        return Ok(None);
    }
    let location = LocationArgs {
        lat: None,
        lng: None,
        ip_locate: config.location.is_none(),
    };
    let provider = location_provider(&location, config)?;
    provider
        .locate()
        .await
        .map(Some)
        .map_err(|err| AppError::Geolocation(format!("Could not get location: {err}")))
}

async fn run_teacher(
    action: TeacherCommand,
    client: ApiClient,
    config: &GlobalConfig,
) -> Result<()> {
    let desk = TeacherDesk::new(client.clone(), config)?;
    match action {
        TeacherCommand::List => {
            let now = Utc::now();
            let view = desk.overview(now).await?;
            println!("{}", desk.render(&view, now));
        }
        TeacherCommand::Create { fields } => {
            let center = teacher_center(&fields, config).await?;
            let missing = |name: &str| {
                AppError::Validation(format!("Fill Class, Date, Start: missing --{name}"))
            };
            let mut draft = SessionDraft {
                class_name: fields.class_name.clone().ok_or_else(|| missing("class-name"))?,
                date: parse_date(fields.date.as_deref().ok_or_else(|| missing("date"))?)?,
                start: parse_time(fields.start.as_deref().ok_or_else(|| missing("start"))?)?,
                end: fields.end.as_deref().map(parse_time).transpose()?,
                duration_minutes: fields.duration,
                lat: fields.lat,
                lng: fields.lng,
                radius_m: fields.radius,
            };
            if let Some(center) = center {
                draft.use_location(center, desk.default_radius_m());
            }
            let id = desk.create(draft).await?;
            println!("created session #{id}");
        }
        TeacherCommand::Edit {
            id,
            fields,
            clear_geofence,
        } => {
            let center = teacher_center(&fields, config).await?;
            let edit = SessionEdit {
                class_name: fields.class_name.clone(),
                date: fields.date.as_deref().map(parse_date).transpose()?,
                start: fields.start.as_deref().map(parse_time).transpose()?,
                end: fields.end.as_deref().map(parse_time).transpose()?,
                duration_minutes: fields.duration,
                lat: center.map(|c| c.lat).or(fields.lat),
                lng: center.map(|c| c.lng).or(fields.lng),
                radius_m: fields.radius,
                clear_geofence,
            };
            let session = desk.edit(id, edit).await?;
            println!(
                "{}",
                rollcall::render::teacher_card(&session, None, Utc::now(), config.display_offset()?)
            );
        }
        TeacherCommand::Delete { id } => {
            desk.delete(id).await?;
            println!("deleted session #{id}");
        }
        TeacherCommand::Count { id } => {
            println!("{}", desk.count(id).await?);
        }
        TeacherCommand::Export { path } => {
            let written = desk.export(&path).await?;
            println!("wrote {written} bytes to {}", path.display());
        }
        TeacherCommand::Watch => {
            let cancel = CancellationToken::new();
            let (mut rx, handle) = spawn_feed_task(client, config.poll_interval(), cancel.clone());
            let shutdown = shutdown_signal();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    () = &mut shutdown => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if rx.borrow_and_update().is_none() {
                            continue;
                        }
                        let now = Utc::now();
                        match desk.overview(now).await {
                            Ok(view) => println!("{}\n", desk.render(&view, now)),
                            Err(err) => warn!(%err, "overview refresh failed"),
                        }
                    }
                }
            }
            cancel.cancel();
            let _ = handle.await;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
