//! musterd - The muster background service
//!
//! This is the main entry point for the musterd service.
//! It wires together all the components:
//! - Configuration loading and schedule seeding
//! - Store initialization
//! - Signup manager and attendance service
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use muster_api::{
    AttendanceKey, Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response,
    ResponsePayload,
};
use muster_config::{Settings, load_config};
use muster_core::{
    AttendanceService, CheckInOutcome, SignupDecision, SignupManager, StoreNotificationSink,
};
use muster_ipc::{IpcServer, ServerMessage};
use muster_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use muster_util::{Clock, ClientId, MusterError, SystemClock, default_config_path};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// musterd - Club enrollment and attendance service
#[derive(Parser, Debug)]
#[command(name = "musterd")]
#[command(about = "Club enrollment and attendance service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/muster/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set MUSTER_SOCKET env var)
    #[arg(short, long, env = "MUSTER_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set MUSTER_DATA_DIR env var)
    #[arg(short, long, env = "MUSTER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Command handling shared by every client connection
struct Engine {
    signups: SignupManager,
    attendance: AttendanceService,
    store: Arc<dyn Store>,
}

impl Engine {
    fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let notifier = Arc::new(StoreNotificationSink::new(store.clone()));
        Self {
            signups: SignupManager::new(store.clone(), notifier, clock.clone()),
            attendance: AttendanceService::new(store.clone(), clock),
            store,
        }
    }

    /// Run one command. Returns the response and the events it caused.
    fn handle_command(
        &self,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> (Response, Vec<Event>) {
        match self.dispatch(client_id, command) {
            Ok((payload, events)) => (
                Response::success(request_id, payload),
                events.into_iter().map(Event::new).collect(),
            ),
            Err(e) => {
                if matches!(e, MusterError::StoreError(_) | MusterError::Internal(_)) {
                    error!(request_id, error = %e, "Command failed");
                } else {
                    debug!(request_id, error = %e, "Command refused");
                }
                (Response::error(request_id, error_info(&e)), Vec::new())
            }
        }
    }

    fn dispatch(
        &self,
        client_id: &ClientId,
        command: Command,
    ) -> muster_util::Result<(ResponsePayload, Vec<EventPayload>)> {
        let result = match command {
            // Activities
            Command::GetActivity { activity_id } => (
                ResponsePayload::Activity(self.signups.get_activity(&activity_id)?),
                vec![],
            ),

            Command::ListActivities => (
                ResponsePayload::Activities {
                    activities: self.signups.list_activities()?,
                },
                vec![],
            ),

            Command::PutActivity { activity } => {
                let view = self.signups.upsert_activity(activity)?;
                let event = EventPayload::ActivityChanged {
                    activity_id: view.activity.id.clone(),
                };
                (ResponsePayload::Activity(view), vec![event])
            }

            Command::DeleteActivity { activity_id } => {
                self.signups.delete_activity(&activity_id)?;
                (
                    ResponsePayload::ActivityDeleted,
                    vec![EventPayload::ActivityChanged { activity_id }],
                )
            }

            // Signups
            Command::CreateSignup {
                activity_id,
                candidate,
            } => match self.signups.create_signup(&activity_id, candidate)? {
                SignupDecision::Created(signup) => {
                    let event = EventPayload::SignupCreated {
                        signup_id: signup.id,
                        activity_id: signup.activity_id.clone(),
                    };
                    (ResponsePayload::SignupCreated(signup), vec![event])
                }
                SignupDecision::Rejected { reason } => {
                    (ResponsePayload::SignupRejected { reason }, vec![])
                }
            },

            Command::SetSignupStatus { signup_id, status } => {
                let signup = self.signups.set_status(&signup_id, status)?;
                let events = vec![
                    EventPayload::SignupStatusChanged {
                        signup_id: signup.id,
                        activity_id: signup.activity_id.clone(),
                        status: signup.status,
                    },
                    EventPayload::ActivityChanged {
                        activity_id: signup.activity_id.clone(),
                    },
                ];
                (ResponsePayload::Signup(signup), events)
            }

            Command::DeleteSignup { signup_id } => {
                self.signups.delete_signup(&signup_id)?;
                (
                    ResponsePayload::SignupDeleted,
                    vec![EventPayload::SignupDeleted { signup_id }],
                )
            }

            Command::ListSignups { activity_id } => (
                ResponsePayload::Signups {
                    signups: self.signups.list_signups(activity_id.as_ref())?,
                },
                vec![],
            ),

            Command::ExportSignups { activity_id } => (
                ResponsePayload::Export {
                    rows: self.signups.export_signups(activity_id.as_ref())?,
                },
                vec![],
            ),

            // Attendance configuration
            Command::GetAttendanceStatus => {
                let status = self.attendance.debug_status()?;
                (
                    ResponsePayload::AttendanceStatus {
                        config: status.config,
                        eligibility: status.eligibility,
                        now: status.now,
                    },
                    vec![],
                )
            }

            Command::UpdateAttendanceConfig { config } => {
                let config = self.attendance.update_config(config)?;
                (
                    ResponsePayload::AttendanceConfig(config.clone()),
                    vec![EventPayload::AttendanceConfigChanged(config)],
                )
            }

            Command::ToggleDebug => {
                let enabled = self.attendance.toggle_debug()?;
                let config = self.attendance.get_config()?;
                (
                    ResponsePayload::DebugMode { enabled },
                    vec![EventPayload::AttendanceConfigChanged(config)],
                )
            }

            // Attendance marking
            Command::CheckIn { student_id } => match self.attendance.check_in(&student_id)? {
                CheckInOutcome::CheckedIn(record) => (
                    ResponsePayload::CheckedIn(record.clone()),
                    vec![EventPayload::AttendanceChanged(record)],
                ),
                CheckInOutcome::Refused(eligibility) => {
                    (ResponsePayload::CheckInRefused { eligibility }, vec![])
                }
            },

            Command::SetAttendance {
                student_id,
                week_number,
                session,
                status,
                check_in_time,
            } => {
                let key = AttendanceKey::new(student_id, week_number, session);
                let record = self.attendance.set_status(key, status, check_in_time)?;
                (
                    ResponsePayload::Attendance(record.clone()),
                    vec![EventPayload::AttendanceChanged(record)],
                )
            }

            Command::MarkAllPresent {
                week_number,
                session,
            } => {
                let updated = self.attendance.bulk_mark_all_present(week_number, session)?;
                (
                    ResponsePayload::BulkUpdated { updated },
                    vec![EventPayload::SessionAttendanceChanged {
                        week_number,
                        session,
                        updated,
                    }],
                )
            }

            Command::MarkPendingAbsent {
                week_number,
                session,
            } => {
                let updated = self
                    .attendance
                    .bulk_mark_pending_as_absent(week_number, session)?;
                (
                    ResponsePayload::BulkUpdated { updated },
                    vec![EventPayload::SessionAttendanceChanged {
                        week_number,
                        session,
                        updated,
                    }],
                )
            }

            Command::GetSessionAttendance {
                week_number,
                session,
            } => (
                ResponsePayload::SessionAttendance(
                    self.attendance.session_view(week_number, session)?,
                ),
                vec![],
            ),

            Command::GetWeekSummary { week_number } => (
                ResponsePayload::WeekSummary {
                    week_number,
                    stats: self.attendance.week_summary(week_number)?,
                },
                vec![],
            ),

            Command::ReplaceRoster { members } => (
                ResponsePayload::RosterReplaced {
                    members: self.attendance.replace_roster(members)?,
                },
                vec![],
            ),

            // Service
            Command::SubscribeEvents => (
                ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
                vec![],
            ),

            Command::UnsubscribeEvents => (ResponsePayload::Unsubscribed, vec![]),

            Command::GetHealth => {
                let attendance_configured = matches!(self.store.load_attendance_config(), Ok(Some(_)));
                (
                    ResponsePayload::Health(HealthStatus {
                        live: true,
                        store_ok: self.store.is_healthy(),
                        attendance_configured,
                    }),
                    vec![],
                )
            }

            Command::Ping => (ResponsePayload::Pong, vec![]),
        };

        Ok(result)
    }
}

/// Map an engine error onto the protocol's error codes
fn error_info(err: &MusterError) -> ErrorInfo {
    let code = match err {
        MusterError::ValidationError(_) => ErrorCode::ValidationFailed,
        MusterError::NotFound(_) => ErrorCode::NotFound,
        MusterError::AlreadySignedUp => ErrorCode::AlreadySignedUp,
        MusterError::CapacityFull => ErrorCode::CapacityFull,
        MusterError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
        MusterError::Conflict(_) => ErrorCode::Conflict,
        MusterError::ConfigError(_) => ErrorCode::NotConfigured,
        MusterError::StoreError(_) | MusterError::Internal(_) => ErrorCode::InternalError,
    };
    ErrorInfo::new(code, err.to_string())
}

/// Main service state
struct Service {
    engine: Arc<Engine>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
}

impl Service {
    async fn new(args: &Args, settings: Settings) -> Result<Self> {
        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| settings.daemon.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.daemon.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("musterd.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        seed_attendance_config(store.as_ref(), &settings)?;

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let engine = Arc::new(Engine::new(store.clone(), Arc::new(SystemClock)));

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            engine,
            ipc: Arc::new(ipc),
            store,
        })
    }

    async fn run(self) -> Result<()> {
        let ipc_ref = self.ipc.clone();
        let mut ipc_messages = ipc_ref
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc_ref.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&self.engine, &ipc_ref, msg).await;
                }
            }
        }

        info!("Shutting down musterd");

        ipc_ref.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }

    async fn handle_ipc_message(engine: &Arc<Engine>, ipc: &Arc<IpcServer>, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                debug!(
                    client_id = %client_id,
                    request_id = request.request_id,
                    command = ?request.command,
                    "Request received"
                );

                let (response, events) =
                    engine.handle_command(&client_id, request.request_id, request.command);

                if let Err(e) = ipc.send_response(&client_id, response).await {
                    debug!(client_id = %client_id, error = %e, "Failed to send response");
                }

                for event in events {
                    ipc.broadcast_event(event);
                }
            }

            ServerMessage::ClientConnected { client_id } => {
                debug!(client_id = %client_id, "Client registered");
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
            }
        }
    }
}

/// Persist the configured schedule if the store has none yet. A stored
/// schedule always wins over the file.
fn seed_attendance_config(store: &dyn Store, settings: &Settings) -> Result<()> {
    if store.load_attendance_config()?.is_some() {
        if settings.attendance.is_some() {
            info!("Attendance schedule already stored; ignoring [attendance] from config");
        }
        return Ok(());
    }

    match &settings.attendance {
        Some(config) => {
            store.save_attendance_config(config)?;
            info!(
                day_of_week = config.day_of_week,
                week_start = %config.week_start_date,
                "Attendance schedule seeded from config"
            );
        }
        None => warn!("No attendance schedule configured; check-in is unavailable until one is set"),
    }

    Ok(())
}

fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    load_config(path).with_context(|| format!("Failed to load config from {:?}", path))
}

/// Human-readable logs on stdout, JSON lines in `<log_dir>/musterd.log`
fn init_logging(level: &str, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", log_dir))?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("musterd.log"))
        .with_context(|| format!("Failed to open log file in {:?}", log_dir))?;

    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_filter(filter()))
        .with(
            fmt::layer()
                .json()
                .with_writer(Mutex::new(log_file))
                .with_filter(filter()),
        )
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = load_settings(&args.config)?;
    init_logging(&args.log_level, &settings.daemon.log_dir)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %args.config.display(),
        "musterd starting"
    );

    let service = Service::new(&args, settings).await?;
    service.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, NaiveDate, TimeZone};
    use muster_api::{
        Activity, AttendanceConfig, Candidate, RejectionReason, ResponseResult, SessionSlot,
        SessionSpec, SignupStatus,
    };
    use muster_util::{FixedClock, WallClock};

    fn engine() -> Engine {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let clock = Arc::new(FixedClock::new(
            Local.with_ymd_and_hms(2026, 1, 9, 15, 21, 0).unwrap(),
        ));
        Engine::new(store, clock)
    }

    fn run(engine: &Engine, command: Command) -> (ResponseResult, Vec<Event>) {
        let (response, events) = engine.handle_command(&ClientId::new(), 1, command);
        (response.result, events)
    }

    fn ok(engine: &Engine, command: Command) -> ResponsePayload {
        match run(engine, command).0 {
            ResponseResult::Ok(payload) => payload,
            ResponseResult::Err(e) => panic!("unexpected error {:?}", e),
        }
    }

    fn err_code(engine: &Engine, command: Command) -> ErrorCode {
        match run(engine, command).0 {
            ResponseResult::Err(e) => e.code,
            ResponseResult::Ok(payload) => panic!("unexpected success {:?}", payload),
        }
    }

    fn put_activity(engine: &Engine, max: u32) {
        let mut activity = Activity::new("robotics", "Robotics Workshop");
        activity.max_participants = max;
        ok(engine, Command::PutActivity { activity });
    }

    fn sign_up(engine: &Engine, email: &str) -> ResponsePayload {
        ok(
            engine,
            Command::CreateSignup {
                activity_id: "robotics".into(),
                candidate: Candidate {
                    student_email: email.into(),
                    student_name: "Lin Wei".into(),
                    student_id: "2024001".into(),
                    grade: None,
                    class_name: String::new(),
                },
            },
        )
    }

    #[test]
    fn test_signup_flow_over_commands() {
        let engine = engine();
        put_activity(&engine, 1);

        let ResponsePayload::SignupCreated(first) = sign_up(&engine, "a@school.edu") else {
            panic!("expected signup");
        };
        let ResponsePayload::SignupCreated(second) = sign_up(&engine, "b@school.edu") else {
            panic!("expected signup");
        };

        let (result, events) = run(
            &engine,
            Command::SetSignupStatus {
                signup_id: first.id,
                status: SignupStatus::Confirmed,
            },
        );
        assert!(matches!(result, ResponseResult::Ok(ResponsePayload::Signup(_))));
        assert!(events.iter().any(|e| matches!(
            e.payload,
            EventPayload::SignupStatusChanged {
                status: SignupStatus::Confirmed,
                ..
            }
        )));

        assert_eq!(
            err_code(
                &engine,
                Command::SetSignupStatus {
                    signup_id: second.id,
                    status: SignupStatus::Confirmed,
                }
            ),
            ErrorCode::CapacityFull
        );
        assert_eq!(
            err_code(&engine, Command::DeleteSignup { signup_id: first.id }),
            ErrorCode::InvalidTransition
        );
    }

    #[test]
    fn test_duplicate_is_a_rejection_payload() {
        let engine = engine();
        put_activity(&engine, 0);
        sign_up(&engine, "a@school.edu");

        assert!(matches!(
            sign_up(&engine, "a@school.edu"),
            ResponsePayload::SignupRejected {
                reason: RejectionReason::AlreadySignedUp
            }
        ));
    }

    #[test]
    fn test_error_codes() {
        let engine = engine();
        assert_eq!(
            err_code(&engine, Command::GetActivity { activity_id: "nope".into() }),
            ErrorCode::NotFound
        );
        assert_eq!(
            err_code(&engine, Command::CheckIn { student_id: "s1".into() }),
            ErrorCode::NotConfigured
        );
        assert_eq!(
            err_code(&engine, Command::GetWeekSummary { week_number: 0 }),
            ErrorCode::ValidationFailed
        );
    }

    #[test]
    fn test_check_in_over_commands() {
        let engine = engine();
        let config = AttendanceConfig {
            day_of_week: 5,
            session1: SessionSpec {
                start: WallClock::new(15, 20).unwrap(),
                duration_minutes: 5,
            },
            session2: SessionSpec {
                start: WallClock::new(16, 50).unwrap(),
                duration_minutes: 5,
            },
            week_start_date: NaiveDate::from_ymd_opt(2026, 1, 9).unwrap(),
            debug_mode: false,
        };
        ok(&engine, Command::UpdateAttendanceConfig { config });

        let (result, events) = run(&engine, Command::CheckIn { student_id: "s1".into() });
        let ResponseResult::Ok(ResponsePayload::CheckedIn(record)) = result else {
            panic!("expected check-in");
        };
        assert_eq!(record.key.session, SessionSlot::First);
        assert_eq!(events.len(), 1);

        let ResponsePayload::Health(health) = ok(&engine, Command::GetHealth) else {
            panic!("expected health");
        };
        assert!(health.store_ok);
        assert!(health.attendance_configured);
    }

    #[test]
    fn test_seed_keeps_stored_schedule() {
        let store = SqliteStore::in_memory().unwrap();
        let settings = muster_config::parse_config(
            r#"
            config_version = 1

            [attendance]
            day_of_week = "fri"
            week_start_date = "2026-01-09"
            session1 = { start = "15:20", duration_minutes = 5 }
            session2 = { start = "16:50", duration_minutes = 5 }
            "#,
        )
        .unwrap();

        seed_attendance_config(&store, &settings).unwrap();
        let mut stored = store.load_attendance_config().unwrap().unwrap();
        assert_eq!(stored.day_of_week, 5);

        stored.debug_mode = true;
        store.save_attendance_config(&stored).unwrap();
        seed_attendance_config(&store, &settings).unwrap();
        assert!(store.load_attendance_config().unwrap().unwrap().debug_mode);
    }
}
