use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tutorlink::commands;
use tutorlink::models::User;
use tutorlink::notify::LogNotifier;
use tutorlink::{Config, Database};

#[derive(Parser)]
#[command(name = "tutorlink")]
#[command(about = "A tutoring scheduler: publish availability, book sessions, match tutors")]
#[command(version)]
struct Cli {
    /// External identity of the acting user (or set TUTORLINK_USER)
    #[arg(long, global = true, env = "TUTORLINK_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize tutorlink in the current directory
    Init,

    /// User management
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Availability window management (tutors)
    Availability {
        #[command(subcommand)]
        action: AvailabilityCommands,
    },

    /// Session management
    Session {
        #[command(subcommand)]
        action: SessionCommands,
    },

    /// Book a slice of an availability window (students)
    Book {
        /// Availability ID
        availability: i64,
        /// Slice start (e.g. 2025-01-09T10:00)
        start: String,
        /// Slice end
        end: String,
        /// Course or subject
        #[arg(short, long)]
        course: Option<String>,
    },

    /// Claim an open session slot (students)
    Claim {
        /// Session ID
        session: i64,
        /// Course or subject
        #[arg(short, long)]
        course: Option<String>,
    },

    /// Session notes (tutors)
    Note {
        #[command(subcommand)]
        action: NoteCommands,
    },

    /// Session feedback (students)
    Feedback {
        #[command(subcommand)]
        action: FeedbackCommands,
    },

    /// Rank tutors for the acting student
    Recommend {
        /// Preferred day (0 = Monday .. 6 = Sunday)
        #[arg(short, long)]
        day: Option<u8>,
        /// Preferred time of day (HH:MM)
        #[arg(short, long)]
        time: Option<String>,
        /// Preferred medium (online, in-person)
        #[arg(short, long)]
        medium: Option<String>,
        /// Maximum number of tutors to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register or refresh a user from a verified identity
    Register {
        /// External identity (e.g. from the identity provider)
        external_id: String,
        /// Display name
        name: String,
        /// Email address
        email: String,
        /// Role (student, tutor, professor)
        #[arg(short, long)]
        role: Option<String>,
    },
    /// List users
    List {
        /// Filter by role
        #[arg(short, long)]
        role: Option<String>,
    },
}

#[derive(Subcommand)]
enum AvailabilityCommands {
    /// Publish an availability window
    Add {
        /// Day of week (0 = Monday .. 6 = Sunday)
        day: u8,
        /// Window start (e.g. 2025-01-09T09:00)
        start: String,
        /// Window end
        end: String,
        /// Medium (online, in-person)
        #[arg(short, long, default_value = "online")]
        medium: String,
        /// Publish a single dated window instead of a weekly one
        #[arg(long)]
        one_off: bool,
    },
    /// List availability windows
    List {
        /// Filter by tutor user ID
        #[arg(short, long)]
        tutor: Option<i64>,
    },
    /// Edit a window; open sessions from the old window are retracted
    Update {
        /// Availability ID
        id: i64,
        /// New day of week
        #[arg(long)]
        day: Option<u8>,
        /// New window start
        #[arg(long)]
        start: Option<String>,
        /// New window end
        #[arg(long)]
        end: Option<String>,
        /// New medium
        #[arg(long)]
        medium: Option<String>,
        /// Switch between weekly and one-off
        #[arg(long)]
        recurring: Option<bool>,
    },
    /// Delete a window and retract its open sessions
    Delete {
        /// Availability ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Publish an open one-off slot (tutors)
    Create {
        /// Slot start
        start: String,
        /// Slot end
        end: String,
        /// Medium (online, in-person)
        #[arg(short, long, default_value = "online")]
        medium: String,
        /// Course or subject
        #[arg(short, long)]
        course: Option<String>,
    },
    /// List sessions
    List {
        /// Filter by tutor user ID
        #[arg(short, long)]
        tutor: Option<i64>,
        /// Filter by student user ID
        #[arg(short, long)]
        student: Option<i64>,
        /// Filter by status (available, booked, completed, canceled)
        #[arg(long)]
        status: Option<String>,
        /// Only sessions starting from now
        #[arg(short, long)]
        upcoming: bool,
    },
    /// Show a session with its note and feedback
    Show {
        /// Session ID
        id: i64,
    },
    /// Edit a session (the tutor); moving the times re-checks overlaps
    Update {
        /// Session ID
        id: i64,
        /// Assign a student user ID
        #[arg(long)]
        student: Option<i64>,
        /// New course or subject
        #[arg(long)]
        course: Option<String>,
        /// New medium
        #[arg(long)]
        medium: Option<String>,
        /// New start
        #[arg(long)]
        start: Option<String>,
        /// New end
        #[arg(long)]
        end: Option<String>,
        /// New status (available, booked, completed, canceled)
        #[arg(long)]
        status: Option<String>,
    },
    /// Cancel a session (the tutor, or the booked student)
    Cancel {
        /// Session ID
        id: i64,
    },
    /// Mark a booked session completed (the tutor)
    Complete {
        /// Session ID
        id: i64,
    },
    /// Delete a session (the tutor)
    Delete {
        /// Session ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Record the note for a session
    Add {
        /// Session ID
        session: i64,
        /// Attendance (present, absent, late)
        #[arg(short, long)]
        attendance: Option<String>,
        /// Note text
        #[arg(short, long)]
        text: Option<String>,
    },
    /// Amend the note for a session
    Update {
        /// Session ID
        session: i64,
        /// Attendance (present, absent, late)
        #[arg(short, long)]
        attendance: Option<String>,
        /// Note text
        #[arg(short, long)]
        text: Option<String>,
    },
    /// Show the note for a session
    Show {
        /// Session ID
        session: i64,
    },
}

#[derive(Subcommand)]
enum FeedbackCommands {
    /// Rate a session (replaces an earlier rating)
    Submit {
        /// Session ID
        session: i64,
        /// Rating, 1 through 5
        rating: i64,
        /// Optional comment
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Show the feedback for a session
    Show {
        /// Session ID
        session: i64,
    },
}

fn find_tutorlink_dir() -> Result<PathBuf> {
    let mut current = env::current_dir()?;

    loop {
        let candidate = current.join(commands::init::DATA_DIR);
        if candidate.exists() && candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            bail!("Not a tutorlink repository (or any parent). Run 'tutorlink init' first.");
        }
    }
}

fn get_db() -> Result<Database> {
    let dir = find_tutorlink_dir()?;
    let db_path = dir.join(commands::init::DB_FILE);
    Database::open(&db_path).context("Failed to open database")
}

fn get_config() -> Result<Config> {
    let dir = find_tutorlink_dir()?;
    Ok(Config::load(&dir.join(commands::init::CONFIG_FILE))?)
}

fn get_caller(db: &Database, user: Option<&str>) -> Result<User> {
    let external_id = match user {
        Some(id) => id.to_string(),
        None => bail!("No acting user. Pass --user or set TUTORLINK_USER."),
    };
    match db.get_user_by_external_id(&external_id)? {
        Some(user) => Ok(user),
        None => bail!(
            "Unknown user '{}'. Register with 'tutorlink user register' first.",
            external_id
        ),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let cwd = env::current_dir()?;
            commands::init::run(&cwd)
        }

        Commands::User { action } => {
            let db = get_db()?;
            match action {
                UserCommands::Register {
                    external_id,
                    name,
                    email,
                    role,
                } => commands::user::register(&db, &external_id, &name, &email, role.as_deref()),
                UserCommands::List { role } => commands::user::list(&db, role.as_deref()),
            }
        }

        Commands::Availability { action } => {
            let mut db = get_db()?;
            let tz = get_config()?.tz()?;
            match action {
                AvailabilityCommands::Add {
                    day,
                    start,
                    end,
                    medium,
                    one_off,
                } => {
                    let caller = get_caller(&db, cli.user.as_deref())?;
                    commands::availability::add(
                        &db, &caller, day, &start, &end, &medium, one_off, tz,
                    )
                }
                AvailabilityCommands::List { tutor } => {
                    commands::availability::list(&db, tutor, tz)
                }
                AvailabilityCommands::Update {
                    id,
                    day,
                    start,
                    end,
                    medium,
                    recurring,
                } => {
                    let caller = get_caller(&db, cli.user.as_deref())?;
                    commands::availability::update(
                        &mut db,
                        &caller,
                        id,
                        day,
                        start.as_deref(),
                        end.as_deref(),
                        medium.as_deref(),
                        recurring,
                        tz,
                    )
                }
                AvailabilityCommands::Delete { id } => {
                    let caller = get_caller(&db, cli.user.as_deref())?;
                    commands::availability::delete(&mut db, &caller, id)
                }
            }
        }

        Commands::Session { action } => {
            let mut db = get_db()?;
            let tz = get_config()?.tz()?;
            match action {
                SessionCommands::Create {
                    start,
                    end,
                    medium,
                    course,
                } => {
                    let caller = get_caller(&db, cli.user.as_deref())?;
                    commands::session::create(
                        &mut db,
                        &caller,
                        &start,
                        &end,
                        &medium,
                        course.as_deref(),
                        tz,
                    )
                }
                SessionCommands::List {
                    tutor,
                    student,
                    status,
                    upcoming,
                } => commands::session::list(&db, tutor, student, status.as_deref(), upcoming, tz),
                SessionCommands::Show { id } => commands::session::show(&db, id, tz),
                SessionCommands::Update {
                    id,
                    student,
                    course,
                    medium,
                    start,
                    end,
                    status,
                } => {
                    let caller = get_caller(&db, cli.user.as_deref())?;
                    commands::session::update(
                        &mut db,
                        &caller,
                        id,
                        student,
                        course.as_deref(),
                        medium.as_deref(),
                        start.as_deref(),
                        end.as_deref(),
                        status.as_deref(),
                        tz,
                    )
                }
                SessionCommands::Cancel { id } => {
                    let caller = get_caller(&db, cli.user.as_deref())?;
                    commands::session::cancel(&db, &caller, id)
                }
                SessionCommands::Complete { id } => {
                    let caller = get_caller(&db, cli.user.as_deref())?;
                    commands::session::complete(&db, &caller, id)
                }
                SessionCommands::Delete { id } => {
                    let caller = get_caller(&db, cli.user.as_deref())?;
                    commands::session::delete(&db, &caller, id)
                }
            }
        }

        Commands::Book {
            availability,
            start,
            end,
            course,
        } => {
            let mut db = get_db()?;
            let tz = get_config()?.tz()?;
            let caller = get_caller(&db, cli.user.as_deref())?;
            commands::book::run(
                &mut db,
                &caller,
                availability,
                &start,
                &end,
                course.as_deref(),
                &LogNotifier,
                tz,
            )
        }

        Commands::Claim { session, course } => {
            let mut db = get_db()?;
            let tz = get_config()?.tz()?;
            let caller = get_caller(&db, cli.user.as_deref())?;
            commands::book::claim(&mut db, &caller, session, course.as_deref(), &LogNotifier, tz)
        }

        Commands::Note { action } => {
            let db = get_db()?;
            match action {
                NoteCommands::Add {
                    session,
                    attendance,
                    text,
                } => {
                    let caller = get_caller(&db, cli.user.as_deref())?;
                    commands::notes::add(&db, &caller, session, attendance.as_deref(), text.as_deref())
                }
                NoteCommands::Update {
                    session,
                    attendance,
                    text,
                } => {
                    let caller = get_caller(&db, cli.user.as_deref())?;
                    commands::notes::update(
                        &db,
                        &caller,
                        session,
                        attendance.as_deref(),
                        text.as_deref(),
                    )
                }
                NoteCommands::Show { session } => commands::notes::show(&db, session),
            }
        }

        Commands::Feedback { action } => {
            let db = get_db()?;
            match action {
                FeedbackCommands::Submit {
                    session,
                    rating,
                    comment,
                } => {
                    let caller = get_caller(&db, cli.user.as_deref())?;
                    commands::feedback::submit(&db, &caller, session, rating, comment.as_deref())
                }
                FeedbackCommands::Show { session } => commands::feedback::show(&db, session),
            }
        }

        Commands::Recommend {
            day,
            time,
            medium,
            limit,
            json,
        } => {
            let db = get_db()?;
            let config = get_config()?;
            let caller = get_caller(&db, cli.user.as_deref())?;
            commands::recommend::run(
                &db,
                &caller,
                day,
                time.as_deref(),
                medium.as_deref(),
                limit,
                &config.scoring,
                json,
            )
        }
    }
}
