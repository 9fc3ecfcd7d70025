use anyhow::Result;
use clap::{Parser, Subcommand};
use rollcall_engine::Config;
use rollcall_store::Store;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance roster and session management")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new student
    AddStudent {
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Roll number (unique)
        #[arg(short, long)]
        roll: String,
    },
    /// List registered students and their enrollment state
    Students,
    /// Remove a student (and their face data)
    RemoveStudent {
        /// Student ID to remove
        id: i64,
    },
    /// Drop a student's enrolled face embedding
    RemoveFace {
        /// Student ID whose embedding to drop
        id: i64,
    },
    /// Start a recognition session
    StartSession {
        /// Subject/course label (e.g. "CS101")
        subject: String,
    },
    /// End a recognition session
    EndSession {
        /// Session ID to end
        id: i64,
    },
    /// List recognition sessions
    Sessions,
    /// Show attendance marked for a session
    Roster {
        /// Session ID
        id: i64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Store::open(&config.db_path)?;

    match cli.command {
        Commands::AddStudent { name, roll } => {
            let id = store.add_student(&name, &roll)?;
            println!("Added student {id}: {name} ({roll})");
        }
        Commands::Students => {
            let enrolled: std::collections::HashSet<i64> = store
                .enrolled_faces()?
                .into_iter()
                .map(|e| e.student_id)
                .collect();
            for s in store.list_students()? {
                let state = if enrolled.contains(&s.id) {
                    "enrolled"
                } else {
                    "no face data"
                };
                println!("{:>5}  {:<24} {:<12} {state}", s.id, s.name, s.roll_no);
            }
        }
        Commands::RemoveStudent { id } => {
            if store.remove_student(id)? {
                println!("Removed student {id}");
            } else {
                println!("No student with id {id}");
            }
        }
        Commands::RemoveFace { id } => {
            if store.remove_face(id)? {
                println!("Dropped face data for student {id}");
            } else {
                println!("Student {id} has no face data");
            }
        }
        Commands::StartSession { subject } => {
            let id = store.create_session(&subject)?;
            println!("Session {id} started for {subject}");
        }
        Commands::EndSession { id } => {
            if store.end_session(id)? {
                println!("Session {id} ended");
            } else {
                println!("Session {id} was not active");
            }
        }
        Commands::Sessions => {
            for s in store.list_sessions()? {
                let state = if s.is_active { "active" } else { "ended" };
                println!(
                    "{:>5}  {:<12} {:<8} started {}",
                    s.id,
                    s.subject,
                    state,
                    s.started_at.to_rfc3339()
                );
            }
        }
        Commands::Roster { id } => {
            let students: std::collections::HashMap<i64, String> = store
                .list_students()?
                .into_iter()
                .map(|s| (s.id, s.name))
                .collect();
            let records = store.attendance_for_session(id)?;
            if records.is_empty() {
                println!("No attendance recorded for session {id}");
            }
            for r in records {
                let name = students
                    .get(&r.student_id)
                    .map(String::as_str)
                    .unwrap_or("<removed>");
                let confidence = r
                    .confidence
                    .map(|c| format!("{c:.1}%"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:>5}  {:<24} {:<8} {:<7} {}",
                    r.student_id,
                    name,
                    r.status,
                    confidence,
                    r.marked_at.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}
