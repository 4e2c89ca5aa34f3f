use anyhow::{Context, Result};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.facelink.Recognition1",
    default_service = "org.facelink.Recognition1",
    default_path = "/org/facelink/Recognition1"
)]
trait Facelink {
    async fn recognize(&self, image: &str) -> zbus::Result<String>;
    async fn add_person(&self, name: &str, relationship: &str, reminder: &str)
        -> zbus::Result<String>;
    async fn register_photo(&self, person_id: &str, image: &str) -> zbus::Result<String>;
    async fn list_people(&self) -> zbus::Result<String>;
    async fn remove_person(&self, person_id: &str) -> zbus::Result<bool>;
    async fn timeline(&self, limit: u32) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facelink", about = "FaceLink visitor recognition CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize a visitor from a photo
    Recognize {
        /// Path to a JPEG or PNG photo
        image: PathBuf,
    },
    /// Add a known person
    AddPerson {
        /// Person's name
        name: String,
        /// Relationship to the patient (e.g., "daughter", "neighbor")
        relationship: String,
        /// Reminder text shown alongside recognitions
        #[arg(short, long, default_value = "")]
        reminder: String,
    },
    /// Register (or replace) a person's reference photo
    RegisterPhoto {
        /// Person ID
        id: String,
        /// Path to a JPEG or PNG photo
        image: PathBuf,
    },
    /// List known people
    List,
    /// Remove a person
    Remove {
        /// Person ID to remove
        id: String,
    },
    /// Show recent timeline events
    Timeline {
        /// Maximum number of events
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Show daemon status
    Status,
}

/// Read an image file into the data-URL form the daemon accepts.
fn image_payload(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("png") | Some("PNG") => "png",
        _ => "jpeg",
    };
    Ok(format!(
        "data:image/{format};base64,{}",
        BASE64_STANDARD.encode(bytes)
    ))
}

fn print_json(raw: &str) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default()),
        Err(_) => println!("{raw}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus — is facelinkd running?")?;
    let proxy = FacelinkProxy::new(&conn).await?;

    match cli.command {
        Commands::Recognize { image } => {
            let payload = image_payload(&image)?;
            print_json(&proxy.recognize(&payload).await?);
        }
        Commands::AddPerson {
            name,
            relationship,
            reminder,
        } => {
            print_json(&proxy.add_person(&name, &relationship, &reminder).await?);
        }
        Commands::RegisterPhoto { id, image } => {
            let payload = image_payload(&image)?;
            print_json(&proxy.register_photo(&id, &payload).await?);
        }
        Commands::List => {
            print_json(&proxy.list_people().await?);
        }
        Commands::Remove { id } => {
            if proxy.remove_person(&id).await? {
                println!("Removed {id}");
            } else {
                println!("No person with id {id}");
            }
        }
        Commands::Timeline { limit } => {
            print_json(&proxy.timeline(limit).await?);
        }
        Commands::Status => {
            print_json(&proxy.status().await?);
        }
    }

    Ok(())
}
