use clap::{Parser, Subcommand};
use prs_core::{CoreConfig, Database, PatientService};
use prs_files::FilesystemPhotoStore;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "prs")]
#[command(about = "Patient registry CLI")]
struct Cli {
    /// Database URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// List patients, ten per page
    List {
        /// Substring of the full name, CPF or CNS
        #[arg(long)]
        search: Option<String>,
        /// Page number (starting at 1)
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show one patient as JSON
    Show {
        /// Patient id
        id: i64,
    },
    /// Delete a patient (its address and photo are kept)
    Delete {
        /// Patient id
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'prs --help' for commands");
        return Ok(());
    };

    let cfg = CoreConfig::from_env_values(
        cli.database_url.or_else(|| std::env::var("DATABASE_URL").ok()),
        std::env::var("PATIENT_PHOTO_DIR").ok(),
        std::env::var("PATIENT_PHOTO_URL").ok(),
    )?;
    let db = Database::connect(cfg.database_url()).await?;
    let photos = FilesystemPhotoStore::new(cfg.photo_dir(), cfg.photo_base_url())?;
    let service = PatientService::new(db, Arc::new(photos));

    match command {
        Commands::Migrate => {
            service.database().migrate().await?;
            println!("Migrations applied to {}", cfg.database_url());
        }
        Commands::List { search, page } => {
            let page = service.search(search.as_deref(), page).await?;
            if page.items.is_empty() {
                println!("No patients found.");
            } else {
                for patient in &page.items {
                    println!(
                        "ID: {}, Name: {}, CPF: {}, CNS: {}, Postal code: {}",
                        patient.id,
                        patient.full_name,
                        patient.national_id_cpf,
                        patient.national_health_card_cns,
                        patient.address.postal_code
                    );
                }
            }
            println!(
                "Page {} of {} ({} patients)",
                page.page, page.last_page, page.total
            );
        }
        Commands::Show { id } => match service.show(id).await {
            Ok(patient) => println!("{}", serde_json::to_string_pretty(&patient)?),
            Err(e) => eprintln!("Error showing patient: {}", e),
        },
        Commands::Delete { id } => match service.delete(id).await {
            Ok(()) => println!("Deleted patient {}", id),
            Err(e) => eprintln!("Error deleting patient: {}", e),
        },
    }

    Ok(())
}
