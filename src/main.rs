use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use prs_core::{CoreConfig, Database, PatientService};
use prs_files::FilesystemPhotoStore;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the patient registry service
///
/// Loads configuration, migrates the database and serves the REST API with
/// OpenAPI/Swagger documentation until Ctrl-C.
///
/// # Environment Variables
/// - `PRS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `DATABASE_URL`: SQLite database URL (default: "sqlite://patient_data/patients.db")
/// - `PATIENT_PHOTO_DIR`: Directory for stored photos (default: "patient_data/photos")
/// - `PATIENT_PHOTO_URL`: Public URL prefix for photos (default: "/storage/photos")
///
/// # Errors
/// Returns an error if configuration is invalid, the database cannot be opened or
/// migrated, the photo directory cannot be created, or the server fails to bind.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prs_run=info".parse()?)
                .add_directive("prs_core=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(CoreConfig::from_env_values(
        std::env::var("DATABASE_URL").ok(),
        std::env::var("PATIENT_PHOTO_DIR").ok(),
        std::env::var("PATIENT_PHOTO_URL").ok(),
    )?);
    let rest_addr: SocketAddr = std::env::var("PRS_REST_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".into())
        .parse()
        .context("PRS_REST_ADDR is not a socket address")?;

    let db = Database::connect(cfg.database_url())
        .await
        .context("could not open the database")?;
    db.migrate().await.context("could not apply migrations")?;
    tracing::info!("database ready at {}", cfg.database_url());

    let photos = FilesystemPhotoStore::new(cfg.photo_dir(), cfg.photo_base_url())
        .context("could not open the photo directory")?;
    let photo_root = photos.root_directory().to_path_buf();

    let patients = PatientService::new(db, Arc::new(photos));
    let mut app = api_rest::router(patients);
    if let Some(mount_path) = cfg.photo_mount_path() {
        app = api_rest::serve_photos(app, mount_path, &photo_root);
    }

    tracing::info!("++ Starting patient registry REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}
