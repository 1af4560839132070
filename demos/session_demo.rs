//! Session walkthrough against a running job board backend
//!
//! Usage:
//!   JOBBOARD_API_BASE_URL=http://localhost:4000/api \
//!   JOBBOARD_TOKEN=<jwt> JOBBOARD_CREDENTIALS=/tmp/jobboard.json \
//!   cargo run --example session_demo

use jobboard_client::format::{format_job_type, format_salary, time_ago};
use jobboard_client::models::JobList;
use jobboard_client::{
    ApiClient, ClientConfig, ClientParts, CredentialStore, FileStorage, NoopNavigator,
    RequestOptions, Session,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = ClientConfig::from_env()?;
    let credentials_path = std::env::var("JOBBOARD_CREDENTIALS")
        .unwrap_or_else(|_| "jobboard-credentials.json".to_string());

    println!("=== Job Board Client Example ===");
    println!("API: {}", config.base_url);
    println!("Credentials file: {}", credentials_path);
    println!();

    let storage = Arc::new(FileStorage::open(&credentials_path)?);
    let credentials = CredentialStore::new(storage);
    if let Ok(token) = std::env::var("JOBBOARD_TOKEN") {
        credentials.update_token(&token)?;
    }

    let navigator = Arc::new(NoopNavigator);
    let parts = ClientParts {
        credentials,
        navigator: navigator.clone(),
        ..ClientParts::default()
    };
    let client = ApiClient::with_parts(config, parts)?;
    let session = Session::new(Arc::clone(&client), navigator);

    // Restore the stored session (refreshes transparently on 401)
    let landing = session.bootstrap().await;
    println!("✓ Landing route: {}", landing);
    match client.credentials().username() {
        Some(username) => println!("  Signed in as {}", username),
        None => println!("  Browsing anonymously"),
    }
    println!();

    let jobs = client
        .get::<JobList>("/public/jobs", RequestOptions::new())
        .await;
    match jobs {
        Ok(response) => {
            println!("Open positions ({}):", response.data.jobs.len());
            let now = chrono::Utc::now();
            for job in response.data.jobs.iter().filter(|job| job.open) {
                println!(
                    "  - {} at {} [{}] {}-{} ({})",
                    job.name,
                    job.company_name,
                    format_job_type(&job.job_type),
                    format_salary(job.min_salary),
                    format_salary(job.max_salary),
                    time_ago(&job.created_at, now),
                );
            }
        }
        Err(e) => {
            client.show_error(&e, Some("Could not load jobs"));
        }
    }
    println!();

    println!("In-flight requests: {}", client.loading().request_count());
    println!("Refreshes performed: {}", client.refresher().refresh_count());

    if client.credentials().is_authenticated() {
        let route = session.logout().await;
        println!("✓ Logged out, back to {}", route);
    }

    Ok(())
}
