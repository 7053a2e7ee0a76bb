use anyhow::Result;

use crate::backend::{BackendGateway, CloudBackend, LocalBackend};
use crate::config::{BackendKind, Config};

/// Print a status table for both backends: configuration, reachability,
/// and the number of models each endpoint reports.
pub async fn list_backends(config: &Config) -> Result<()> {
    println!("{:<10} {:<40} {}", "BACKEND", "STATUS", "MODELS");

    let local = LocalBackend::new(&config.backend);
    match local {
        Ok(gateway) => print_row("local", &gateway).await,
        Err(e) => println!("{:<10} {:<40} -", "local", format!("ERROR ({})", e)),
    }

    match CloudBackend::new(&config.backend) {
        Ok(gateway) => print_row("cloud", &gateway).await,
        Err(_) => println!("{:<10} {:<40} -", "cloud", "NOT CONFIGURED (no credential)"),
    }

    println!();
    println!("active: {}", config.backend.kind.as_str());
    if config.backend.kind == BackendKind::Local {
        println!("local url: {}", config.backend.local_url);
    }
    Ok(())
}

async fn print_row(name: &str, gateway: &dyn BackendGateway) {
    match gateway.health().await {
        Ok(models) => println!("{:<10} {:<40} {}", name, "OK", models.len()),
        Err(e) => println!("{:<10} {:<40} -", name, format!("UNAVAILABLE ({})", e.code())),
    }
}
