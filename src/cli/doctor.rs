use anyhow::{Result, bail};
use std::path::Path;

use crate::core::config::{Config, ProviderKind, SearchConfig};
use crate::core::store::oauth::{self, ACCESS_TOKEN_ENV, Credentials};
use crate::core::terminal::{print_error, print_info, print_step, print_success, print_warn};

pub async fn run_doctor(config_path: &Path) -> Result<()> {
    print_step("rankmon Doctor - Checking configuration, search and store access...");
    println!();

    let mut problems = 0;

    // 1. Configuration
    let config = match Config::load(config_path) {
        Ok(config) => {
            print_success(&format!(
                "Configuration {} is valid ({} target(s)).",
                config_path.display(),
                config.targets.len()
            ));
            Some(config)
        }
        Err(e) => {
            print_error(&format!("Configuration {}: {}", config_path.display(), e));
            problems += 1;
            None
        }
    };

    // 2. Search facility
    let search = config
        .as_ref()
        .map(|c| c.search.clone())
        .unwrap_or_default();
    if !check_search(&search) {
        problems += 1;
    }

    // 3. Store credentials
    match &config {
        Some(config) => {
            let path = config.store.credentials_path();
            if std::env::var(ACCESS_TOKEN_ENV).is_ok_and(|t| !t.trim().is_empty()) {
                print_success(&format!("Using an access token from {}.", ACCESS_TOKEN_ENV));
            } else if !path.exists() {
                print_error(&format!(
                    "Credentials file {} does not exist (or set {}).",
                    path.display(),
                    ACCESS_TOKEN_ENV
                ));
                problems += 1;
            } else {
                match oauth::load_credentials(&path).await {
                    Ok(Credentials::Refresh { .. }) => print_success(&format!(
                        "Credentials {} hold a refresh token.",
                        path.display()
                    )),
                    Ok(Credentials::Static { .. }) => print_warn(&format!(
                        "Credentials {} hold a static access token; it will expire.",
                        path.display()
                    )),
                    Err(e) => {
                        print_error(&e.to_string());
                        problems += 1;
                    }
                }
            }
        }
        None => print_info("Skipping credentials check until the configuration loads."),
    }

    println!();
    if problems > 0 {
        bail!("{} problem(s) found", problems);
    }
    print_success("All checks passed.");
    Ok(())
}

fn check_search(search: &SearchConfig) -> bool {
    match search.provider {
        ProviderKind::Googler => match std::process::Command::new(&search.command)
            .arg("--version")
            .output()
        {
            Ok(out) if out.status.success() => {
                print_success(&format!(
                    "Search command {} is available: {}",
                    search.command,
                    String::from_utf8_lossy(&out.stdout).trim()
                ));
                true
            }
            _ => {
                print_error(&format!(
                    "Search command '{}' is missing or failed to run.",
                    search.command
                ));
                false
            }
        },
        ProviderKind::CustomSearch => {
            print_info(&format!(
                "Using the Custom Search JSON API at {}.",
                search.endpoint
            ));
            true
        }
    }
}
