use clap::{Arg, Command};
use log::LevelFilter;
use std::process;
use std::str::FromStr;
use vip_leads::admin::{hash_password, AdminAuth};
use vip_leads::notifier::Notifier;
use vip_leads::store::{ApplicationStore, SqliteStore};
use vip_leads::Config;

#[tokio::main]
async fn main() {
    let matches = Command::new("vip-leads")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Lead capture service for the law firm website")
        .long_about(
            "VIP Leads - accepts contact form applications, filters duplicates and notifies the office:\n\
             • Validation of name, phone, email and message fields\n\
             • Per-phone and per-IP submission window\n\
             • SQLite storage with an admin review API\n\
             • Optional email and Telegram alerts for every new application",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/vip-leads.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate an example configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Check the configuration and show which notification channels are enabled")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .help("Show application counters")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("hash-password")
                .long("hash-password")
                .value_name("PASSWORD")
                .help("Print a hash of PASSWORD for the admin.password setting")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(password) = matches.get_one::<String>("hash-password") {
        println!("{}", hash_password(password));
        return;
    }

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/vip-leads.yaml");
    let (config, notes) = match load_config(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    // Initialize logger: --verbose wins, then the configured level
    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        config
            .logging
            .as_ref()
            .and_then(|l| LevelFilter::from_str(&l.level).ok())
            .unwrap_or(LevelFilter::Info)
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    // Reported only now so they reach the logger
    for note in &notes {
        log::warn!("{note}");
    }

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    if matches.get_flag("stats") {
        show_stats(&config);
        return;
    }

    log::info!(
        "Starting VIP Leads v{} (database: {}, submission window: {} minutes)",
        env!("CARGO_PKG_VERSION"),
        config.database.path,
        config.submissions.limit_minutes
    );

    if let Err(e) = vip_leads::server::run(&config).await {
        log::error!("Server error: {e:#}");
        process::exit(1);
    }
}

/// Load the file (or defaults) and apply environment overrides. Problems are returned
/// rather than logged because the logger depends on the loaded level.
fn load_config(path: &str) -> anyhow::Result<(Config, Vec<String>)> {
    let mut notes = Vec::new();
    let mut config = if std::path::Path::new(path).exists() {
        Config::from_file(path)?
    } else {
        notes.push(format!(
            "Configuration file '{path}' not found, using default configuration"
        ));
        Config::default()
    };
    notes.extend(config.apply_env_overrides());
    Ok((config, notes))
}

fn generate_default_config(path: &str) {
    let config = Config::example();
    match config.to_file(path) {
        Ok(()) => {
            println!("Example configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn test_config(config: &Config) {
    println!("🔍 Testing configuration...");
    println!();
    println!("Bind address: {}", config.server.bind_address);
    println!("Database: {}", config.database.path);
    println!(
        "Submission window: {} minutes, message limit: {} characters",
        config.submissions.limit_minutes, config.submissions.max_message_length
    );

    let notifier = Notifier::from_config(config);
    let channels = notifier.channel_names();
    if channels.is_empty() {
        println!("Notification channels: none (applications are stored only)");
    } else {
        println!("Notification channels: {}", channels.join(", "));
    }

    println!("Admin API: {}", admin_status(config));

    match SqliteStore::open(&config.database.path).and_then(|store| store.ping()) {
        Ok(()) => println!("✅ Configuration validated"),
        Err(e) => {
            println!("❌ Database check failed: {e:#}");
            process::exit(1);
        }
    }
}

/// Same rule the server applies: blank usernames or passwords leave the API disabled.
fn admin_status(config: &Config) -> &'static str {
    if AdminAuth::from_config(config.admin.as_ref()).is_enabled() {
        "enabled"
    } else {
        "disabled"
    }
}

fn show_stats(config: &Config) {
    let store = match SqliteStore::open(&config.database.path) {
        Ok(store) => store,
        Err(e) => {
            println!("❌ Failed to access applications database: {e:#}");
            process::exit(1);
        }
    };

    match store.stats() {
        Ok(stats) => {
            println!("📊 Application Statistics");
            println!("═══════════════════════════════════════");
            println!("  Total: {}", stats.total);
            println!("  ├─ New: {}", stats.new);
            println!("  └─ Processed: {}", stats.processed);
        }
        Err(e) => {
            println!("❌ Failed to get statistics: {e:#}");
            process::exit(1);
        }
    }
}
