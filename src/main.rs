use std::path::PathBuf;

use clap::Parser;
use people_ldap::config::Configuration;
use people_ldap::credentials::EnvCredentials;
use people_ldap::{DiagnosticsConfig, formatter, telemetry};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Lookup key, e.g. a NetID.
    key: String,
    /// Path to `config.yaml`.
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Print a single field: `cn`, `address`, `email`, `phone` or any
    /// attribute name.
    #[arg(long, short)]
    field: Option<String>,
    /// Print the whole record as JSON.
    #[arg(long, conflicts_with = "field")]
    json: bool,
    /// Turn on diagnostics for this run (non-production only).
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::setup_logging();

    let args = Args::parse();
    let mut config = Configuration::default()
        .path(args.config.unwrap_or_default())
        .read();
    config.debug_mode |= args.debug;

    let diagnostics: DiagnosticsConfig = config.diagnostics();
    let service =
        people_ldap::initialize_service(&config, Box::new(EnvCredentials))?;

    let record = service.lookup(&args.key, &diagnostics).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    match args.field.as_deref() {
        Some(field) => {
            let value = match field {
                "cn" | "name" => formatter::common_name(&record),
                "address" => formatter::campus_address(&record),
                "email" => formatter::email(&record),
                "phone" => formatter::phone(&record),
                attribute => formatter::get_field(&record, attribute, 0),
            };

            if let Some(value) = value {
                println!("{value}");
            }
        },
        None => println!("{}", formatter::format_as_display_text(&record)),
    }

    Ok(())
}
