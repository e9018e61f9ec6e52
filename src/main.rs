use std::fs;
use std::path::Path;

use anyhow::Result;
use clap::Parser;

use taskpay::repositories::store::Store;
use taskpay::services;
use taskpay::settings::Settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let settings = Settings::load(&args.config).expect("Could not load config file.");
    init_logging(&args.log4rs).expect("Failed to initialize logging.");

    let store = Store::new();

    println!("[*] Starting services.");
    let channels = services::start_services(store, settings.clone())
        .await
        .expect("Could not start services.");

    println!("[*] Starting HTTP server.");
    services::http::start_http_server(channels, &settings.server.listen).await?;

    Ok(())
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
