use clap::Parser;
use log::{error, info};
use voxlink::configuration::{Args, Config};
use voxlink::controller::Controller;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
==============================================================================
                 voxlink toy server v{}  (TCP / WebSocket / UDP)
==============================================================================
",
        env!("CARGO_PKG_VERSION")
    );

    info!("Importing configuration");
    let args = Args::parse();

    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration imported successfully");

    let mut controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.run().await {
        error!("Error occurred in the controller process: {}, exiting...", e);
        std::process::exit(1);
    }
}
