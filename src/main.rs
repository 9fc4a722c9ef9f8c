use std::{process::ExitCode, sync::Arc};

use api::service::{DeploymentService, JobDefaults};
use cli::Command;
use config::ControlPlaneConfig;
use nomad::client::NomadClient;

mod api;
mod cli;
mod client;
mod config;
mod job;
mod nomad;
mod status;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv::dotenv();

    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::get_cli_args();
    match &args.command {
        Command::Serve { port, nomad } => serve(port.as_deref(), nomad.as_deref()).await,
        command => match client::run(&args.server, command).await {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        },
    }
}

async fn serve(port: Option<&str>, nomad_address: Option<&str>) -> ExitCode {
    let args = cli::get_cli_args();
    let config = match load_config(args, port, nomad_address) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Unable to load config from {:?}: {e}", args.config);
            return ExitCode::FAILURE;
        }
    };

    let defaults = JobDefaults::from(&config.nomad);
    let service = match NomadClient::new(&config.nomad) {
        Ok(client) => DeploymentService::new(Arc::new(client), defaults),
        Err(e) => {
            log::error!("Failed to create Nomad client: {e}");
            DeploymentService::uninitialized(defaults)
        }
    };

    match api::server::serve(config.listen, Arc::new(service)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Server error on {}: {e}", config.listen);
            ExitCode::FAILURE
        }
    }
}

fn load_config(
    args: &cli::Args,
    port: Option<&str>,
    nomad_address: Option<&str>,
) -> Result<ControlPlaneConfig, config::ConfigError> {
    let mut config = ControlPlaneConfig::try_init(&args.config)?;
    if let Some(port) = port {
        config.set_port(port)?;
    }
    if let Some(address) = nomad_address.filter(|a| !a.is_empty()) {
        config.nomad.address = address.to_string();
        config.validate()?;
    }
    Ok(config)
}
