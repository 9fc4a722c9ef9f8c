use std::{path::PathBuf, sync::OnceLock};

use clap::{Parser, Subcommand};

/// Deploys container images to a Nomad cluster behind Traefik.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the config file.
    #[arg(short, long, default_value = "control-plane.toml")]
    pub config: PathBuf,

    /// Base URL of the control plane, used by the client subcommands.
    #[arg(long, global = true, default_value = "http://localhost:50051")]
    pub server: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the control plane server.
    Serve {
        /// Port to listen on, overrides the config file and GRPC_PORT.
        #[arg(long)]
        port: Option<String>,
        /// Nomad address, overrides the config file and NOMAD_ADDR.
        #[arg(long)]
        nomad: Option<String>,
    },
    /// Deploy an application.
    Deploy(DeployArgs),
    /// Delete an application by deployment id or name.
    Delete {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show the status of an application.
    Status {
        #[arg(long)]
        id: String,
    },
    /// Check that the control plane can reach Nomad.
    Health,
}

#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct DeployArgs {
    #[arg(long, default_value = "")]
    pub name: String,
    /// Container image.
    #[arg(long, default_value = "")]
    pub image: String,
    #[arg(long, default_value_t = 1)]
    pub replicas: u32,
    /// CPU cores, fractions allowed.
    #[arg(long, default_value_t = 0.1)]
    pub cpu: f64,
    /// Memory in MB.
    #[arg(long, default_value_t = 128)]
    pub memory: u64,
    #[arg(long, default_value = "global")]
    pub region: String,
    /// Network mode: host or bridge.
    #[arg(long, default_value = "host")]
    pub network: String,
    /// Environment variables, KEY1=VALUE1,KEY2=VALUE2.
    #[arg(long, default_value = "")]
    pub env: String,
    /// Route this hostname to the application through Traefik.
    #[arg(long)]
    pub proxy_host: Option<String>,
    /// Terminate TLS for the proxied hostname.
    #[arg(long)]
    pub proxy_ssl: bool,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_defaults() {
        let args = Args::try_parse_from([
            "control-plane",
            "deploy",
            "--name",
            "web",
            "--image",
            "nginx",
        ])
        .unwrap();
        assert_eq!(args.server, "http://localhost:50051");
        let Command::Deploy(deploy) = args.command else {
            panic!("expected deploy");
        };
        assert_eq!(deploy.replicas, 1);
        assert_eq!(deploy.cpu, 0.1);
        assert_eq!(deploy.memory, 128);
        assert_eq!(deploy.region, "global");
        assert_eq!(deploy.network, "host");
        assert_eq!(deploy.proxy_host, None);
        assert!(!deploy.proxy_ssl);
    }

    #[test]
    fn test_global_server_flag() {
        let args = Args::try_parse_from(["control-plane", "health", "--server", "http://cp:9000"])
            .unwrap();
        assert_eq!(args.server, "http://cp:9000");
        assert!(matches!(args.command, Command::Health));
    }

    #[test]
    fn test_serve_overrides() {
        let args = Args::try_parse_from([
            "control-plane",
            "--config",
            "/etc/cp.toml",
            "serve",
            "--port",
            "6000",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/cp.toml"));
        let Command::Serve { port, nomad } = args.command else {
            panic!("expected serve");
        };
        assert_eq!(port.as_deref(), Some("6000"));
        assert_eq!(nomad, None);
    }
}
