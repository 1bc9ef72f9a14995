//! Command-line flags. Every flag can also come from the environment and
//! overrides the value loaded from the config file.

use clap::Parser;
use std::path::PathBuf;

use crate::config::schema::{GatewayConfig, TlsConfig};

/// Host-based HTTP/WebSocket gateway for container stacks.
#[derive(Parser, Debug, Default)]
#[command(name = "stack-gateway")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port of the plain HTTP listener
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Destination resolver (subnet, docker)
    #[arg(long, env = "DESTINATION_RESOLVER")]
    pub resolver: Option<String>,

    /// Proxy mappings, e.g. "src:bob:80 abc:3000 web.site.com:web"
    #[arg(long, env = "PROXY_MAPPINGS")]
    pub mappings: Option<String>,

    /// Only proxy hosts that match a mapping
    #[arg(long, env = "PROXY_ONLY_MAPPED_HOSTS")]
    pub only_mapped_hosts: Option<bool>,

    /// Base hostname; the label before it selects the stack
    #[arg(long, env = "BASE_HOSTNAME")]
    pub base_hostname: Option<String>,

    /// Address published container ports are reached on
    #[arg(long, env = "GATEWAY_IP")]
    pub gateway_ip: Option<String>,

    /// Regex whose first group extracts the stack key from a host
    #[arg(long, env = "STACK_SEARCH_STRING")]
    pub stack_search: Option<String>,

    /// Service label naming the stack
    #[arg(long, env = "DOCKER_STACK_LABEL")]
    pub stack_label: Option<String>,

    /// Service label naming the deployment
    #[arg(long, env = "DOCKER_DEPLOYMENT_LABEL")]
    pub deployment_label: Option<String>,

    /// Service label marking a healthy stack member
    #[arg(long, env = "DOCKER_HEALTH_LABEL")]
    pub health_label: Option<String>,

    /// Log full request/response exchanges
    #[arg(long, env = "INSPECT_TRAFFIC")]
    pub inspect: Option<bool>,

    /// TLS certificate (PEM); enables the HTTPS listener together with --tls-key
    #[arg(long, env = "TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<String>,

    /// TLS private key (PEM)
    #[arg(long, env = "TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<String>,

    /// Hosts served over plain HTTP when TLS is enabled (comma separated)
    #[arg(long, env = "HTTP", value_delimiter = ',')]
    pub http_hosts: Option<Vec<String>>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Converts verbosity count to log level string
    pub fn log_level(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("error");
        }
        match self.verbose {
            0 => None,
            1 => Some("info"),
            2 => Some("debug"),
            _ => Some("trace"),
        }
    }

    /// Overlay flags that were given onto `config`.
    pub fn apply(&self, config: &mut GatewayConfig) {
        if let Some(port) = self.port {
            config.listener.bind_address = format!("0.0.0.0:{}", port);
        }
        if let Some(name) = &self.resolver {
            config.resolver.name = name.clone();
        }
        if let Some(mappings) = &self.mappings {
            config.resolver.mappings = mappings.clone();
        }
        if let Some(only) = self.only_mapped_hosts {
            config.resolver.only_mapped_hosts = only;
        }
        if let Some(base) = &self.base_hostname {
            config.docker.base_hostname = Some(base.clone());
        }
        if let Some(ip) = &self.gateway_ip {
            config.docker.gateway_ip = Some(ip.clone());
        }
        if let Some(pattern) = &self.stack_search {
            config.docker.stack_search_pattern = pattern.clone();
        }
        if let Some(label) = &self.stack_label {
            config.docker.stack_label = label.clone();
        }
        if let Some(label) = &self.deployment_label {
            config.docker.deployment_label = label.clone();
        }
        if let Some(label) = &self.health_label {
            config.docker.health_label = label.clone();
        }
        if let Some(inspect) = self.inspect {
            config.inspect.enabled = inspect;
        }
        if let (Some(cert), Some(key)) = (&self.tls_cert, &self.tls_key) {
            let tls = config.tls.get_or_insert_with(|| TlsConfig {
                cert_path: String::new(),
                key_path: String::new(),
                bind_address: "0.0.0.0:443".to_string(),
                http_hosts: Vec::new(),
            });
            tls.cert_path = cert.clone();
            tls.key_path = key.clone();
        }
        if let (Some(hosts), Some(tls)) = (&self.http_hosts, config.tls.as_mut()) {
            tls.http_hosts = hosts
                .iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect();
        }
        if let Some(level) = self.log_level() {
            config.observability.log_level = level.to_string();
        }
    }
}
