// CLI module for chat-relay
// Author: kelexine (https://github.com/kelexine)

use clap::Parser;
use std::path::PathBuf;

/// chat-relay - Streaming chat-completion relay for the mortgage CRM
#[derive(Parser, Debug)]
#[command(name = "chat-relay", version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML config file (default: ~/.chat-relay/config.toml)
    #[arg(long, short = 'c', env = "CHAT_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind, overriding the config file
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on, overriding the config file
    #[arg(long, short = 'p')]
    pub port: Option<u16>,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut crate::config::AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}
