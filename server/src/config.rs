use std::env;

pub const CHAT_SERVER_ADDR_ENV_VAR: &str = "CHAT_SERVER_ADDR";
pub const CHAT_SERVER_WELCOME_ENV_VAR: &str = "CHAT_SERVER_WELCOME";
pub const SIMULATE_DROPPED_CONNECTIONS_ENV_VAR: &str = "CHAT_SERVER_SIMULATE_DROPPED_CONNECTIONS";
pub const SIMULATE_DROPPED_PACKETS_ENV_VAR: &str = "CHAT_SERVER_SIMULATE_DROPPED_PACKETS";
pub const SIMULATE_CORRUPTED_PACKETS_ENV_VAR: &str = "CHAT_SERVER_SIMULATE_CORRUPTED_PACKETS";

const DEFAULT_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_WELCOME: &str = "Welcome to the chat server";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub welcome_message: String,
    pub simulate_dropped_connections: bool,
    pub simulate_dropped_packets: bool,
    pub simulate_corrupted_packets: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: DEFAULT_ADDR.to_string(),
            welcome_message: DEFAULT_WELCOME.to_string(),
            simulate_dropped_connections: false,
            simulate_dropped_packets: false,
            simulate_corrupted_packets: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        ServerConfig {
            bind_addr: env::var(CHAT_SERVER_ADDR_ENV_VAR).unwrap_or(DEFAULT_ADDR.to_string()),
            welcome_message: env::var(CHAT_SERVER_WELCOME_ENV_VAR)
                .unwrap_or(DEFAULT_WELCOME.to_string()),
            simulate_dropped_connections: env_flag(SIMULATE_DROPPED_CONNECTIONS_ENV_VAR),
            simulate_dropped_packets: env_flag(SIMULATE_DROPPED_PACKETS_ENV_VAR),
            simulate_corrupted_packets: env_flag(SIMULATE_CORRUPTED_PACKETS_ENV_VAR),
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|value| truthy(&value)).unwrap_or(false)
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}
