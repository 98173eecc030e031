use serde::{Deserialize, Serialize};
use tracing::info;

/// Effective configuration, resolved entirely from the process environment.
/// There is no config file — every field below has an env var and a
/// default, both documented alongside the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub vnc: VncConfig,
    pub pool: PoolConfig,
    pub reaper: ReaperConfig,
    pub state: StateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub orchestrator_port: u16,
    pub vnc_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VncConfig {
    pub image: String,
    pub container_port: u16,
    pub port_range_min: u16,
    pub port_range_max: u16,
    pub appname: String,
    pub width: String,
    pub height: String,
    pub network_name: String,
    pub network_subnet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub warm_pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    pub cleanup_interval_minutes: u64,
    pub idle_timeout_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub state_file: String,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            orchestrator_port: 8080,
            vnc_host: "localhost".to_string(),
        }
    }
}

impl Default for VncConfig {
    fn default() -> Self {
        Self {
            image: "ghcr.io/giovannemendonca/firefox-flash-kiosk:latest".to_string(),
            container_port: 6080,
            port_range_min: 5000,
            port_range_max: 5003,
            appname: "firefox-kiosk https://google.com".to_string(),
            width: "390".to_string(),
            height: "900".to_string(),
            network_name: "vnc_network".to_string(),
            network_subnet: "10.10.0.0/24".to_string(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { warm_pool_size: 1 }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_minutes: 30,
            idle_timeout_hours: 8,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            state_file: "state.json".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            vnc: VncConfig::default(),
            pool: PoolConfig::default(),
            reaper: ReaperConfig::default(),
            state: StateConfig::default(),
        }
    }
}

impl Config {
    /// Resolve the effective configuration from the process environment.
    /// Every field falls back to its default when the env var is unset or
    /// unparsable; this never fails.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let config = Config {
            server: ServerConfig {
                orchestrator_port: env_parse_or(
                    "ORCHESTRATOR_PORT",
                    defaults.server.orchestrator_port,
                ),
                vnc_host: env_or("VNC_HOST", &defaults.server.vnc_host),
            },
            vnc: VncConfig {
                image: env_or("VNC_IMAGE", &defaults.vnc.image),
                container_port: env_parse_or("VNC_CONTAINER_PORT", defaults.vnc.container_port),
                port_range_min: env_parse_or("PORT_RANGE_MIN", defaults.vnc.port_range_min),
                port_range_max: env_parse_or("PORT_RANGE_MAX", defaults.vnc.port_range_max),
                appname: env_or("VNC_APPNAME", &defaults.vnc.appname),
                width: env_or("VNC_WIDTH", &defaults.vnc.width),
                height: env_or("VNC_HEIGHT", &defaults.vnc.height),
                network_name: env_or("DOCKER_NETWORK_NAME", &defaults.vnc.network_name),
                network_subnet: env_or("DOCKER_NETWORK_SUBNET", &defaults.vnc.network_subnet),
            },
            pool: PoolConfig {
                warm_pool_size: env_parse_or("WARM_POOL_SIZE", defaults.pool.warm_pool_size),
            },
            reaper: ReaperConfig {
                cleanup_interval_minutes: env_parse_or(
                    "CLEANUP_INTERVAL_MINUTES",
                    defaults.reaper.cleanup_interval_minutes,
                ),
                idle_timeout_hours: env_parse_or(
                    "IDLE_TIMEOUT_HOURS",
                    defaults.reaper.idle_timeout_hours,
                ),
            },
            state: StateConfig {
                state_file: env_or("STATE_FILE", &defaults.state.state_file),
            },
        };

        config.log_banner();
        config
    }

    /// Log every resolved value once at boot so operators can confirm the
    /// environment took effect.
    fn log_banner(&self) {
        info!("========== ORCHESTRATOR CONFIG ==========");
        info!("  ORCHESTRATOR_PORT     = {}", self.server.orchestrator_port);
        info!("  VNC_HOST              = {}", self.server.vnc_host);
        info!("  VNC_IMAGE             = {}", self.vnc.image);
        info!("  VNC_CONTAINER_PORT    = {}", self.vnc.container_port);
        info!(
            "  PORT_RANGE            = {} - {} ({} slots)",
            self.vnc.port_range_min,
            self.vnc.port_range_max,
            self.max_slots()
        );
        info!("  VNC_APPNAME           = {}", self.vnc.appname);
        info!("  VNC_WIDTH             = {}", self.vnc.width);
        info!("  VNC_HEIGHT            = {}", self.vnc.height);
        info!("  DOCKER_NETWORK_NAME   = {}", self.vnc.network_name);
        info!("  DOCKER_NETWORK_SUBNET = {}", self.vnc.network_subnet);
        info!("  STATE_FILE            = {}", self.state.state_file);
        info!(
            "  CLEANUP_INTERVAL_MINUTES = {}",
            self.reaper.cleanup_interval_minutes
        );
        info!("  IDLE_TIMEOUT_HOURS    = {}", self.reaper.idle_timeout_hours);
        info!("  WARM_POOL_SIZE        = {}", self.pool.warm_pool_size);
        info!("===========================================");
    }

    pub fn max_slots(&self) -> usize {
        (self.vnc.port_range_max - self.vnc.port_range_min) as usize + 1
    }
}
