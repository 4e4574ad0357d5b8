use greennet_shared::protocol::MAX_OPEN_CHANNELS;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Encoding of response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Lua table literals, readable with `textutils.unserialize`.
    #[default]
    Lua,
    Json,
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lua" => Ok(Self::Lua),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown wire format: {s} (expected lua or json)")),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Upper bound on a parked `/listen` request
    pub poll_timeout: Duration,
    /// How often the janitor sweeps the registry
    pub janitor_period: Duration,
    /// Sessions idle for longer than this are evicted
    pub idle_timeout: Duration,
    pub max_open_channels: usize,
    /// Fixed seed for position assignment. `None` seeds from OS entropy.
    pub position_seed: Option<u64>,
    /// Lua client script served at `/`
    pub client_script: Option<PathBuf>,
    pub wire_format: WireFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9001".to_string(),
            poll_timeout: Duration::from_secs(20),
            janitor_period: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(60),
            max_open_channels: MAX_OPEN_CHANNELS,
            position_seed: None,
            client_script: None,
            wire_format: WireFormat::Lua,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `GREENNET_*` environment variables.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("GREENNET_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Ok(path) = std::env::var("GREENNET_CLIENT_SCRIPT") {
            config.client_script = Some(PathBuf::from(path));
        }
        if let Some(secs) = env_secs("GREENNET_POLL_TIMEOUT_SECS")? {
            config.poll_timeout = secs;
        }
        if let Some(secs) = env_secs("GREENNET_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = secs;
            config.janitor_period = secs;
        }
        if let Ok(seed) = std::env::var("GREENNET_POSITION_SEED") {
            let seed = seed
                .parse()
                .map_err(|_| format!("GREENNET_POSITION_SEED is not a u64: {seed}"))?;
            config.position_seed = Some(seed);
        }
        if let Ok(format) = std::env::var("GREENNET_WIRE_FORMAT") {
            config.wire_format = format.parse()?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.poll_timeout.is_zero() {
            return Err("poll_timeout must be > 0".to_string());
        }
        if self.janitor_period.is_zero() {
            return Err("janitor_period must be > 0".to_string());
        }
        if self.idle_timeout < self.poll_timeout {
            return Err("idle_timeout must be >= poll_timeout".to_string());
        }
        if self.max_open_channels == 0 || self.max_open_channels > MAX_OPEN_CHANNELS {
            return Err(format!(
                "max_open_channels must be in 1..={}",
                MAX_OPEN_CHANNELS
            ));
        }
        if let Some(path) = &self.client_script {
            if !path.is_file() {
                return Err(format!("client_script {} is not a file", path.display()));
            }
        }
        Ok(())
    }
}

fn env_secs(key: &str) -> Result<Option<Duration>, String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(|s| Some(Duration::from_secs(s)))
            .map_err(|_| format!("{key} is not a whole number of seconds: {raw}")),
        Err(_) => Ok(None),
    }
}
