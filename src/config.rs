use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use dotenvy::Error as DotenvError;
use thiserror::Error;
use watchpage_streams::StreamsEndpoint;

use crate::context::PageSettings;
use crate::render::PlayerMode;
use crate::select::SelectionPolicy;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SITE_NAME: &str = "ゆず";
const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(8);
const PORT_ENV: &str = "PORT";
const ADDR_ENV: &str = "WATCH_ADDR";
const SITE_NAME_ENV: &str = "SITE_NAME";
const UPSTREAM_BASE_URL_ENV: &str = "UPSTREAM_BASE_URL";
const UPSTREAM_TIMEOUT_ENV: &str = "UPSTREAM_TIMEOUT_SECS";
const POLICY_ENV: &str = "WATCH_POLICY";
const PLAYER_ENV: &str = "WATCH_PLAYER";

/// Configuration consumed by the runtime before spinning up Axum.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    pub bind_addr: SocketAddr,
    pub site_name: String,
    pub streams_endpoint: StreamsEndpoint,
    pub upstream_timeout: Duration,
    pub policy: SelectionPolicy,
    pub player: PlayerMode,
}

impl WatchConfig {
    /// Loads configuration from the process environment.
    ///
    /// Values from a local `.env` file (parsed via [`dotenvy::dotenv_override`]) override
    /// whatever is already set in the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_env_overrides()?;

        let addr = env::var(ADDR_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let port = env::var(PORT_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let site_name = env::var(SITE_NAME_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SITE_NAME.to_owned());

        let streams_endpoint: StreamsEndpoint =
            parse_var(UPSTREAM_BASE_URL_ENV, ConfigError::InvalidStreamsEndpoint)?
                .unwrap_or_default();

        let upstream_timeout = env::var(UPSTREAM_TIMEOUT_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT);

        let policy: SelectionPolicy =
            parse_var(POLICY_ENV, ConfigError::InvalidPolicy)?.unwrap_or_default();
        let player: PlayerMode =
            parse_var(PLAYER_ENV, ConfigError::InvalidPlayerMode)?.unwrap_or_default();

        Ok(Self {
            bind_addr: SocketAddr::new(addr, port),
            site_name,
            streams_endpoint,
            upstream_timeout,
            policy,
            player,
        })
    }

    /// Returns a builder for programmatic overrides.
    pub fn builder() -> WatchConfigBuilder {
        WatchConfigBuilder::default()
    }

    /// Settings shared by every request handler.
    pub fn page_settings(&self) -> PageSettings {
        PageSettings {
            site_name: self.site_name.clone(),
            policy: self.policy.clone(),
            player: self.player,
        }
    }
}

impl Default for WatchConfig {
    /// Binds to `0.0.0.0:8080` and plays itag 96 from the public streams API.
    fn default() -> Self {
        WatchConfigBuilder::default().build()
    }
}

/// Builder type for [`WatchConfig`].
#[derive(Default, Clone, Debug)]
pub struct WatchConfigBuilder {
    bind_addr: Option<SocketAddr>,
    site_name: Option<String>,
    streams_endpoint: Option<StreamsEndpoint>,
    upstream_timeout: Option<Duration>,
    policy: Option<SelectionPolicy>,
    player: Option<PlayerMode>,
}

impl WatchConfigBuilder {
    /// Sets the address for the embedded Axum listener.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// Sets the site name shown in every page title.
    pub fn site_name(mut self, name: impl Into<String>) -> Self {
        self.site_name = Some(name.into());
        self
    }

    /// Sets the streams API base URL.
    pub fn streams_endpoint(mut self, endpoint: StreamsEndpoint) -> Self {
        self.streams_endpoint = Some(endpoint);
        self
    }

    /// Bounds every upstream request.
    pub fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = Some(timeout);
        self
    }

    pub fn policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn player(mut self, player: PlayerMode) -> Self {
        self.player = Some(player);
        self
    }

    /// Builds the final configuration.
    pub fn build(self) -> WatchConfig {
        WatchConfig {
            bind_addr: self.bind_addr.unwrap_or_else(|| {
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT)
            }),
            site_name: self.site_name.unwrap_or_else(|| DEFAULT_SITE_NAME.to_owned()),
            streams_endpoint: self.streams_endpoint.unwrap_or_default(),
            upstream_timeout: self.upstream_timeout.unwrap_or(DEFAULT_UPSTREAM_TIMEOUT),
            policy: self.policy.unwrap_or_default(),
            player: self.player.unwrap_or_default(),
        }
    }
}

/// Errors that can occur while building [`WatchConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid streams endpoint: {0}")]
    InvalidStreamsEndpoint(String),
    #[error("invalid selection policy: {0}")]
    InvalidPolicy(String),
    #[error("invalid player mode: {0}")]
    InvalidPlayerMode(String),
    #[error("failed to load .env overrides: {0}")]
    Dotenv(#[from] DotenvError),
}

fn load_env_overrides() -> Result<(), ConfigError> {
    match dotenvy::dotenv_override() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::Dotenv(err)),
    }
}

/// Parses an optional variable, treating blank values as unset.
fn parse_var<T: FromStr>(
    name: &str,
    invalid: fn(String) -> ConfigError,
) -> Result<Option<T>, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.parse::<T>().map_err(|_| invalid(value)))
        .transpose() // convert Option<Result> -> Result<Option>
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};
    use watchpage_streams::Itag;

    const ALL_ENV: [&str; 7] = [
        PORT_ENV,
        ADDR_ENV,
        SITE_NAME_ENV,
        UPSTREAM_BASE_URL_ENV,
        UPSTREAM_TIMEOUT_ENV,
        POLICY_ENV,
        PLAYER_ENV,
    ];

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_env() {
        for name in ALL_ENV {
            unsafe {
                std::env::remove_var(name);
            }
        }
    }

    #[test]
    fn builder_overrides_defaults() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 8)), 9999);
        let config = WatchConfig::builder()
            .bind_addr(addr)
            .site_name("動画を埋め込み!")
            .streams_endpoint("http://127.0.0.1:9998".parse().unwrap())
            .upstream_timeout(Duration::from_secs(3))
            .policy(SelectionPolicy::EnumerateAll)
            .player(PlayerMode::Adaptive)
            .build();

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.site_name, "動画を埋め込み!");
        assert_eq!(config.streams_endpoint.to_string(), "http://127.0.0.1:9998/");
        assert_eq!(config.upstream_timeout, Duration::from_secs(3));
        assert_eq!(config.policy, SelectionPolicy::EnumerateAll);
        assert_eq!(config.player, PlayerMode::Adaptive);
    }

    #[test]
    fn defaults_match_the_public_site() {
        let config = WatchConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.site_name, DEFAULT_SITE_NAME);
        assert_eq!(config.streams_endpoint, StreamsEndpoint::default());
        assert_eq!(config.upstream_timeout, DEFAULT_UPSTREAM_TIMEOUT);
        assert_eq!(
            config.policy,
            SelectionPolicy::FixedPreferred {
                itag: Itag::new("96")
            }
        );
        assert_eq!(config.player, PlayerMode::Native);
    }

    #[test]
    fn reads_env_configuration() {
        let _guard = env_lock().lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var(PORT_ENV, "9000");
            std::env::set_var(ADDR_ENV, "127.0.0.2");
            std::env::set_var(SITE_NAME_ENV, "テスト");
            std::env::set_var(UPSTREAM_BASE_URL_ENV, "http://127.0.0.1:7878");
            std::env::set_var(UPSTREAM_TIMEOUT_ENV, "5");
            std::env::set_var(POLICY_ENV, "caller");
            std::env::set_var(PLAYER_ENV, "hls");
        }

        let config = WatchConfig::from_env().expect("config");
        assert_eq!(
            config.bind_addr,
            SocketAddr::new("127.0.0.2".parse().unwrap(), 9000)
        );
        assert_eq!(config.site_name, "テスト");
        assert_eq!(config.streams_endpoint.to_string(), "http://127.0.0.1:7878/");
        assert_eq!(config.upstream_timeout, Duration::from_secs(5));
        assert_eq!(config.policy, SelectionPolicy::CallerSpecified);
        assert_eq!(config.player, PlayerMode::Adaptive);

        clear_env();
    }

    #[test]
    fn falls_back_on_unparsable_numbers() {
        let _guard = env_lock().lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var(PORT_ENV, "eighty");
            std::env::set_var(ADDR_ENV, "localhost");
            std::env::set_var(UPSTREAM_TIMEOUT_ENV, "0");
            std::env::set_var(SITE_NAME_ENV, "  ");
        }

        let config = WatchConfig::from_env().expect("config");
        assert_eq!(
            config.bind_addr,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT)
        );
        assert_eq!(config.upstream_timeout, DEFAULT_UPSTREAM_TIMEOUT);
        assert_eq!(config.site_name, DEFAULT_SITE_NAME);

        clear_env();
    }

    #[test]
    fn rejects_invalid_enumerations() {
        let _guard = env_lock().lock().unwrap();
        clear_env();

        unsafe {
            std::env::set_var(POLICY_ENV, "random");
        }
        assert!(matches!(
            WatchConfig::from_env(),
            Err(ConfigError::InvalidPolicy(value)) if value == "random"
        ));

        clear_env();
        unsafe {
            std::env::set_var(PLAYER_ENV, "flash");
        }
        assert!(matches!(
            WatchConfig::from_env(),
            Err(ConfigError::InvalidPlayerMode(_))
        ));

        clear_env();
        unsafe {
            std::env::set_var(UPSTREAM_BASE_URL_ENV, "ftp://example.com");
        }
        assert!(matches!(
            WatchConfig::from_env(),
            Err(ConfigError::InvalidStreamsEndpoint(_))
        ));

        clear_env();
    }

    #[test]
    fn page_settings_mirror_config() {
        let config = WatchConfig::builder()
            .site_name("site")
            .policy(SelectionPolicy::CallerSpecified)
            .build();
        let settings = config.page_settings();

        assert_eq!(settings.site_name, "site");
        assert_eq!(settings.policy, SelectionPolicy::CallerSpecified);
        assert_eq!(settings.player, PlayerMode::Native);
    }
}
