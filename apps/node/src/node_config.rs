use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use stickyroute_application::{ProxyOptions, RetryPolicy, RouteConfig};
use stickyroute_core::{AppError, AppResult};
use stickyroute_domain::{HeartbeatPeriod, LeaseDuration};
use stickyroute_middleware::DEFAULT_MAX_BODY_BYTES;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Redis {
        url: String,
        key_prefix: String,
    },
    RedisCluster {
        urls: Vec<String>,
        username: Option<String>,
        password: Option<String>,
        key_prefix: String,
    },
    Memory,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_address: String,
    pub node_host: String,
    pub node_port: u16,
    pub store_backend: StoreBackend,
    pub heartbeat_period: HeartbeatPeriod,
    pub lease_duration: Option<LeaseDuration>,
    pub partition_header: Option<String>,
    pub retry_policy: RetryPolicy,
    pub forward_timeout: Duration,
    pub max_body_bytes: usize,
    pub clear_liveness_on_close: bool,
}

impl NodeConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let node_host = lookup("NODE_HOST").unwrap_or_else(|| "0.0.0.0".to_owned());
        let node_port = parse_value("NODE_PORT", lookup("NODE_PORT"), 3000_u16)?;
        let node_address = non_empty(lookup("NODE_ADDRESS")).unwrap_or_else(|| {
            let hostname = non_empty(lookup("HOSTNAME")).unwrap_or_else(|| "localhost".to_owned());
            format!("http://{hostname}:{node_port}")
        });

        let store_backend = match lookup("STORE_BACKEND")
            .unwrap_or_else(|| "redis".to_owned())
            .as_str()
        {
            "redis" => StoreBackend::Redis {
                url: non_empty(lookup("REDIS_URL"))
                    .ok_or_else(|| AppError::Validation("REDIS_URL is required".to_owned()))?,
                key_prefix: lookup("REDIS_KEY_PREFIX").unwrap_or_default(),
            },
            "redis-cluster" => {
                let urls: Vec<String> = lookup("REDIS_URLS")
                    .unwrap_or_default()
                    .split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(str::to_owned)
                    .collect();
                if urls.is_empty() {
                    return Err(AppError::Validation(
                        "REDIS_URLS is required for STORE_BACKEND=redis-cluster".to_owned(),
                    ));
                }

                StoreBackend::RedisCluster {
                    urls,
                    username: non_empty(lookup("REDIS_USERNAME")),
                    password: non_empty(lookup("REDIS_PASSWORD")),
                    key_prefix: lookup("REDIS_KEY_PREFIX").unwrap_or_default(),
                }
            }
            "memory" => StoreBackend::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "STORE_BACKEND must be 'redis', 'redis-cluster' or 'memory', got '{other}'"
                )));
            }
        };

        let heartbeat_period = HeartbeatPeriod::new(Duration::from_millis(parse_value(
            "HEARTBEAT_PERIOD_MS",
            lookup("HEARTBEAT_PERIOD_MS"),
            10_000_u64,
        )?))?;

        let lease_duration = non_empty(lookup("LEASE_SECONDS"))
            .map(|raw| {
                raw.parse::<u64>()
                    .map_err(|error| {
                        AppError::Validation(format!("invalid LEASE_SECONDS value '{raw}': {error}"))
                    })
                    .and_then(LeaseDuration::from_secs)
            })
            .transpose()?;

        let retry_policy = RetryPolicy::new(
            parse_value("ROUTE_MAX_ATTEMPTS", lookup("ROUTE_MAX_ATTEMPTS"), 5_u32)?,
            Duration::from_millis(parse_value(
                "ROUTE_RETRY_BACKOFF_MS",
                lookup("ROUTE_RETRY_BACKOFF_MS"),
                50_u64,
            )?),
        );

        Ok(Self {
            node_address,
            node_host,
            node_port,
            store_backend,
            heartbeat_period,
            lease_duration,
            partition_header: non_empty(lookup("PARTITION_HEADER")),
            retry_policy,
            forward_timeout: Duration::from_millis(parse_value(
                "FORWARD_TIMEOUT_MS",
                lookup("FORWARD_TIMEOUT_MS"),
                15_000_u64,
            )?),
            max_body_bytes: parse_value(
                "MAX_BODY_BYTES",
                lookup("MAX_BODY_BYTES"),
                DEFAULT_MAX_BODY_BYTES,
            )?,
            clear_liveness_on_close: parse_flag(
                "CLEAR_LIVENESS_ON_CLOSE",
                lookup("CLEAR_LIVENESS_ON_CLOSE"),
                false,
            )?,
        })
    }

    pub fn socket_address(&self) -> AppResult<SocketAddr> {
        let host = IpAddr::from_str(&self.node_host).map_err(|error| {
            AppError::Validation(format!("invalid NODE_HOST '{}': {error}", self.node_host))
        })?;
        Ok(SocketAddr::from((host, self.node_port)))
    }

    pub fn proxy_options(&self) -> ProxyOptions {
        let mut instance_config = RouteConfig::new();
        if let Some(lease_duration) = self.lease_duration {
            instance_config = instance_config.with_lease_duration(lease_duration);
        }
        if let Some(partition_header) = &self.partition_header {
            instance_config = instance_config.with_partition_header(partition_header.as_str());
        }

        ProxyOptions {
            heartbeat_period: self.heartbeat_period,
            instance_config,
            retry_policy: self.retry_policy,
            clear_liveness_on_close: self.clear_liveness_on_close,
        }
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn parse_value<T>(name: &str, raw: Option<String>, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_flag(name: &str, raw: Option<String>, default: bool) -> AppResult<bool> {
    match raw {
        Some(value) if value.trim().eq_ignore_ascii_case("true") => Ok(true),
        Some(value) if value.trim().eq_ignore_ascii_case("false") => Ok(false),
        Some(value) => Err(AppError::Validation(format!(
            "invalid {name} value '{value}': expected 'true' or 'false'"
        ))),
        None => Ok(default),
    }
}
