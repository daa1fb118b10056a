use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use url::Url;

/// Deployment environment. Selects which URL set every service resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Local => f.write_str("local"),
            Environment::Production => f.write_str("production"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default = "default_services")]
    pub services: BTreeMap<String, ServiceUrls>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            server: ServerConfig::default(),
            proxy: ProxyConfig::default(),
            health_check: HealthCheckConfig::default(),
            metrics: MetricsConfig::default(),
            services: default_services(),
            routes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_timeout")]
    pub timeout_secs: u64,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_proxy_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_health_path")]
    pub path: String,
}

impl HealthCheckConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_health_timeout(),
            path: default_health_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

/// Both URL sets for one logical service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceUrls {
    pub local: Url,
    pub production: Url,
}

impl ServiceUrls {
    pub fn for_environment(&self, environment: Environment) -> &Url {
        match environment {
            Environment::Local => &self.local,
            Environment::Production => &self.production,
        }
    }
}

/// An extra forwarding rule on top of the implicit `/api/<service>` ones.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    pub prefix: String,
    pub service: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("{name} must start with '/', got {value:?}")]
    RelativePath { name: &'static str, value: String },

    #[error("server.host must be an IP address, got {0:?}")]
    InvalidHost(String),

    #[error("service {service} URL {url} must use http or https")]
    UnsupportedScheme { service: String, url: String },

    #[error("no services configured")]
    NoServices,

    #[error("invalid service name {0:?}")]
    InvalidServiceName(String),

    #[error("route prefix {0:?} must start with '/' and must not end with '/'")]
    InvalidPrefix(String),

    #[error("duplicate route prefix {0:?}")]
    DuplicatePrefix(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.socket_addr()?;
        if self.proxy.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("proxy.timeout_secs"));
        }
        if self.health_check.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("health_check.timeout_secs"));
        }
        if !self.health_check.path.starts_with('/') {
            return Err(ConfigError::RelativePath {
                name: "health_check.path",
                value: self.health_check.path.clone(),
            });
        }
        if !self.metrics.path.starts_with('/') {
            return Err(ConfigError::RelativePath {
                name: "metrics.path",
                value: self.metrics.path.clone(),
            });
        }
        if self.services.is_empty() {
            return Err(ConfigError::NoServices);
        }

        // Service names become a single path segment under /api.
        for name in self.services.keys() {
            if name.is_empty() || name.contains('/') {
                return Err(ConfigError::InvalidServiceName(name.clone()));
            }
        }

        for (name, urls) in &self.services {
            for url in [&urls.local, &urls.production] {
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ConfigError::UnsupportedScheme {
                        service: name.clone(),
                        url: url.to_string(),
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            let prefix = route.prefix.as_str();
            if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
                return Err(ConfigError::InvalidPrefix(route.prefix.clone()));
            }
            if !seen.insert(prefix) {
                return Err(ConfigError::DuplicatePrefix(route.prefix.clone()));
            }
        }

        Ok(())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_proxy_timeout() -> u64 {
    60
}

fn default_health_timeout() -> u64 {
    5
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// (name, production host, port) for every backend the platform ships.
const GUIDORA_SERVICES: &[(&str, &str, u16)] = &[
    ("ai", "ai-guidance", 5001),
    ("careers", "career-atlas", 5002),
    ("gamification", "gamification", 5003),
    ("simulation", "simulation-service", 5004),
    ("portfolio", "portfolio-service", 5005),
    ("context", "context-service", 5006),
    ("users", "user-service", 5007),
    ("interviews", "mock-interview", 5008),
    ("notifications", "notification-service", 5009),
    ("news", "news-feeds", 5010),
];

pub fn default_services() -> BTreeMap<String, ServiceUrls> {
    GUIDORA_SERVICES
        .iter()
        .filter_map(|(name, host, port)| {
            let local = Url::parse(&format!("http://localhost:{port}")).ok()?;
            let production = Url::parse(&format!("http://{host}:{port}")).ok()?;
            Some((name.to_string(), ServiceUrls { local, production }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.services.len(), GUIDORA_SERVICES.len());
        assert_eq!(config.proxy.timeout(), Duration::from_secs(60));
        assert_eq!(config.health_check.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn service_urls_follow_environment() {
        let services = default_services();
        let users = &services["users"];
        assert_eq!(
            users.for_environment(Environment::Local).as_str(),
            "http://localhost:5007/"
        );
        assert_eq!(
            users.for_environment(Environment::Production).as_str(),
            "http://user-service:5007/"
        );
    }

    #[test]
    fn rejects_zero_timeouts() {
        let mut config = Config::default();
        config.proxy.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout(_))));

        let mut config = Config::default();
        config.health_check.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout(_))));
    }

    #[test]
    fn rejects_bad_route_prefixes() {
        for prefix in ["api/x", "/", "/api/x/"] {
            let mut config = Config::default();
            config.routes.push(RouteConfig {
                prefix: prefix.to_string(),
                service: "ai".to_string(),
            });
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidPrefix(_))),
                "prefix {prefix:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_duplicate_route_prefixes() {
        let mut config = Config::default();
        let route = RouteConfig {
            prefix: "/roadmap".to_string(),
            service: "ai".to_string(),
        };
        config.routes.push(route.clone());
        config.routes.push(route);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicatePrefix(_))
        ));
    }

    #[test]
    fn rejects_host_names_for_bind_address() {
        let mut config = Config::default();
        config.server.host = "localhost".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidHost(_))));

        config.server.host = "127.0.0.1".to_string();
        config.server.port = 8080;
        assert_eq!(
            config.server.socket_addr().unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn rejects_non_http_service_urls() {
        let mut config = Config::default();
        if let Some(users) = config.services.get_mut("users") {
            users.production = Url::parse("ftp://user-service:21").unwrap();
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedScheme { .. })
        ));

        let mut config = Config::default();
        if let Some(ai) = config.services.get_mut("ai") {
            ai.production = Url::parse("https://ai.guidora.dev").unwrap();
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_service_table() {
        let mut config = Config::default();
        config.services.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoServices)));
    }
}
