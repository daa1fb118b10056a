// src/registry/mod.rs
// Static name -> base URL table, resolved once for the configured environment.

use crate::config::{Config, Environment};
use std::collections::BTreeMap;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub name: String,
    pub base_url: Url,
}

#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    environment: Environment,
    entries: BTreeMap<String, ServiceEntry>,
}

impl ServiceRegistry {
    pub fn from_config(config: &Config) -> Self {
        let entries = config
            .services
            .iter()
            .map(|(name, urls)| {
                let entry = ServiceEntry {
                    name: name.clone(),
                    base_url: urls.for_environment(config.environment).clone(),
                };
                (name.clone(), entry)
            })
            .collect::<BTreeMap<_, _>>();

        tracing::info!(
            environment = %config.environment,
            services = entries.len(),
            "Service registry loaded"
        );
        for entry in entries.values() {
            tracing::debug!(service = %entry.name, url = %entry.base_url, "registered service");
        }

        Self {
            environment: config.environment,
            entries,
        }
    }

    /// Base URL for a logical service name, `None` if it is not registered.
    pub fn resolve(&self, name: &str) -> Option<&Url> {
        self.entries.get(name).map(|entry| &entry.base_url)
    }

    /// Every entry, ordered by service name.
    pub fn entries(&self) -> impl Iterator<Item = &ServiceEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }
}

/// `base` with `path` appended to its own path, so `http://h/svc` + `/health`
/// gives `http://h/svc/health`. `path` must start with `/`.
pub fn join_path(base: &Url, path: &str) -> String {
    let mut joined = base[..url::Position::AfterPath]
        .trim_end_matches('/')
        .to_string();
    joined.push_str(path);
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceUrls;

    #[test]
    fn join_path_appends_to_base_path() {
        let base = Url::parse("http://u:1").unwrap();
        assert_eq!(join_path(&base, "/profile/42"), "http://u:1/profile/42");
        assert_eq!(join_path(&base, "/"), "http://u:1/");

        let nested = Url::parse("http://gw.internal/users/").unwrap();
        assert_eq!(join_path(&nested, "/health"), "http://gw.internal/users/health");
    }

    fn config_with(environment: Environment) -> Config {
        let mut config = Config::default();
        config.environment = environment;
        config.services = BTreeMap::from([
            (
                "users".to_string(),
                ServiceUrls {
                    local: Url::parse("http://localhost:5007").unwrap(),
                    production: Url::parse("http://u:1").unwrap(),
                },
            ),
            (
                "ai".to_string(),
                ServiceUrls {
                    local: Url::parse("http://localhost:5001").unwrap(),
                    production: Url::parse("http://a:2").unwrap(),
                },
            ),
        ]);
        config
    }

    #[test]
    fn resolves_production_urls() {
        let registry = ServiceRegistry::from_config(&config_with(Environment::Production));
        assert_eq!(registry.resolve("users").unwrap().as_str(), "http://u:1/");
        assert_eq!(registry.resolve("ai").unwrap().as_str(), "http://a:2/");
        assert_eq!(registry.environment(), Environment::Production);
    }

    #[test]
    fn resolves_local_urls() {
        let registry = ServiceRegistry::from_config(&config_with(Environment::Local));
        assert_eq!(
            registry.resolve("users").unwrap().as_str(),
            "http://localhost:5007/"
        );
    }

    #[test]
    fn unknown_name_is_none() {
        let registry = ServiceRegistry::from_config(&config_with(Environment::Local));
        assert!(registry.resolve("unknown").is_none());
        assert!(registry.resolve("").is_none());
    }

    #[test]
    fn resolve_is_stable() {
        let registry = ServiceRegistry::from_config(&config_with(Environment::Production));
        let first = registry.resolve("users").cloned();
        for _ in 0..10 {
            assert_eq!(registry.resolve("users").cloned(), first);
        }
    }

    #[test]
    fn entries_are_sorted_by_name() {
        let registry = ServiceRegistry::from_config(&config_with(Environment::Local));
        let names: Vec<_> = registry.entries().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["ai", "users"]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }
}
