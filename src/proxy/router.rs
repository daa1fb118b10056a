// src/proxy/router.rs
// Static forwarding rules, evaluated once at startup into route bindings.

use crate::config::Config;
use crate::registry::ServiceRegistry;
use url::Url;

/// Requests under this prefix name their service in the next path segment.
pub const API_PREFIX: &str = "/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRule {
    pub path_prefix: String,
    pub target_service: String,
}

impl ProxyRule {
    pub fn new(path_prefix: impl Into<String>, target_service: impl Into<String>) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            target_service: target_service.into(),
        }
    }

    /// Prefix match on a segment boundary: `/api/users` matches
    /// `/api/users` and `/api/users/...`, never `/api/usersx`.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.path_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Strips the prefix exactly once. The result always starts with `/`.
    pub fn rewrite<'a>(&self, path: &'a str) -> &'a str {
        match path.strip_prefix(self.path_prefix.as_str()) {
            Some("") | None => "/",
            Some(rest) => rest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteBinding {
    pub rule: ProxyRule,
    /// `None` when the rule names a service the registry does not know.
    pub target: Option<Url>,
}

impl RouteBinding {
    pub fn service(&self) -> &str {
        &self.rule.target_service
    }
}

#[derive(Debug, PartialEq)]
pub enum RouteMatch<'a> {
    Bound(&'a RouteBinding),
    /// `/api/<name>/...` with no rule for `<name>`.
    Unconfigured(&'a str),
    NoRoute,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    // Longest prefix first.
    bindings: Vec<RouteBinding>,
}

impl RouteTable {
    pub fn build(config: &Config, registry: &ServiceRegistry) -> Self {
        let mut rules: Vec<ProxyRule> = registry
            .entries()
            .map(|entry| ProxyRule::new(format!("{API_PREFIX}/{}", entry.name), &entry.name))
            .collect();

        for route in &config.routes {
            let rule = ProxyRule::new(&route.prefix, &route.service);
            if let Some(existing) = rules.iter_mut().find(|r| r.path_prefix == rule.path_prefix) {
                tracing::info!(
                    prefix = %rule.path_prefix,
                    service = %rule.target_service,
                    "Configured route overrides default binding"
                );
                *existing = rule;
            } else {
                rules.push(rule);
            }
        }

        let mut bindings: Vec<RouteBinding> = rules
            .into_iter()
            .map(|rule| {
                let target = registry.resolve(&rule.target_service).cloned();
                if target.is_none() {
                    tracing::warn!(
                        prefix = %rule.path_prefix,
                        service = %rule.target_service,
                        "Route targets an unconfigured service; requests will get 503"
                    );
                }
                RouteBinding { rule, target }
            })
            .collect();

        bindings.sort_by(|a, b| b.rule.path_prefix.len().cmp(&a.rule.path_prefix.len()));

        Self { bindings }
    }

    pub fn route<'a>(&'a self, path: &'a str) -> RouteMatch<'a> {
        if let Some(binding) = self.bindings.iter().find(|b| b.rule.matches(path)) {
            return RouteMatch::Bound(binding);
        }

        let service = path
            .strip_prefix(API_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|rest| rest.split('/').next())
            .filter(|segment| !segment.is_empty());

        match service {
            Some(service) => RouteMatch::Unconfigured(service),
            None => RouteMatch::NoRoute,
        }
    }

    pub fn bindings(&self) -> &[RouteBinding] {
        &self.bindings
    }
}
