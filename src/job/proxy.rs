//! Reverse-proxy routing tags.
//!
//! Services registered by a compiled job carry `key=value` tags that the
//! Traefik catalog provider turns into live routers. Generation is purely
//! textual and deterministic for a given [`ProxySpec`] (custom labels are
//! emitted in key order).
//!
//! # Example
//!
//! ```rust,ignore
//! let spec = ProxySpec::for_host("app.example.com")
//!     .with_ssl(Some("letsencrypt"))
//!     .with_path_prefix("/api");
//! let tags = spec.tags("app", "http");
//! ```

use std::collections::BTreeMap;

/// Tag carried by every registered service, routed or not.
pub const DEPLOYMENT_TAG: &str = "deployment";
pub const DEFAULT_ENTRYPOINT: &str = "web";
pub const SECURE_ENTRYPOINT: &str = "websecure";
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/";
pub const DEFAULT_HEALTH_CHECK_INTERVAL: &str = "30s";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySpec {
    pub enable: bool,
    /// Domain matched by the routers. Without it no router is emitted.
    pub host: String,
    /// Entrypoint of the plain router, `web` when unset.
    pub entrypoint: Option<String>,
    pub enable_ssl: bool,
    /// Host matched by the secure router, falls back to `host`.
    pub ssl_host: Option<String>,
    /// Without a resolver TLS is still enabled, just resolver-less.
    pub cert_resolver: Option<String>,
    pub health_check_path: Option<String>,
    /// Interval of the load-balancer health check, `30s` when unset.
    pub health_check_interval: Option<String>,
    pub path_prefix: Option<String>,
    /// Applied to every router in order.
    pub middlewares: Vec<String>,
    /// Passed through verbatim as `key=value` tags.
    pub custom_labels: BTreeMap<String, String>,
}

fn host_rule(host: &str) -> String {
    format!("Host(`{host}`)")
}

fn host_and_prefix_rule(host: &str, prefix: &str) -> String {
    format!("Host(`{host}`) && PathPrefix(`{prefix}`)")
}

impl ProxySpec {
    /// An enabled spec routing `host` with the usual defaults: entrypoint
    /// `web` and a `/` health check every `30s`.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            enable: true,
            host: host.into(),
            entrypoint: Some(DEFAULT_ENTRYPOINT.to_string()),
            health_check_path: Some(DEFAULT_HEALTH_CHECK_PATH.to_string()),
            health_check_interval: Some(DEFAULT_HEALTH_CHECK_INTERVAL.to_string()),
            ..Self::default()
        }
    }

    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    pub fn with_ssl(mut self, cert_resolver: Option<&str>) -> Self {
        self.enable_ssl = true;
        self.cert_resolver = cert_resolver.map(str::to_string);
        self
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn with_middlewares<I, S>(mut self, middlewares: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middlewares = middlewares.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_health_check(
        mut self,
        path: impl Into<String>,
        interval: impl Into<String>,
    ) -> Self {
        self.health_check_path = Some(path.into());
        self.health_check_interval = Some(interval.into());
        self
    }

    /// Merges `labels` into the custom labels, overwriting existing keys.
    pub fn with_custom_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.custom_labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Builds the tags for the service `service_name`, whose dynamic port is
    /// registered under `port_label`.
    ///
    /// With a path prefix the router rule tag is emitted twice, first with the
    /// bare host rule and then with the combined rule. Traefik keeps the last
    /// value for a key, so the combined rule wins.
    pub fn tags(&self, service_name: &str, port_label: &str) -> Vec<String> {
        if !self.enable {
            return vec![DEPLOYMENT_TAG.to_string()];
        }

        let mut tags = vec![DEPLOYMENT_TAG.to_string(), "traefik.enable=true".to_string()];
        let middlewares = (!self.middlewares.is_empty()).then(|| self.middlewares.join(","));

        if !self.host.is_empty() {
            let entrypoint = self
                .entrypoint
                .as_deref()
                .filter(|e| !e.is_empty())
                .unwrap_or(DEFAULT_ENTRYPOINT);
            self.push_router(
                &mut tags,
                service_name,
                &self.host,
                entrypoint,
                middlewares.as_deref(),
            );
        }

        if self.enable_ssl && !self.host.is_empty() {
            let router = format!("{service_name}-secure");
            let ssl_host = self
                .ssl_host
                .as_deref()
                .filter(|h| !h.is_empty())
                .unwrap_or(&self.host);
            self.push_router(&mut tags, &router, ssl_host, SECURE_ENTRYPOINT, None);
            match self.cert_resolver.as_deref().filter(|r| !r.is_empty()) {
                Some(resolver) => tags.push(format!(
                    "traefik.http.routers.{router}.tls.certresolver={resolver}"
                )),
                None => tags.push(format!("traefik.http.routers.{router}.tls=true")),
            }
            if let Some(middlewares) = &middlewares {
                tags.push(format!(
                    "traefik.http.routers.{router}.middlewares={middlewares}"
                ));
            }
        }

        tags.push(format!(
            "traefik.http.services.{service_name}.loadbalancer.server.port=${{NOMAD_PORT_{port_label}}}"
        ));

        if let Some(path) = self.health_check_path.as_deref().filter(|p| !p.is_empty()) {
            let interval = self
                .health_check_interval
                .as_deref()
                .filter(|i| !i.is_empty())
                .unwrap_or(DEFAULT_HEALTH_CHECK_INTERVAL);
            tags.push(format!(
                "traefik.http.services.{service_name}.loadbalancer.healthcheck.path={path}"
            ));
            tags.push(format!(
                "traefik.http.services.{service_name}.loadbalancer.healthcheck.interval={interval}"
            ));
        }

        tags.extend(self.custom_labels.iter().map(|(k, v)| format!("{k}={v}")));
        tags
    }

    /// Rule, entrypoint, optional prefix override and optional middlewares of
    /// one router.
    fn push_router(
        &self,
        tags: &mut Vec<String>,
        router: &str,
        host: &str,
        entrypoint: &str,
        middlewares: Option<&str>,
    ) {
        tags.push(format!(
            "traefik.http.routers.{router}.rule={}",
            host_rule(host)
        ));
        tags.push(format!(
            "traefik.http.routers.{router}.entrypoints={entrypoint}"
        ));
        if let Some(prefix) = self.path_prefix.as_deref().filter(|p| !p.is_empty()) {
            tags.push(format!(
                "traefik.http.routers.{router}.rule={}",
                host_and_prefix_rule(host, prefix)
            ));
        }
        if let Some(middlewares) = middlewares {
            tags.push(format!(
                "traefik.http.routers.{router}.middlewares={middlewares}"
            ));
        }
    }
}
