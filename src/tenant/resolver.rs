//! Tenant Resolver
//!
//! Derives a tenant key from request headers. An explicit tenant header
//! always wins over the host name, so tests and server-to-server calls can
//! address a tenant without a DNS-shaped host.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::net::IpAddr;
use tracing::trace;

use crate::config::{DEFAULT_TENANT_HEADER, ResolverConfig};

/// Read access to request headers, matched case-insensitively
pub trait HeaderSource {
    /// Value of the header called `name`, if present
    fn header(&self, name: &str) -> Option<&str>;
}

fn find_header<'a, K, V, I>(pairs: I, name: &str) -> Option<&'a str>
where
    K: AsRef<str> + 'a,
    V: AsRef<str> + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    pairs
        .into_iter()
        .find(|(key, _)| key.as_ref().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_ref())
}

impl<K, V, S> HeaderSource for HashMap<K, V, S>
where
    K: AsRef<str>,
    V: AsRef<str>,
    S: BuildHasher,
{
    fn header(&self, name: &str) -> Option<&str> {
        find_header(self.iter(), name)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> HeaderSource for BTreeMap<K, V> {
    fn header(&self, name: &str) -> Option<&str> {
        find_header(self.iter(), name)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> HeaderSource for [(K, V)] {
    fn header(&self, name: &str) -> Option<&str> {
        find_header(self.iter().map(|(k, v)| (k, v)), name)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> HeaderSource for Vec<(K, V)> {
    fn header(&self, name: &str) -> Option<&str> {
        self.as_slice().header(name)
    }
}

/// Maps request headers to a tenant key
///
/// ```rust
/// use storefront_tenancy::TenantResolver;
///
/// let resolver = TenantResolver::default();
/// let headers = [("host", "shop.example.com")];
/// assert_eq!(resolver.resolve(&headers[..]), Some("shop".to_string()));
/// ```
#[derive(Debug, Clone)]
pub struct TenantResolver {
    tenant_header: String,
}

impl Default for TenantResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TENANT_HEADER)
    }
}

impl TenantResolver {
    /// Resolver honouring `tenant_header` as the explicit override
    pub fn new(tenant_header: impl Into<String>) -> Self {
        Self {
            tenant_header: tenant_header.into(),
        }
    }

    /// Resolver built from configuration
    #[must_use]
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(config.tenant_header.clone())
    }

    /// Name of the explicit tenant header
    #[must_use]
    pub fn tenant_header(&self) -> &str {
        &self.tenant_header
    }

    /// Tenant key for a request, `None` for the default store
    ///
    /// 1. A non-empty explicit tenant header is the key, verbatim.
    /// 2. Otherwise the host (port stripped) is split on `.`:
    ///    - more than two labels: the first label (`shop.example.com` → `shop`)
    ///    - two labels under `localhost`: the first label (`shop.localhost` → `shop`)
    ///    - anything else, including bare domains and IP literals: no tenant
    pub fn resolve<H>(&self, headers: &H) -> Option<String>
    where
        H: HeaderSource + ?Sized,
    {
        if let Some(explicit) = headers
            .header(&self.tenant_header)
            .filter(|value| !value.trim().is_empty())
        {
            trace!(tenant = %explicit, "Tenant from explicit header");
            return Some(explicit.to_string());
        }

        let tenant = headers.header("host").and_then(tenant_from_host);
        trace!(tenant = ?tenant, "Tenant from host");
        tenant
    }
}

/// Tenant label of a `Host` header value
#[must_use]
pub fn tenant_from_host(host: &str) -> Option<String> {
    let host = host.trim();
    // Bracketed IPv6 literal, with or without a port
    if host.starts_with('[') {
        return None;
    }
    let hostname = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
    if hostname.is_empty() || hostname.parse::<IpAddr>().is_ok() {
        return None;
    }

    let labels: Vec<&str> = hostname.split('.').collect();
    match labels.as_slice() {
        [first, _, _, ..] if !first.is_empty() => Some((*first).to_string()),
        [first, "localhost"] if !first.is_empty() && *first != "localhost" => {
            Some((*first).to_string())
        }
        _ => None,
    }
}
