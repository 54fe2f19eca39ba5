//! Destination policy for outbound requests.
//!
//! Upstream tool calls, spec downloads and override fetches all leave through
//! [`ReqwestTransport`](crate::ReqwestTransport), which asks the [`OutboundPolicy`] about the
//! destination before connecting and again on every redirect hop.

use crate::transport::TransportError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::net::lookup_host;
use url::Url;

pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// What kind of network an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClass {
    Public,
    Loopback,
    Private,
    /// Includes cloud metadata endpoints such as `169.254.169.254`.
    LinkLocal,
    /// Carrier-grade NAT, `100.64.0.0/10`.
    SharedNat,
    Multicast,
    Unspecified,
    /// Broadcast and `240.0.0.0/4`.
    Reserved,
}

impl AddressClass {
    #[must_use]
    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Self::of_v4(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => Self::of_v4(v4),
                None => Self::of_v6(v6),
            },
        }
    }

    fn of_v4(ip: Ipv4Addr) -> Self {
        let [a, b, ..] = ip.octets();
        if ip.is_loopback() {
            Self::Loopback
        } else if ip.is_private() {
            Self::Private
        } else if ip.is_link_local() {
            Self::LinkLocal
        } else if a == 100 && (64..=127).contains(&b) {
            Self::SharedNat
        } else if ip.is_multicast() {
            Self::Multicast
        } else if ip.is_unspecified() {
            Self::Unspecified
        } else if ip.is_broadcast() || a >= 240 {
            Self::Reserved
        } else {
            Self::Public
        }
    }

    fn of_v6(ip: Ipv6Addr) -> Self {
        if ip.is_loopback() {
            Self::Loopback
        } else if ip.is_unique_local() {
            Self::Private
        } else if ip.is_unicast_link_local() {
            Self::LinkLocal
        } else if ip.is_multicast() {
            Self::Multicast
        } else if ip.is_unspecified() {
            Self::Unspecified
        } else {
            Self::Public
        }
    }

    #[must_use]
    pub fn is_public(self) -> bool {
        self == Self::Public
    }

    fn label(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Loopback => "loopback",
            Self::Private => "private",
            Self::LinkLocal => "link-local",
            Self::SharedNat => "shared NAT",
            Self::Multicast => "multicast",
            Self::Unspecified => "unspecified",
            Self::Reserved => "reserved",
        }
    }
}

/// One allow-list entry: `api.example.com` or `*.example.com`.
///
/// A wildcard matches subdomains only, not the bare domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    Subdomains(String),
}

impl HostPattern {
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().trim_end_matches('.').to_ascii_lowercase();
        match pattern.strip_prefix("*.") {
            Some(domain) => Self::Subdomains(domain.to_string()),
            None => Self::Exact(pattern),
        }
    }

    #[must_use]
    pub fn matches(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        match self {
            Self::Exact(h) => host == *h,
            Self::Subdomains(domain) => host
                .strip_suffix(domain.as_str())
                .is_some_and(|head| head.len() > 1 && head.ends_with('.')),
        }
    }
}

/// Where outbound requests may go and how much they may bring back.
///
/// The default blocks non-public addresses, caps bodies at 1 MiB and does not follow
/// redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPolicy {
    /// Empty allows every host.
    pub allowed_hosts: Vec<HostPattern>,
    pub allow_private_networks: bool,
    /// `None` reads bodies of any size.
    pub max_response_bytes: Option<usize>,
    /// `0` hands 3xx responses back to the caller.
    pub max_redirects: usize,
}

impl Default for OutboundPolicy {
    fn default() -> Self {
        Self {
            allowed_hosts: Vec::new(),
            allow_private_networks: false,
            max_response_bytes: Some(DEFAULT_MAX_RESPONSE_BYTES),
            max_redirects: 0,
        }
    }
}

impl OutboundPolicy {
    /// Any host and address, no size limit. For local upstreams and tests.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self {
            allowed_hosts: Vec::new(),
            allow_private_networks: true,
            max_response_bytes: None,
            max_redirects: 5,
        }
    }

    #[must_use]
    pub fn with_allowed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_hosts = hosts
            .into_iter()
            .map(|h| HostPattern::parse(h.as_ref()))
            .collect();
        self
    }

    /// Checks that need no DNS: scheme, allow-list and IP literals.
    ///
    /// Redirect hops are checked with this alone.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Blocked`] when the URL is not allowed.
    pub fn check_url(&self, url: &Url) -> Result<(), TransportError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::Blocked(format!(
                "scheme '{}' is not allowed",
                url.scheme()
            )));
        }
        let Some(host) = url.host_str() else {
            return Err(TransportError::Blocked("URL has no host".to_string()));
        };
        if !self.allowed_hosts.is_empty() && !self.allowed_hosts.iter().any(|p| p.matches(host))
        {
            return Err(TransportError::Blocked(format!(
                "host '{host}' is not in the allow-list"
            )));
        }
        if let Some(ip) = host_ip(url) {
            self.check_ip(host, ip)?;
        }
        Ok(())
    }

    /// [`Self::check_url`] plus resolution of hostnames, so a public name pointing at a
    /// private address is refused too.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Blocked`] for disallowed destinations and
    /// [`TransportError::Connect`] when the name does not resolve.
    pub async fn check_destination(&self, url: &Url) -> Result<(), TransportError> {
        self.check_url(url)?;
        if self.allow_private_networks || host_ip(url).is_some() {
            return Ok(());
        }
        let Some(host) = url.host_str() else {
            return Ok(());
        };
        let port = url.port_or_known_default().unwrap_or(443);
        let mut addrs = lookup_host((host, port))
            .await
            .map_err(|e| TransportError::Connect(format!("cannot resolve '{host}': {e}")))?
            .peekable();
        if addrs.peek().is_none() {
            return Err(TransportError::Connect(format!(
                "'{host}' resolved to no addresses"
            )));
        }
        addrs.try_for_each(|addr| self.check_ip(host, addr.ip()))
    }

    fn check_ip(&self, host: &str, ip: IpAddr) -> Result<(), TransportError> {
        let class = AddressClass::of(ip);
        if self.allow_private_networks || class.is_public() {
            return Ok(());
        }
        Err(TransportError::Blocked(format!(
            "'{host}' is a {} address ({ip})",
            class.label()
        )))
    }

    /// The redirect policy a `reqwest` client should use under this policy.
    #[must_use]
    pub fn redirect_policy(&self) -> reqwest::redirect::Policy {
        if self.max_redirects == 0 {
            return reqwest::redirect::Policy::none();
        }
        let policy = self.clone();
        reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > policy.max_redirects {
                return attempt.error(TransportError::Blocked(format!(
                    "more than {} redirects",
                    policy.max_redirects
                )));
            }
            match policy.check_url(attempt.url()) {
                Ok(()) => attempt.follow(),
                Err(e) => attempt.error(e),
            }
        })
    }
}

fn host_ip(url: &Url) -> Option<IpAddr> {
    match url.host()? {
        url::Host::Ipv4(v4) => Some(IpAddr::V4(v4)),
        url::Host::Ipv6(v6) => Some(IpAddr::V6(v6)),
        url::Host::Domain(_) => None,
    }
}

/// The URL without credentials, query or fragment, for logs and error messages.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut shown = url.clone();
    let _ = shown.set_username("");
    let _ = shown.set_password(None);
    shown.set_query(None);
    shown.set_fragment(None);
    shown.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let message = e.to_string();
    match e.url() {
        Some(url) => message.replace(url.as_str(), &redact_url(url)),
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn classifies_addresses() {
        let cases = [
            ("127.0.0.1", AddressClass::Loopback),
            ("10.1.2.3", AddressClass::Private),
            ("192.168.0.10", AddressClass::Private),
            ("169.254.169.254", AddressClass::LinkLocal),
            ("100.100.0.1", AddressClass::SharedNat),
            ("224.0.0.1", AddressClass::Multicast),
            ("0.0.0.0", AddressClass::Unspecified),
            ("255.255.255.255", AddressClass::Reserved),
            ("250.1.1.1", AddressClass::Reserved),
            ("93.184.216.34", AddressClass::Public),
            ("::1", AddressClass::Loopback),
            ("fd00::1", AddressClass::Private),
            ("fe80::1", AddressClass::LinkLocal),
            ("::ffff:127.0.0.1", AddressClass::Loopback),
            ("2606:4700::1111", AddressClass::Public),
        ];
        for (ip, class) in cases {
            assert_eq!(AddressClass::of(ip.parse().unwrap()), class, "{ip}");
        }
    }

    #[test]
    fn wildcard_matches_subdomains_only() {
        let pattern = HostPattern::parse("*.Example.com");
        assert!(pattern.matches("api.example.com"));
        assert!(pattern.matches("a.b.EXAMPLE.com."));
        assert!(!pattern.matches("example.com"));
        assert!(!pattern.matches("badexample.com"));
        assert!(HostPattern::parse("api.example.com").matches("API.example.com"));
    }

    #[test]
    fn default_policy_refuses_private_literals() {
        let policy = OutboundPolicy::default();
        let err = policy.check_url(&url("http://169.254.169.254/latest")).unwrap_err();
        assert!(matches!(err, TransportError::Blocked(_)));
        assert!(err.to_string().contains("link-local"), "{err}");
        let err = policy.check_url(&url("http://[::1]:8080/")).unwrap_err();
        assert!(err.to_string().contains("loopback"), "{err}");
        policy.check_url(&url("https://93.184.216.34/")).unwrap();
    }

    #[test]
    fn scheme_and_allow_list_apply_even_when_unrestricted() {
        let policy = OutboundPolicy::unrestricted();
        assert!(policy.check_url(&url("file:///etc/passwd")).is_err());

        let policy = policy.with_allowed_hosts(["*.example.com", "127.0.0.1"]);
        policy.check_url(&url("https://api.example.com/v1")).unwrap();
        policy.check_url(&url("http://127.0.0.1:9/")).unwrap();
        let err = policy.check_url(&url("https://other.org/")).unwrap_err();
        assert!(err.to_string().contains("allow-list"));
    }

    #[tokio::test]
    async fn destination_check_resolves_names() {
        let err = OutboundPolicy::default()
            .check_destination(&url("http://localhost:1/"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Blocked(_)), "{err:?}");

        OutboundPolicy::unrestricted()
            .check_destination(&url("http://localhost:1/"))
            .await
            .unwrap();
    }

    #[test]
    fn redact_url_drops_credentials_and_query() {
        let u = url("https://user:pw@api.example.com/pets?api_key=secret#frag");
        assert_eq!(redact_url(&u), "https://api.example.com/pets");
    }
}
