//! Scope normalization
//!
//! Pure conversions of the platform's scope payloads into cache records and
//! into a Burp Suite target-scope document. Nothing here touches the store.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::records::IpRecord;

/// Smallest IPv4 prefix that is expanded. A /8 is 16M addresses.
const MIN_IPV4_PREFIX: u8 = 8;
/// Smallest IPv6 prefix that is expanded, same address budget as IPv4
const MIN_IPV6_PREFIX: u8 = 104;

/// Scheme reported when neither the rule nor its location gave one
const ANY_SCHEME: &str = "any";

/// One web asset rule as listed by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAsset {
    /// `"in"` for in-scope, anything else is out of scope
    pub status: String,
    #[serde(default)]
    pub listing: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub rule: String,
}

impl WebAsset {
    pub fn is_in_scope(&self) -> bool {
        self.status == "in"
    }
}

/// Burp Suite project-options target scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurpScope {
    pub scope: BurpTargetScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurpTargetScope {
    pub advanced_mode: bool,
    pub include: Vec<BurpRule>,
    pub exclude: Vec<BurpRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurpRule {
    pub enabled: bool,
    pub scheme: String,
    pub host: String,
    pub file: String,
}

/// In-scope locations of one listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebScopeListing {
    pub target: String,
    pub urls: Vec<ScopeUrl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeUrl {
    pub url: String,
}

/// Expand every CIDR block or bare address into one record per address.
///
/// Network and broadcast addresses are included. Any malformed entry fails
/// the whole call, as does a block with host bits set.
pub fn build_scope_host_db<S: AsRef<str>>(target_slug: &str, cidrs: &[S]) -> Result<Vec<IpRecord>> {
    let mut records = Vec::new();
    for cidr in cidrs {
        let network = parse_block(cidr.as_ref())?;
        records.extend(
            network
                .iter()
                .map(|ip| IpRecord::new(target_slug, ip.to_string())),
        );
    }
    Ok(records)
}

fn parse_block(input: &str) -> Result<IpNetwork> {
    let invalid = |reason: String| CacheError::InvalidAddress {
        input: input.to_string(),
        reason,
    };

    let network: IpNetwork = input.trim().parse().map_err(|e| invalid(format!("{e}")))?;

    if network.ip() != network.network() {
        return Err(invalid(format!("host bits set, block starts at {}", network.network())));
    }

    let (min_prefix, family) = match network {
        IpNetwork::V4(_) => (MIN_IPV4_PREFIX, "IPv4"),
        IpNetwork::V6(_) => (MIN_IPV6_PREFIX, "IPv6"),
    };
    if network.prefix() < min_prefix {
        return Err(invalid(format!(
            "size limit: well-formed, but /{} is wider than the {family} enumeration limit of /{min_prefix}",
            network.prefix()
        )));
    }

    Ok(network)
}

/// Turn web asset rules into a Burp include/exclude tree, keeping input order
pub fn build_scope_web_burp(assets: &[WebAsset]) -> BurpScope {
    let mut include = Vec::new();
    let mut exclude = Vec::new();

    for asset in assets {
        let rule = burp_rule(asset);
        if asset.is_in_scope() {
            include.push(rule);
        } else {
            exclude.push(rule);
        }
    }

    BurpScope {
        scope: BurpTargetScope {
            advanced_mode: true,
            include,
            exclude,
        },
    }
}

fn burp_rule(asset: &WebAsset) -> BurpRule {
    let stripped = asset.rule.trim_matches(|c| c == '*' || c == '.');
    let mut parts = UrlParts::parse(stripped);

    if parts.host.is_empty() {
        let scheme = UrlParts::parse(&asset.location).scheme;
        if !scheme.is_empty() {
            parts = match url::Url::parse(&format!("{scheme}://{stripped}")) {
                Ok(u) => UrlParts::from_url(&u),
                Err(_) => UrlParts {
                    scheme,
                    host: String::new(),
                    path: stripped.to_string(),
                },
            };
        }
    }

    BurpRule {
        enabled: !parts.host.is_empty(),
        scheme: if parts.scheme.is_empty() {
            ANY_SCHEME.to_string()
        } else {
            parts.scheme
        },
        host: parts.host,
        file: parts.path,
    }
}

/// The pieces of a URL the scope tree cares about. Input that does not
/// parse as an absolute URL is kept whole as the path.
struct UrlParts {
    scheme: String,
    host: String,
    path: String,
}

impl UrlParts {
    fn from_url(u: &url::Url) -> Self {
        Self {
            scheme: u.scheme().to_string(),
            host: u.host_str().unwrap_or_default().to_string(),
            path: u.path().to_string(),
        }
    }

    fn parse(input: &str) -> Self {
        match url::Url::parse(input) {
            Ok(u) => Self::from_url(&u),
            Err(_) => Self {
                scheme: String::new(),
                host: String::new(),
                path: input.to_string(),
            },
        }
    }
}

/// Group in-scope locations by listing, first-seen order, duplicates kept
pub fn build_scope_web_db(assets: &[WebAsset]) -> Vec<WebScopeListing> {
    let mut listings: Vec<WebScopeListing> = Vec::new();

    for asset in assets.iter().filter(|a| a.is_in_scope()) {
        let url = ScopeUrl {
            url: asset.location.clone(),
        };
        match listings.iter_mut().find(|l| l.target == asset.listing) {
            Some(listing) => listing.urls.push(url),
            None => listings.push(WebScopeListing {
                target: asset.listing.clone(),
                urls: vec![url],
            }),
        }
    }

    listings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn asset(status: &str, listing: &str, location: &str, rule: &str) -> WebAsset {
        WebAsset {
            status: status.to_string(),
            listing: listing.to_string(),
            location: location.to_string(),
            rule: rule.to_string(),
        }
    }

    #[test]
    fn test_host_db_slash_31() {
        let records = build_scope_host_db("T1", &["10.0.0.0/31"]).unwrap();
        assert_eq!(
            serde_json::to_value(&records).unwrap(),
            json!([
                {"target": "T1", "ip": "10.0.0.0"},
                {"target": "T1", "ip": "10.0.0.1"}
            ])
        );
    }

    #[test]
    fn test_host_db_includes_network_and_broadcast() {
        let records = build_scope_host_db("T1", &["192.168.1.0/30", "8.8.8.8"]).unwrap();
        let ips: Vec<&str> = records.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(
            ips,
            vec!["192.168.1.0", "192.168.1.1", "192.168.1.2", "192.168.1.3", "8.8.8.8"]
        );
    }

    #[test]
    fn test_host_db_ipv6() {
        let records = build_scope_host_db("T1", &["2001:db8::/127".to_string()]).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].ip, "2001:db8::1");
    }

    #[test]
    fn test_host_db_rejects_malformed() {
        for bad in ["10.0.0.256/32", "not-an-ip", "10.0.0.0/33", "10.0.0.1/24"] {
            let err = build_scope_host_db("T1", &[bad]).unwrap_err();
            assert!(
                matches!(err, CacheError::InvalidAddress { ref input, .. } if input == bad),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_host_db_size_limit() {
        for wide in ["10.0.0.0/4", "2001:db8::/64"] {
            match build_scope_host_db("T1", &[wide]).unwrap_err() {
                CacheError::InvalidAddress { input, reason } => {
                    assert_eq!(input, wide);
                    assert!(reason.starts_with("size limit"), "{reason}");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_web_burp() {
        let assets = [
            asset("in", "L1", "https://good.stuff.com", "*.stuff.com/*"),
            asset("out", "L1", "http://evil.stuff.com", "*.evil.stuff.com/login/*"),
        ];

        let scope = build_scope_web_burp(&assets);
        assert_eq!(
            serde_json::to_value(&scope).unwrap(),
            json!({
                "scope": {
                    "advanced_mode": true,
                    "include": [
                        {"enabled": true, "scheme": "https", "host": "stuff.com", "file": "/"}
                    ],
                    "exclude": [
                        {"enabled": true, "scheme": "http", "host": "evil.stuff.com", "file": "/login/"}
                    ]
                }
            })
        );
    }

    #[test]
    fn test_web_burp_absolute_rule_skips_location() {
        let assets = [asset("in", "L1", "http://other.com", "https://api.stuff.com/v1/*")];
        let rule = &build_scope_web_burp(&assets).scope.include[0];
        assert_eq!(rule.scheme, "https");
        assert_eq!(rule.host, "api.stuff.com");
        assert_eq!(rule.file, "/v1/");
    }

    #[test]
    fn test_web_burp_unresolvable_rule() {
        let assets = [asset("maybe", "L1", "", "*.stuff.com/*")];
        let scope = build_scope_web_burp(&assets);
        assert!(scope.scope.include.is_empty());

        let rule = &scope.scope.exclude[0];
        assert!(!rule.enabled);
        assert_eq!(rule.scheme, "any");
        assert_eq!(rule.host, "");
    }

    #[test]
    fn test_web_burp_bare_wildcard_keeps_location_scheme() {
        let assets = [asset("in", "L1", "https://x.com", "*")];
        let rule = &build_scope_web_burp(&assets).scope.include[0];
        assert!(!rule.enabled);
        assert_eq!(rule.scheme, "https");
        assert_eq!(rule.host, "");
        assert_eq!(rule.file, "");
    }

    #[test]
    fn test_web_db_groups_without_dedup() {
        let assets = [
            asset("in", "L1", "https://a.stuff.com", "*.stuff.com"),
            asset("in", "L2", "https://b.stuff.com", "b.stuff.com"),
            asset("out", "L3", "https://c.stuff.com", "c.stuff.com"),
            asset("in", "L1", "https://a.stuff.com", "*.stuff.com"),
        ];

        let listings = build_scope_web_db(&assets);
        assert_eq!(
            serde_json::to_value(&listings).unwrap(),
            json!([
                {"target": "L1", "urls": [
                    {"url": "https://a.stuff.com"},
                    {"url": "https://a.stuff.com"}
                ]},
                {"target": "L2", "urls": [{"url": "https://b.stuff.com"}]}
            ])
        );
    }

    #[test]
    fn test_web_asset_from_platform_json() {
        let asset: WebAsset = serde_json::from_value(json!({
            "status": "in",
            "listing": "uwhe8a7h",
            "location": "https://good.stuff.com",
            "rule": "*.stuff.com/*",
            "id": 1234
        }))
        .unwrap();
        assert!(asset.is_in_scope());
    }
}
