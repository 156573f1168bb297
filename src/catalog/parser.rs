//! Service declaration parsing.
//!
//! The catalog string is a YAML sequence of mappings. Each entry is
//! deserialized on its own so that a failure can point at the fragment
//! that caused it.

use std::collections::HashSet;
use std::net::IpAddr;

use serde::Deserialize;
use serde_yaml::Value;

use crate::catalog::service::{Service, ServiceCatalog, WILDCARD_HOSTS};
use crate::catalog::CatalogError;

const FRAGMENT_LIMIT: usize = 200;

/// Option lists may be written as one comma-separated string or as a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenList {
    Text(String),
    List(Vec<String>),
}

/// Ports may be written as integers or as quoted numbers (`'88'`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Int(i64),
    Text(String),
}

impl PortValue {
    fn to_port(&self) -> Result<u16, String> {
        let port = match self {
            PortValue::Int(n) => u16::try_from(*n).ok(),
            PortValue::Text(text) => text.trim().parse::<u16>().ok(),
        };
        port.filter(|p| *p != 0).ok_or_else(|| match self {
            PortValue::Int(n) => format!("port {} is outside 1-65535", n),
            PortValue::Text(text) => format!("port `{}` is not a number in 1-65535", text),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawService {
    #[serde(alias = "name")]
    service_name: String,
    #[serde(alias = "host")]
    service_host: String,
    #[serde(alias = "port")]
    service_port: PortValue,
    #[serde(default, alias = "options")]
    service_options: Option<TokenList>,
    #[serde(default)]
    server_options: Option<TokenList>,
}

impl RawService {
    fn into_service(self) -> Result<Service, String> {
        let name = self.service_name.trim().to_string();
        if name.is_empty() {
            return Err("service name is empty".to_string());
        }
        if name.chars().any(char::is_whitespace) {
            return Err(format!("service name `{}` contains whitespace", name));
        }

        let host = self.service_host.trim().to_string();
        if !is_listen_host(&host) {
            return Err(format!(
                "host `{}` is neither an IP literal nor a wildcard",
                host
            ));
        }

        let port = self.service_port.to_port()?;

        let options = match self.service_options {
            None => Vec::new(),
            Some(TokenList::Text(text)) => tokenize_options(&text)?,
            Some(TokenList::List(items)) => {
                let mut options = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let item = item.trim();
                    if item.is_empty() {
                        return Err(format!("option {} is empty", i + 1));
                    }
                    options.push(item.to_string());
                }
                options
            }
        };

        if let Some(bad) = options.iter().find(|o| has_line_break(o)) {
            return Err(format!("option `{}` spans multiple lines", bad.escape_default()));
        }

        let server_options = match self.server_options {
            None => String::new(),
            Some(TokenList::Text(text)) => text.trim().to_string(),
            Some(TokenList::List(items)) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        };

        if has_line_break(&server_options) {
            return Err("server_options span multiple lines".to_string());
        }

        Ok(Service {
            name,
            host,
            port,
            options,
            server_options,
        })
    }
}

/// Parse a catalog string into an ordered, name-unique catalog.
///
/// An empty or whitespace-only string yields an empty catalog.
pub fn parse_catalog(input: &str) -> Result<ServiceCatalog, CatalogError> {
    if input.trim().is_empty() {
        return Ok(ServiceCatalog::default());
    }

    let document: Value = serde_yaml::from_str(input).map_err(|e| CatalogError::Parse {
        fragment: truncate(input.trim()),
        reason: e.to_string(),
    })?;

    let entries = match document {
        Value::Null => return Ok(ServiceCatalog::default()),
        Value::Sequence(entries) => entries,
        other => {
            return Err(CatalogError::Parse {
                fragment: fragment_of(&other),
                reason: "expected a list of service declarations".to_string(),
            })
        }
    };

    let mut services = Vec::with_capacity(entries.len());
    let mut seen = HashSet::new();

    for entry in entries {
        let fragment = fragment_of(&entry);
        let raw: RawService = serde_yaml::from_value(entry).map_err(|e| CatalogError::Parse {
            fragment: fragment.clone(),
            reason: e.to_string(),
        })?;
        let service = raw
            .into_service()
            .map_err(|reason| CatalogError::Parse { fragment, reason })?;

        if !seen.insert(service.name.clone()) {
            return Err(CatalogError::DuplicateService(service.name));
        }
        services.push(service);
    }

    Ok(ServiceCatalog::from_services(services))
}

/// Split a comma-separated option string into trimmed, non-empty tokens.
pub fn tokenize_options(text: &str) -> Result<Vec<String>, String> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .enumerate()
        .map(|(i, token)| {
            let token = token.trim();
            if token.is_empty() {
                Err(format!("empty option token at position {}", i + 1))
            } else {
                Ok(token.to_string())
            }
        })
        .collect()
}

fn is_listen_host(host: &str) -> bool {
    WILDCARD_HOSTS.contains(&host) || host.parse::<IpAddr>().is_ok()
}

fn has_line_break(text: &str) -> bool {
    text.contains(['\n', '\r'])
}

fn fragment_of(value: &Value) -> String {
    let text = serde_yaml::to_string(value).unwrap_or_default();
    let flat = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    truncate(&flat)
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= FRAGMENT_LIMIT {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(FRAGMENT_LIMIT).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_services_in_declaration_order() {
        let input = r#"
- service_name: web
  service_host: 0.0.0.0
  service_port: 80
  service_options: "mode http, balance leastconn"
  server_options: "check inter 2000"
- name: api
  host: 10.0.0.1
  port: 8080
  options: [mode tcp]
  server_options: [maxconn 25, check]
"#;
        let catalog = parse_catalog(input).unwrap();
        let names: Vec<_> = catalog.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["web", "api"]);

        let web = catalog.get("web").unwrap();
        assert_eq!(web.options, vec!["mode http", "balance leastconn"]);
        assert_eq!(web.server_options, "check inter 2000");
        assert_eq!(web.bind_address(), "0.0.0.0:80");

        let api = catalog.get("api").unwrap();
        assert_eq!(api.options, vec!["mode tcp"]);
        assert_eq!(api.server_options, "maxconn 25 check");
        assert_eq!(catalog.default_service().unwrap().name, "web");
        assert_eq!(catalog.ports(), vec![80, 8080]);
    }

    #[test]
    fn test_empty_input_is_empty_catalog() {
        assert!(parse_catalog("").unwrap().is_empty());
        assert!(parse_catalog("   \n").unwrap().is_empty());
        assert!(parse_catalog("~").unwrap().is_empty());
    }

    #[test]
    fn test_wildcard_and_ipv6_hosts() {
        let input = "- {name: a, host: '*', port: 1}\n- {name: b, host: '::1', port: 65535}";
        let catalog = parse_catalog(input).unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_duplicate_name_is_config_error() {
        let input = "- {name: web, host: 0.0.0.0, port: 80}\n- {name: web, host: 0.0.0.0, port: 81}";
        match parse_catalog(input) {
            Err(CatalogError::DuplicateService(name)) => assert_eq!(name, "web"),
            other => panic!("expected duplicate error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_port_reports_fragment() {
        let input = "- {name: web, host: 0.0.0.0}";
        match parse_catalog(input) {
            Err(CatalogError::Parse { fragment, reason }) => {
                assert!(fragment.contains("web"));
                assert!(reason.contains("port"), "reason: {}", reason);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_fields() {
        let cases = [
            "- {name: web, host: example.com, port: 80}",
            "- {name: web, host: 0.0.0.0, port: 0}",
            "- {name: web, host: 0.0.0.0, port: 70000}",
            "- {name: web, host: 0.0.0.0, port: 80, options: 'a,,b'}",
            "- {name: web, host: 0.0.0.0, port: 80, options: ['a', ' ']}",
            "- {name: web, host: 0.0.0.0, port: 80, options: [\"mode http\\nbalance\"]}",
            "- {name: 'two words', host: 0.0.0.0, port: 80}",
            "- {name: web, host: 0.0.0.0, port: 80, colour: blue}",
            "service_name: web",
            "- [not, a, mapping]",
            "- {name: web, host: [unclosed",
        ];
        for input in cases {
            assert!(
                matches!(parse_catalog(input), Err(CatalogError::Parse { .. })),
                "expected parse error for {}",
                input
            );
        }
    }

    #[test]
    fn test_quoted_port_is_accepted() {
        let catalog = parse_catalog(
            "- service_name: haproxy_test\n  service_host: 0.0.0.0\n  service_port: '88'\n  service_options: [balance leastconn]\n",
        )
        .unwrap();
        assert_eq!(catalog.get("haproxy_test").unwrap().port, 88);

        let err = parse_catalog("- {name: web, host: 0.0.0.0, port: 'eighty'}").unwrap_err();
        assert!(matches!(err, CatalogError::Parse { ref reason, .. } if reason.contains("eighty")));

        let err = parse_catalog("- {name: web, host: 0.0.0.0, port: '70000'}").unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));
    }

    #[test]
    fn test_tokenize_options() {
        assert_eq!(tokenize_options("a, b ,c").unwrap(), vec!["a", "b", "c"]);
        assert!(tokenize_options("").unwrap().is_empty());
        assert!(tokenize_options("a,").is_err());
    }
}
