//! Provider environments and their callback hosts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PRODUCTION_CALLBACK_HOSTS: [&str; 4] = [
    "callback-1.vipps.no",
    "callback-2.vipps.no",
    "callback-3.vipps.no",
    "callback-4.vipps.no",
];

const TEST_CALLBACK_HOSTS: [&str; 2] = ["callback-mt-1.vipps.no", "callback-mt-2.vipps.no"];

/// Provider environment. Production and test use disjoint callback hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderEnvironment {
    Production,
    #[default]
    Test,
}

impl ProviderEnvironment {
    /// Default API base URL.
    pub fn api_base_url(&self) -> &'static str {
        match self {
            ProviderEnvironment::Production => "https://api.vipps.no",
            ProviderEnvironment::Test => "https://apitest.vipps.no",
        }
    }

    /// Hostnames webhook deliveries originate from.
    pub fn callback_hosts(&self) -> &'static [&'static str] {
        match self {
            ProviderEnvironment::Production => &PRODUCTION_CALLBACK_HOSTS,
            ProviderEnvironment::Test => &TEST_CALLBACK_HOSTS,
        }
    }

    /// Source check failures are fatal only in production.
    pub fn enforces_source_check(&self) -> bool {
        matches!(self, ProviderEnvironment::Production)
    }
}

impl fmt::Display for ProviderEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderEnvironment::Production => write!(f, "production"),
            ProviderEnvironment::Test => write!(f, "test"),
        }
    }
}

impl FromStr for ProviderEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(ProviderEnvironment::Production),
            "test" | "mt" => Ok(ProviderEnvironment::Test),
            other => Err(format!("unknown provider environment '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_host_sets_are_disjoint() {
        let production = ProviderEnvironment::Production.callback_hosts();
        let test = ProviderEnvironment::Test.callback_hosts();
        assert_eq!(production.len(), 4);
        assert_eq!(test.len(), 2);
        assert!(production.iter().all(|host| !test.contains(host)));
    }

    #[test]
    fn base_urls_differ_per_environment() {
        assert_eq!(ProviderEnvironment::Production.api_base_url(), "https://api.vipps.no");
        assert_eq!(ProviderEnvironment::Test.api_base_url(), "https://apitest.vipps.no");
    }

    #[test]
    fn only_production_enforces_source_check() {
        assert!(ProviderEnvironment::Production.enforces_source_check());
        assert!(!ProviderEnvironment::Test.enforces_source_check());
    }

    #[test]
    fn parses_from_string() {
        assert_eq!("Production".parse::<ProviderEnvironment>(), Ok(ProviderEnvironment::Production));
        assert_eq!("test".parse::<ProviderEnvironment>(), Ok(ProviderEnvironment::Test));
        assert!("staging".parse::<ProviderEnvironment>().is_err());
    }
}
