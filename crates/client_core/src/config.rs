use std::{net::Ipv4Addr, time::Duration};

use url::Url;

use crate::error::ViewerError;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);
pub const DEFAULT_IDENTIFIER: &str = "pfodWeb";
pub const DEFAULT_DIMENSIONS_KEY: &str = "pfodWeb_dimensions_main";
const ENDPOINT_PATH: &str = "/pfodWeb";

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub base_url: Url,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Identifier used in touch directives until a menu reply supplies one.
    pub identifier: String,
    /// Key under which window dimensions are persisted.
    pub dimensions_key: String,
}

impl ViewerConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            identifier: DEFAULT_IDENTIFIER.to_string(),
            dimensions_key: DEFAULT_DIMENSIONS_KEY.to_string(),
        }
    }

    pub fn parse(base_url: &str) -> Result<Self, ViewerError> {
        let url = Url::parse(base_url.trim()).map_err(|source| ViewerError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        if url.cannot_be_a_base() {
            return Err(ViewerError::OpaqueBaseUrl(base_url.to_string()));
        }
        Ok(Self::new(url))
    }

    /// `GET <base>?cmd=<directive>[&version=<token>]`
    pub fn endpoint(&self, directive: &str, version: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.clear().append_pair("cmd", directive);
            if let Some(version) = version {
                query.append_pair("version", version);
            }
        }
        url
    }
}

/// `http://<ip>/pfodWeb` for a dotted IPv4 target, `None` when `raw` is not one.
pub fn base_url_for_target_ip(raw: &str) -> Option<Url> {
    let ip: Ipv4Addr = raw.trim().parse().ok()?;
    Url::parse(&format!("http://{ip}{ENDPOINT_PATH}")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_encodes_directive_and_optional_version() {
        let config = ViewerConfig::parse("http://127.0.0.1:8080/pfodWeb").expect("config");

        let plain = config.endpoint("{home}", None);
        assert_eq!(plain.path(), "/pfodWeb");
        let pairs: Vec<_> = plain.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("cmd".to_string(), "{home}".to_string())]);

        let versioned = config.endpoint("{V3:home}", Some("V3"));
        let pairs: Vec<_> = versioned.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("cmd".to_string(), "{V3:home}".to_string()),
                ("version".to_string(), "V3".to_string()),
            ]
        );
        assert!(versioned.as_str().contains("cmd=%7BV3%3Ahome%7D"));
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(matches!(
            ViewerConfig::parse("not a url"),
            Err(ViewerError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn accepts_only_valid_ipv4_targets() {
        assert_eq!(
            base_url_for_target_ip("192.168.1.100").map(|url| url.to_string()),
            Some("http://192.168.1.100/pfodWeb".to_string())
        );
        assert!(base_url_for_target_ip("192.168.1.300").is_none());
        assert!(base_url_for_target_ip("device.local").is_none());
    }
}
