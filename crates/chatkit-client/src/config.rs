use std::time::Duration;

/// Default hard bound for non-streaming requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

/// Configuration for an [`ApiClient`](crate::ApiClient).
///
/// Base URLs and the request timeout are injected here instead of being read
/// from ambient state, so tests can point the client at a local mock server.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Prefix for authenticated console endpoints.
    pub api_base_url: String,
    /// Prefix for public/shared-app endpoints.
    pub public_api_base_url: String,
    /// Hard bound for non-streaming requests. Streaming sessions ignore it;
    /// they are bounded by cancellation instead.
    pub timeout: Duration,
    /// Token identifying the public app, usually the last segment of the
    /// share URL path. Used to look up the bearer credential for public
    /// endpoints.
    pub shared_token: Option<String>,
}

impl ClientConfig {
    /// Creates a config with the default timeout and no shared token.
    pub fn new(api_base_url: impl Into<String>, public_api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            public_api_base_url: public_api_base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            shared_token: None,
        }
    }

    /// Overrides the non-streaming request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the shared token used for public-endpoint credential lookup.
    pub fn shared_token(mut self, token: impl Into<String>) -> Self {
        self.shared_token = Some(token.into());
        self
    }

    pub(crate) fn url_for(&self, public: bool, path: &str) -> String {
        let base = if public {
            &self.public_api_base_url
        } else {
            &self.api_base_url
        };
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_100_seconds() {
        let config = ClientConfig::new("http://a", "http://b");
        assert_eq!(config.timeout, Duration::from_secs(100));
    }

    #[test]
    fn url_for_joins_with_exactly_one_slash() {
        let config = ClientConfig::new("http://console/api/", "http://share/api");
        assert_eq!(config.url_for(false, "/apps"), "http://console/api/apps");
        assert_eq!(config.url_for(false, "apps"), "http://console/api/apps");
        assert_eq!(config.url_for(true, "/meta"), "http://share/api/meta");
    }
}
