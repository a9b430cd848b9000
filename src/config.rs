use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:4200";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    /// Extra attempts after a retryable failure.
    pub retry: u32,
    /// Origin used when building public share links.
    pub public_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            retry: 1,
            public_url: DEFAULT_PUBLIC_URL.to_string(),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = non_empty_var("FORMKIT_API_URL").unwrap_or(defaults.base_url);
        let token = non_empty_var("FORMKIT_API_TOKEN");
        let timeout = non_empty_var("FORMKIT_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        let retry = non_empty_var("FORMKIT_RETRY")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.retry);
        let public_url = non_empty_var("FORMKIT_PUBLIC_URL").unwrap_or(defaults.public_url);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            timeout,
            retry,
            public_url,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let cfg = ClientConfig::default().with_base_url("http://api.local/v1/");
        assert_eq!(cfg.endpoint("/forms/1"), "http://api.local/v1/forms/1");
        assert_eq!(cfg.endpoint("forms"), "http://api.local/v1/forms");
    }

    #[test]
    fn defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.retry, 1);
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert!(cfg.token.is_none());
    }
}
