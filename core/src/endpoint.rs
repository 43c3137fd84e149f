use std::fmt;

use url::Url;

use crate::error::ToolError;

pub const URL_ENV: &str = "MATOMO_URL";
pub const TOKEN_ENV: &str = "MATOMO_TOKEN";

/// Where and as whom to call the Matomo Reporting API.
///
/// Built once at startup and shared read-only by every invocation.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    base_url: String,
    api_url: Url,
    token: String,
}

impl EndpointConfig {
    pub fn new(base_url: &str, token: &str) -> Result<Self, ToolError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(missing(&[URL_ENV]));
        }
        if token.trim().is_empty() {
            return Err(missing(&[TOKEN_ENV]));
        }
        let api_url = Url::parse(&format!("{base_url}/index.php")).map_err(|e| {
            ToolError::configuration(format!("{URL_ENV} is not a valid URL ({base_url}): {e}"))
        })?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(ToolError::configuration(format!(
                "{URL_ENV} must be an http(s) URL, got scheme '{}'",
                api_url.scheme()
            )));
        }
        Ok(Self {
            base_url: base_url.to_string(),
            api_url,
            token: token.to_string(),
        })
    }

    /// Resolve from optionally-present raw values (CLI flags / environment).
    /// Empty values count as missing.
    pub fn from_settings(base_url: Option<&str>, token: Option<&str>) -> Result<Self, ToolError> {
        let base_url = base_url.filter(|v| !v.trim().is_empty());
        let token = token.filter(|v| !v.trim().is_empty());
        match (base_url, token) {
            (Some(base_url), Some(token)) => Self::new(base_url, token),
            (None, None) => Err(missing(&[URL_ENV, TOKEN_ENV])),
            (None, Some(_)) => Err(missing(&[URL_ENV])),
            (Some(_), None) => Err(missing(&[TOKEN_ENV])),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `<base_url>/index.php`, the only URL ever requested.
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("api_url", &self.api_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

fn missing(names: &[&str]) -> ToolError {
    let subject = if names.len() == 1 {
        "environment variable"
    } else {
        "environment variables"
    };
    ToolError::configuration(format!("{} {subject} must be set", names.join(" and ")))
}
