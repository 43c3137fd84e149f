use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("matomo-mcp/", env!("CARGO_PKG_VERSION")))
        .build()
}

