/// Failures talking to the BookLore REST API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failures driving the headless browser.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Tab creation failed: {0}")]
    Tab(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Page interaction failed: {0}")]
    Interaction(String),

    #[error("HTML extraction error: {0}")]
    HtmlExtraction(String),
}
