use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Invalid item locator: {locator}")]
    InvalidLocator { locator: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outcome of a page fetch that did not produce a usable page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("page did not settle within {waited_ms}ms: {address}")]
    Timeout { address: String, waited_ms: u64 },

    #[error("redirected away from {requested} to {resolved}")]
    AntiBotRedirect { requested: String, resolved: String },

    #[error("login required for {address}")]
    LoginRequired { address: String },

    #[error("browser failure while loading {address}: {message}")]
    Browser { address: String, message: String },
}

impl NavigationError {
    /// Only load failures are worth another attempt; gates and reroutes are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Browser { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::AntiBotRedirect { .. } => "anti_bot_redirect",
            Self::LoginRequired { .. } => "login_required",
            Self::Browser { .. } => "browser",
        }
    }
}

/// An item page was loaded but none of the fields the change detector needs
/// could be read from it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no price could be read for item {item_id}")]
    MissingPrice { item_id: String },

    #[error("no field could be read from {address}")]
    Empty { address: String },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to load cookies from {path}: {message}")]
    CookieLoadFailed { path: String, message: String },

    #[error("session verification failed: {0}")]
    VerificationFailed(String),

    #[error("failed to persist cookies: {0}")]
    PersistFailed(String),
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("{transport} transport failed: {message}")]
    Transport { transport: String, message: String },

    #[error("{transport} endpoint rejected the message with status {status}")]
    Rejected { transport: String, status: u16 },
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
