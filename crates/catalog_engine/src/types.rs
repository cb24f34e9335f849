use std::fmt;

/// Why one WorkItem (or one asset) could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}{}", detail(.message))]
pub struct ItemError {
    pub kind: FailureKind,
    pub message: String,
}

impl ItemError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Expected element absent after every fallback rule was tried.
    pub fn missing(element: &'static str) -> Self {
        Self::new(
            FailureKind::MissingElement { element },
            format!("{element} not found"),
        )
    }

    /// The browser session itself is gone; the stage cannot continue.
    pub fn is_session_fatal(&self) -> bool {
        self.kind == FailureKind::SessionFatal
    }
}

fn detail(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    Decode,
    Network,
    Browser,
    MissingElement { element: &'static str },
    Io,
    SessionFatal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::Decode => write!(f, "undecodable body"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Browser => write!(f, "browser error"),
            FailureKind::MissingElement { element } => write!(f, "missing element `{element}`"),
            FailureKind::Io => write!(f, "io error"),
            FailureKind::SessionFatal => write!(f, "browser session lost"),
        }
    }
}

impl From<std::io::Error> for ItemError {
    fn from(err: std::io::Error) -> Self {
        ItemError::new(FailureKind::Io, err.to_string())
    }
}

impl From<crate::persist::PersistError> for ItemError {
    fn from(err: crate::persist::PersistError) -> Self {
        ItemError::new(FailureKind::Io, err.to_string())
    }
}
