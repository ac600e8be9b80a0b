//! Error taxonomy for registration, decoding and dispatch
//!
//! Every failure that can happen while serving one request is funnelled
//! through [`Error`] and handled at the single dispatch boundary in
//! [`crate::app::App::handle`].

use hyper::StatusCode;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Return type of middleware, controllers and error middleware
pub type HandlerResult = Result<()>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No registered pattern matched the path, or the pattern has no
    /// handler for the requested method.
    #[error("Not Found")]
    RouteNotFound,

    /// Registration-time contract violation on a handler chain.
    #[error("invalid handler chain: {0}")]
    InvalidHandlerChain(String),

    /// A second error middleware was registered.
    ///
    /// Kept apart from [`Error::InvalidHandlerChain`], which is about the
    /// shape of one route's chain rather than app-wide handler slots.
    #[error("an error middleware is already registered")]
    DuplicateErrorMiddleware,

    /// Body present but undecodable for its declared content type.
    #[error("failed to parse request body: {0}")]
    BodyParse(String),

    /// Any failure raised by a handler during dispatch, panics included.
    #[error("{0}")]
    Handler(String),

    /// A response was sent twice on the same request.
    #[error("response was already sent to client")]
    DuplicateSend,

    /// `Response::json` was called with an empty body.
    #[error("invalid response body")]
    InvalidBody,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a handler failure from any displayable error
    pub fn handler(err: impl std::fmt::Display) -> Self {
        Self::Handler(err.to_string())
    }

    /// Status used by the default error path when no error middleware exists
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::BodyParse(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Generic message placed in the default JSON error body
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::RouteNotFound => "Not Found",
            Self::BodyParse(_) => "Invalid request body",
            _ => "Something went wrong",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::BodyParse(err.to_string())
    }
}
