use http::StatusCode;
use http::header::InvalidHeaderValue;
use hyper::Response;
use hyper::body::Bytes;
use thiserror::Error;
use usersync::CookieError;

/// Errors that end a request, or the server
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("JSON parsing failed: {0}")]
    InvalidBody(String),

    #[error("error parsing filterSettings.{sync_type}: {message}")]
    InvalidFilter {
        sync_type: &'static str,
        message: String,
    },

    #[error("gdpr_consent is required if gdpr=1")]
    ConsentRequired,

    #[error("the gdpr param must be either 0 or 1, got {0}")]
    InvalidGdpr(String),

    #[error("invalid gpp_sid value {0}")]
    InvalidGppSid(String),

    #[error("User has opted out")]
    OptedOut,

    #[error("\"bidder\" query param is required")]
    MissingBidder,

    #[error("The bidder name provided is not supported: {0}")]
    UnknownBidder(String),

    #[error("\"f\" query param is invalid. must be \"b\" or \"i\"")]
    InvalidFormat,

    #[error("The gdpr_consent string prevents cookies from being saved")]
    PrivacyBlocked,

    #[error(transparent)]
    Cookie(#[from] CookieError),

    #[error("Response serialization error: {0}")]
    ResponseSerializationError(#[from] serde_json::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    #[error("{0} syncers could not be built")]
    SyncerBuild(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EndpointError {
    pub fn status(&self) -> StatusCode {
        match self {
            EndpointError::OptedOut => StatusCode::UNAUTHORIZED,
            EndpointError::PrivacyBlocked => StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS,
            EndpointError::ResponseSerializationError(_)
            | EndpointError::InvalidHeader(_)
            | EndpointError::SyncerBuild(_)
            | EndpointError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Value of the `status` tag on request counters.
    pub fn metric_label(&self) -> &'static str {
        match self {
            EndpointError::OptedOut => "opted_out",
            EndpointError::PrivacyBlocked => "blocked_by_privacy",
            EndpointError::MissingBidder | EndpointError::UnknownBidder(_) => "bad_bidder",
            EndpointError::Cookie(_) => "cookie_error",
            other if other.status().is_server_error() => "error",
            _ => "bad_request",
        }
    }

    /// Plain-text response carrying the error message.
    pub fn to_response(&self) -> Response<Bytes> {
        let mut response = Response::new(Bytes::from(format!("{self}\n")));
        *response.status_mut() = self.status();
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}
