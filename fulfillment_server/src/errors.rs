use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use thiserror::Error;

use fulfillment_engine::{
    helpers::RateLimited,
    matching::MatchError,
    traits::FulfillmentDbError,
    CallbackRejection,
    OrderFlowError,
    PaymentsApiError,
};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
    #[error(transparent)]
    OrderFlow(#[from] OrderFlowError),
    #[error(transparent)]
    Matching(#[from] MatchError),
    #[error(transparent)]
    Payments(#[from] PaymentsApiError),
    #[error(transparent)]
    Callback(#[from] CallbackRejection),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::ValidationError(_) => StatusCode::UNAUTHORIZED,
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            },
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::OrderFlow(e) => match e {
                OrderFlowError::ValidationError(_) => StatusCode::BAD_REQUEST,
                OrderFlowError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
                OrderFlowError::Forbidden(_) => StatusCode::FORBIDDEN,
                OrderFlowError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                OrderFlowError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Matching(e) => match e {
                MatchError::VendorInactive(_)
                | MatchError::CapacityExceeded(_)
                | MatchError::OutOfServiceArea { .. }
                | MatchError::CodConfirmationRequired => StatusCode::BAD_REQUEST,
                MatchError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Payments(e) => payments_status_code(e),
            Self::Callback(e) => match e {
                CallbackRejection::MalformedPayload(_) => StatusCode::BAD_REQUEST,
                CallbackRejection::SignatureMissing | CallbackRejection::SignatureInvalid => StatusCode::FORBIDDEN,
                CallbackRejection::SecretNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
                CallbackRejection::StaleCallback => StatusCode::FORBIDDEN,
                CallbackRejection::ReplayDetected => StatusCode::CONFLICT,
                CallbackRejection::PaymentNotFound(_) => StatusCode::NOT_FOUND,
                CallbackRejection::Payments(e) => payments_status_code(e),
            },
            Self::InitializeError(_)
            | Self::BackendError(_)
            | Self::IOError(_)
            | Self::ConfigurationError(_)
            | Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

fn payments_status_code(e: &PaymentsApiError) -> StatusCode {
    match e {
        PaymentsApiError::OrderNotFound(_) | PaymentsApiError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
        PaymentsApiError::PaymentNotRequired(_)
        | PaymentsApiError::AlreadyPaid(_)
        | PaymentsApiError::OrderNotPayable(_) => StatusCode::BAD_REQUEST,
        PaymentsApiError::GatewayUnreachable(_) | PaymentsApiError::GatewayRejected(_) => StatusCode::BAD_GATEWAY,
        PaymentsApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<FulfillmentDbError> for ServerError {
    fn from(e: FulfillmentDbError) -> Self {
        Self::BackendError(format!("Database error: {e}"))
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No access token was provided.")]
    MissingToken,
    #[error("Access token is invalid. {0}")]
    ValidationError(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
}
