use soap_client::SoapError;
use thiserror::Error;

/// High-level API errors for UPnP AV operations
///
/// This enum abstracts away the underlying SOAP communication details and
/// gives callers meaningful error information for the failure scenarios that
/// occur when controlling a media renderer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Network communication error
    ///
    /// Connection timeouts, refused connections, or the device being
    /// unreachable.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Response parsing error
    ///
    /// The device returned a response, but its content could not be parsed
    /// into the expected format. This covers SOAP responses, event bodies and
    /// DIDL-Lite metadata.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// SOAP fault returned by the device
    ///
    /// The device rejected the action. The code is the UPnP error code from
    /// the fault detail, or 500 when the device did not supply one.
    #[error("SOAP fault: error code {code}")]
    SoapFault {
        code: u16,
        description: Option<String>,
    },

    /// The device answered with an unexpected HTTP status
    #[error("HTTP error: {method} returned {status}")]
    HttpStatus { method: String, status: u16 },

    /// Invalid parameter value
    ///
    /// Returned before anything is sent when a request parameter fails
    /// validation.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Subscription operation failed
    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    /// The device does not expose the service or action that was invoked
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl ApiError {
    /// UPnP error code when the device returned a SOAP fault
    pub fn fault_code(&self) -> Option<u16> {
        match self {
            ApiError::SoapFault { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;

/// Convert from SoapError to ApiError
impl From<SoapError> for ApiError {
    fn from(error: SoapError) -> Self {
        match error {
            SoapError::Network(msg) => ApiError::NetworkError(msg),
            SoapError::Parse(msg) => ApiError::ParseError(msg),
            SoapError::Fault { code, description } => ApiError::SoapFault { code, description },
            SoapError::Status { method, status } => ApiError::HttpStatus {
                method: method.to_string(),
                status,
            },
        }
    }
}

/// Convert from ValidationError to ApiError
impl From<crate::operation::ValidationError> for ApiError {
    fn from(validation_error: crate::operation::ValidationError) -> Self {
        use crate::operation::ValidationError;

        match validation_error {
            ValidationError::InvalidValue {
                parameter,
                value,
                reason,
            } => ApiError::InvalidParameter(format!(
                "Invalid value '{value}' for parameter '{parameter}': {reason}"
            )),
            ValidationError::RangeError {
                parameter,
                value,
                min,
                max,
            } => ApiError::InvalidParameter(format!(
                "Parameter '{parameter}' value {value} is out of range [{min}, {max}]"
            )),
            ValidationError::Custom { parameter, message } => {
                ApiError::InvalidParameter(format!("Parameter '{parameter}': {message}"))
            }
            ValidationError::MissingParameter { parameter } => {
                ApiError::InvalidParameter(format!("Required parameter '{parameter}' is missing"))
            }
        }
    }
}
