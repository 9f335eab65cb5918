//! Operation framework for UPnP AV actions
//!
//! Every SOAP action is a zero-sized type implementing [`UPnPOperation`]. The
//! request type is validated before the payload is built, and the response is
//! parsed strictly: a missing output argument is a parse error rather than a
//! silently defaulted value.

pub mod macros;

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use xmltree::Element;

use crate::error::ApiError;
use crate::service::Service;

/// Validation error types
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Parameter '{parameter}' value '{value}' is out of range ({min}..={max})")]
    RangeError {
        parameter: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Parameter '{parameter}' value '{value}' is invalid: {reason}")]
    InvalidValue {
        parameter: String,
        value: String,
        reason: String,
    },

    #[error("Required parameter '{parameter}' is missing")]
    MissingParameter { parameter: String },

    #[error("Parameter '{parameter}' failed validation: {message}")]
    Custom { parameter: String, message: String },
}

impl ValidationError {
    pub fn range_error(
        parameter: &str,
        min: impl std::fmt::Display,
        max: impl std::fmt::Display,
        value: impl std::fmt::Display,
    ) -> Self {
        Self::RangeError {
            parameter: parameter.to_string(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    pub fn invalid_value(parameter: &str, value: impl std::fmt::Display) -> Self {
        Self::InvalidValue {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: "invalid format or content".to_string(),
        }
    }

    pub fn missing(parameter: &str) -> Self {
        Self::MissingParameter {
            parameter: parameter.to_string(),
        }
    }
}

/// Validation levels for operation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationLevel {
    /// No validation
    None,
    /// Light validation at API boundary - basic type and range checks
    #[default]
    Boundary,
    /// Full validation including domain rules
    Comprehensive,
}

/// Trait for types that can be validated
pub trait Validate {
    /// Perform light validation at the API boundary
    fn validate_boundary(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Perform comprehensive validation including domain rules
    fn validate_comprehensive(&self) -> Result<(), ValidationError> {
        self.validate_boundary()
    }

    /// Validate with the specified level
    fn validate(&self, level: ValidationLevel) -> Result<(), ValidationError> {
        match level {
            ValidationLevel::None => Ok(()),
            ValidationLevel::Boundary => self.validate_boundary(),
            ValidationLevel::Comprehensive => self.validate_comprehensive(),
        }
    }
}

/// A UPnP action with a typed request and response
pub trait UPnPOperation {
    /// The request type for this operation
    type Request: Serialize + Validate;

    /// The response type for this operation
    type Response: for<'de> Deserialize<'de>;

    /// The UPnP service this operation belongs to
    const SERVICE: Service;

    /// The SOAP action name for this operation
    const ACTION: &'static str;

    /// Validate the request and build the XML payload that goes inside the
    /// action element of the SOAP envelope
    fn build_payload(request: &Self::Request) -> Result<String, ValidationError>;

    /// Parse the `<{Action}Response>` element into the typed response
    fn parse_response(xml: &Element) -> Result<Self::Response, ApiError>;

    /// Human-readable operation metadata for logging
    fn metadata() -> OperationMetadata {
        OperationMetadata {
            service: Self::SERVICE.name(),
            action: Self::ACTION,
        }
    }
}

/// Metadata about a UPnP operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationMetadata {
    /// The service name (e.g., "AVTransport")
    pub service: &'static str,
    /// The action name (e.g., "Play")
    pub action: &'static str,
}

impl std::fmt::Display for OperationMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.service, self.action)
    }
}

/// Read an output argument from a response element
///
/// A missing element is an error; an empty element yields an empty string.
pub fn output_text(xml: &Element, name: &str) -> Result<String, ApiError> {
    let child = xml
        .get_child(name)
        .ok_or_else(|| ApiError::ParseError(format!("Missing {name} in {}", xml.name)))?;
    Ok(child
        .get_text()
        .map(|text| text.trim().to_string())
        .unwrap_or_default())
}

/// Read and parse an output argument from a response element
pub fn output_value<T: FromStr>(xml: &Element, name: &str) -> Result<T, ApiError> {
    let text = output_text(xml, name)?;
    text.parse::<T>()
        .map_err(|_| ApiError::ParseError(format!("Invalid {name} value '{text}'")))
}
