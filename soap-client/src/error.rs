//! Error types for the SOAP client

use thiserror::Error;

/// Errors that can occur during SOAP communication
#[derive(Debug, Error)]
pub enum SoapError {
    /// Network or HTTP communication error
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// XML parsing error
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// SOAP fault returned by the device, carrying the UPnP error code
    #[error("SOAP fault: error code {code}")]
    Fault {
        code: u16,
        description: Option<String>,
    },

    /// The device answered a GENA request with an unexpected HTTP status
    #[error("{method} failed: HTTP {status}")]
    Status { method: &'static str, status: u16 },
}

impl SoapError {
    /// UPnP error code when this is a SOAP fault
    pub fn fault_code(&self) -> Option<u16> {
        match self {
            SoapError::Fault { code, .. } => Some(*code),
            _ => None,
        }
    }
}
