//! Private SOAP client for UPnP AV device communication
//!
//! This crate provides a minimal SOAP client for talking to UPnP
//! MediaRenderer services (AVTransport, RenderingControl and
//! ConnectionManager). It also supports GENA event subscriptions using the
//! SUBSCRIBE/UNSUBSCRIBE methods. Subscription renewal and the HTTP NOTIFY
//! callback listener are left to the host application.

mod error;

pub use error::SoapError;

use std::time::Duration;
use xmltree::Element;

/// Response from a GENA subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    /// Subscription ID returned by the device
    pub sid: String,
    /// Actual timeout granted by the device (in seconds)
    pub timeout_seconds: u32,
}

/// A minimal SOAP client for UPnP device communication
#[derive(Debug, Clone)]
pub struct SoapClient {
    agent: ureq::Agent,
}

impl SoapClient {
    /// Create a new SOAP client with default configuration
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(5), Duration::from_secs(10))
    }

    /// Create a client with explicit connect and read timeouts
    pub fn with_timeouts(connect: Duration, read: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect)
                .timeout_read(read)
                .build(),
        }
    }

    /// Send a SOAP request to a control URL and return the parsed
    /// `<{action}Response>` element
    ///
    /// `payload` is inserted verbatim inside the action element; callers are
    /// responsible for escaping argument values (see [`xml_escape`]).
    pub fn call(
        &self,
        control_url: &str,
        service_uri: &str,
        action: &str,
        payload: &str,
    ) -> Result<Element, SoapError> {
        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
    <s:Body>
        <u:{action} xmlns:u="{service_uri}">{payload}</u:{action}>
    </s:Body>
</s:Envelope>"#
        );
        let soap_action = format!("\"{service_uri}#{action}\"");

        let response = self
            .agent
            .post(control_url)
            .set("Content-Type", "text/xml; charset=\"utf-8\"")
            .set("SOAPACTION", &soap_action)
            .send_string(&body);

        // Devices answer faults with HTTP 500 and a SOAP envelope body
        let xml_text = match response {
            Ok(response) => response
                .into_string()
                .map_err(|e| SoapError::Network(e.to_string()))?,
            Err(ureq::Error::Status(status, response)) => {
                let text = response.into_string().unwrap_or_default();
                return match Element::parse(text.as_bytes()) {
                    Ok(xml) => match self.extract_response(&xml, action) {
                        Err(err @ SoapError::Fault { .. }) => Err(err),
                        _ => Err(SoapError::Status {
                            method: "POST",
                            status,
                        }),
                    },
                    Err(_) => Err(SoapError::Status {
                        method: "POST",
                        status,
                    }),
                };
            }
            Err(e) => return Err(SoapError::Network(e.to_string())),
        };

        let xml =
            Element::parse(xml_text.as_bytes()).map_err(|e| SoapError::Parse(e.to_string()))?;

        self.extract_response(&xml, action)
    }

    /// Subscribe to GENA events on an event subscription URL
    ///
    /// # Arguments
    /// * `event_url` - Absolute event subscription URL from the device description
    /// * `callback_url` - URL where the device should deliver NOTIFY requests
    /// * `timeout_seconds` - Requested subscription timeout in seconds
    ///
    /// # Returns
    /// A `SubscriptionResponse` containing the SID and actual timeout
    pub fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse, SoapError> {
        let response = self
            .agent
            .request("SUBSCRIBE", event_url)
            .set("CALLBACK", &format!("<{callback_url}>"))
            .set("NT", "upnp:event")
            .set("TIMEOUT", &format!("Second-{timeout_seconds}"))
            .call()
            .map_err(|e| gena_error("SUBSCRIBE", e))?;

        if response.status() != 200 {
            return Err(SoapError::Status {
                method: "SUBSCRIBE",
                status: response.status(),
            });
        }

        let sid = response
            .header("SID")
            .ok_or_else(|| SoapError::Parse("Missing SID header in SUBSCRIBE response".to_string()))?
            .to_string();

        let actual_timeout_seconds = response
            .header("TIMEOUT")
            .and_then(parse_timeout_header)
            .unwrap_or(timeout_seconds);

        Ok(SubscriptionResponse {
            sid,
            timeout_seconds: actual_timeout_seconds,
        })
    }

    /// Cancel a GENA subscription
    pub fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<(), SoapError> {
        let response = self
            .agent
            .request("UNSUBSCRIBE", event_url)
            .set("SID", sid)
            .call()
            .map_err(|e| gena_error("UNSUBSCRIBE", e))?;

        if response.status() != 200 {
            return Err(SoapError::Status {
                method: "UNSUBSCRIBE",
                status: response.status(),
            });
        }

        Ok(())
    }

    fn extract_response(&self, xml: &Element, action: &str) -> Result<Element, SoapError> {
        let body = xml
            .get_child("Body")
            .ok_or_else(|| SoapError::Parse("Missing SOAP Body".to_string()))?;

        if let Some(fault) = body.get_child("Fault") {
            let upnp_error = fault
                .get_child("detail")
                .and_then(|d| d.get_child("UPnPError"));
            let code = upnp_error
                .and_then(|e| e.get_child("errorCode"))
                .and_then(|c| c.get_text())
                .and_then(|t| t.trim().parse::<u16>().ok())
                .unwrap_or(500);
            let description = upnp_error
                .and_then(|e| e.get_child("errorDescription"))
                .and_then(|d| d.get_text())
                .map(|d| d.trim().to_string());
            return Err(SoapError::Fault { code, description });
        }

        let response_name = format!("{action}Response");
        body.get_child(response_name.as_str())
            .cloned()
            .ok_or_else(|| SoapError::Parse(format!("Missing {response_name} element")))
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape a value for inclusion as XML character data
pub fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn gena_error(method: &'static str, error: ureq::Error) -> SoapError {
    match error {
        ureq::Error::Status(status, _) => SoapError::Status { method, status },
        other => SoapError::Network(other.to_string()),
    }
}

/// Parse a GENA `TIMEOUT` header of the form `Second-1800`
fn parse_timeout_header(value: &str) -> Option<u32> {
    value.trim().strip_prefix("Second-")?.parse::<u32>().ok()
}
