//! Declarative macros for UPnP operation definitions
//!
//! Instead of hand-writing the request struct, the marker type and the
//! [`UPnPOperation`](crate::operation::UPnPOperation) impl for every action,
//! services declare them with one of the two macros below.

/// Define an operation with a hand-written payload and parser
///
/// Used for actions whose arguments need formatting beyond `Display`
/// (booleans, pre-built strings) or whose response carries nothing.
///
/// # Example
/// ```rust,ignore
/// define_upnp_operation! {
///     operation: PlayOperation,
///     action: "Play",
///     service: AVTransport,
///     request: {
///         instance_id: u32,
///         speed: String,
///     },
///     response: (),
///     payload: |req| format!("<InstanceID>{}</InstanceID><Speed>{}</Speed>", req.instance_id, req.speed),
///     parse: |_xml| Ok(()),
/// }
/// ```
#[macro_export]
macro_rules! define_upnp_operation {
    (
        operation: $op_struct:ident,
        action: $action:literal,
        service: $service:ident,
        request: {
            $($field:ident: $field_type:ty),* $(,)?
        },
        response: $response_type:ty,
        payload: |$req_param:ident| $payload_expr:expr,
        parse: |$xml_param:ident| $parse_expr:expr $(,)?
    ) => {
        $crate::paste! {
            #[derive(serde::Serialize, Clone, Debug, PartialEq)]
            pub struct [<$op_struct Request>] {
                $(pub $field: $field_type,)*
            }

            impl [<$op_struct Request>] {
                #[allow(clippy::new_without_default)]
                pub fn new($($field: $field_type),*) -> Self {
                    Self { $($field,)* }
                }
            }

            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $op_struct;

            impl $crate::operation::UPnPOperation for $op_struct {
                type Request = [<$op_struct Request>];
                type Response = $response_type;

                const SERVICE: $crate::service::Service = $crate::service::Service::$service;
                const ACTION: &'static str = $action;

                fn build_payload(request: &Self::Request) -> Result<String, $crate::operation::ValidationError> {
                    $crate::operation::Validate::validate(
                        request,
                        $crate::operation::ValidationLevel::Boundary,
                    )?;
                    let $req_param = request;
                    Ok($payload_expr)
                }

                fn parse_response(xml: &xmltree::Element) -> Result<Self::Response, $crate::error::ApiError> {
                    let $xml_param = xml;
                    $parse_expr
                }
            }
        }
    };
}

/// Define an operation whose arguments and outputs map one-to-one onto
/// XML elements
///
/// Each request field names its SOAP argument; values are written with
/// `Display` and XML-escaped. Each response field names its output argument
/// and is parsed with `FromStr`; a missing output is a parse error.
///
/// # Example
/// ```rust,ignore
/// define_operation_with_response! {
///     operation: GetCurrentConnectionInfoOperation,
///     action: "GetCurrentConnectionInfo",
///     service: ConnectionManager,
///     request: {
///         connection_id: i32 => "ConnectionID",
///     },
///     response: GetCurrentConnectionInfoResponse {
///         rcs_id: i32 => "RcsID",
///         protocol_info: String => "ProtocolInfo",
///     },
/// }
/// ```
#[macro_export]
macro_rules! define_operation_with_response {
    (
        operation: $op_struct:ident,
        action: $action:literal,
        service: $service:ident,
        request: {
            $($field:ident: $field_type:ty => $arg:literal),* $(,)?
        },
        response: $response_struct:ident {
            $($resp_field:ident: $resp_type:ty => $out:literal),* $(,)?
        } $(,)?
    ) => {
        $crate::paste! {
            #[derive(serde::Serialize, Clone, Debug, PartialEq)]
            pub struct [<$op_struct Request>] {
                $(pub $field: $field_type,)*
            }

            impl [<$op_struct Request>] {
                #[allow(clippy::new_without_default)]
                pub fn new($($field: $field_type),*) -> Self {
                    Self { $($field,)* }
                }
            }

            #[derive(serde::Deserialize, Debug, Clone, PartialEq)]
            pub struct $response_struct {
                $(pub $resp_field: $resp_type,)*
            }

            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $op_struct;

            impl $crate::operation::UPnPOperation for $op_struct {
                type Request = [<$op_struct Request>];
                type Response = $response_struct;

                const SERVICE: $crate::service::Service = $crate::service::Service::$service;
                const ACTION: &'static str = $action;

                fn build_payload(request: &Self::Request) -> Result<String, $crate::operation::ValidationError> {
                    $crate::operation::Validate::validate(
                        request,
                        $crate::operation::ValidationLevel::Boundary,
                    )?;

                    #[allow(unused_mut)]
                    let mut xml = String::new();
                    $(
                        xml.push_str(&format!(
                            "<{0}>{1}</{0}>",
                            $arg,
                            $crate::xml_escape(&request.$field.to_string())
                        ));
                    )*
                    Ok(xml)
                }

                fn parse_response(xml: &xmltree::Element) -> Result<Self::Response, $crate::error::ApiError> {
                    Ok($response_struct {
                        $($resp_field: $crate::operation::output_value::<$resp_type>(xml, $out)?,)*
                    })
                }
            }
        }
    };
}
