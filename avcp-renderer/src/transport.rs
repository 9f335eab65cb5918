//! Boundary between the session core and the remote-invocation transport
//!
//! The core never performs I/O itself. Every action invocation and event
//! subscription goes through a [`RendererTransport`], whose completions may
//! run on any thread. Deferred work goes through a [`Timer`].

use std::sync::{mpsc, Arc};
use std::time::Duration;

use avcp_api::{ApiError, PropertySet, Service, UPnPOperation};
use xmltree::Element;

/// Callback invoked once with the outcome of an asynchronous request
pub type Completion<T> = Box<dyn FnOnce(Result<T, ApiError>) + Send + 'static>;

/// Callback invoked for every event delivered on a subscription
pub type EventCallback = Arc<dyn Fn(&PropertySet) + Send + Sync + 'static>;

/// Identifier of an accepted event subscription (the GENA SID)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Remote-invocation and eventing transport for one device
pub trait RendererTransport: Send + Sync {
    /// Invoke `action` on `service` with a pre-built argument payload
    ///
    /// `done` receives the `<{action}Response>` element.
    fn invoke(&self, service: Service, action: &'static str, payload: String, done: Completion<Element>);

    /// Subscribe to a service's evented variables
    ///
    /// `on_event` runs for every notification, starting with the initial
    /// event. `done` runs once the subscription has been accepted and its
    /// initial event delivered, or with the error if it was refused.
    fn subscribe(&self, service: Service, on_event: EventCallback, done: Completion<SubscriptionId>);

    /// Cancel a subscription; no further events are delivered for it
    fn unsubscribe(&self, subscription: &SubscriptionId);
}

/// Schedules deferred work
pub trait Timer: Send + Sync {
    /// Run `task` once after `delay`
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send + 'static>);
}

/// Invoke a typed operation through a transport
///
/// Validation failures complete `done` immediately with
/// [`ApiError::InvalidParameter`].
pub fn execute<Op>(transport: &dyn RendererTransport, request: &Op::Request, done: Completion<Op::Response>)
where
    Op: UPnPOperation,
    Op::Response: Send + 'static,
{
    let payload = match Op::build_payload(request) {
        Ok(payload) => payload,
        Err(e) => {
            done(Err(e.into()));
            return;
        }
    };

    tracing::debug!(operation = %Op::metadata(), "invoking");
    transport.invoke(
        Op::SERVICE,
        Op::ACTION,
        payload,
        Box::new(move |result| done(result.and_then(|xml| Op::parse_response(&xml)))),
    );
}

/// Invoke a typed operation and block the calling thread until it completes
///
/// Must not be called from a transport completion thread.
pub fn execute_blocking<Op>(transport: &dyn RendererTransport, request: &Op::Request) -> Result<Op::Response, ApiError>
where
    Op: UPnPOperation,
    Op::Response: Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    execute::<Op>(
        transport,
        request,
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );
    rx.recv()
        .map_err(|_| ApiError::NetworkError(format!("{} completion was dropped", Op::ACTION)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use avcp_api::services::av_transport::{PlayOperation, PlayOperationRequest};
    use avcp_api::services::connection_manager::{
        GetCurrentConnectionIDsOperation, GetCurrentConnectionIDsOperationRequest,
    };
    use parking_lot::Mutex;
    use xmltree::XMLNode;

    /// Answers every action from another thread with a fixed set of outputs
    struct Echo {
        outputs: Vec<(&'static str, &'static str)>,
        invoked: Mutex<Vec<(Service, &'static str, String)>>,
    }

    impl RendererTransport for Echo {
        fn invoke(&self, service: Service, action: &'static str, payload: String, done: Completion<Element>) {
            self.invoked.lock().push((service, action, payload));
            let mut response = Element::new(&format!("{action}Response"));
            for (name, value) in &self.outputs {
                let mut child = Element::new(name);
                child.children.push(XMLNode::Text(value.to_string()));
                response.children.push(XMLNode::Element(child));
            }
            std::thread::spawn(move || done(Ok(response)));
        }

        fn subscribe(&self, _service: Service, _on_event: EventCallback, done: Completion<SubscriptionId>) {
            done(Err(ApiError::Unsupported("events".to_string())));
        }

        fn unsubscribe(&self, _subscription: &SubscriptionId) {}
    }

    fn echo(outputs: Vec<(&'static str, &'static str)>) -> Echo {
        Echo {
            outputs,
            invoked: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn test_execute_blocking_parses_response() {
        let transport = echo(vec![("ConnectionIDs", "0,4")]);
        let response = execute_blocking::<GetCurrentConnectionIDsOperation>(
            &transport,
            &GetCurrentConnectionIDsOperationRequest::new(),
        )
        .unwrap();

        assert_eq!(response.connection_ids, "0,4");
        let invoked = transport.invoked.lock();
        assert_eq!(invoked[0].0, Service::ConnectionManager);
        assert_eq!(invoked[0].1, "GetCurrentConnectionIDs");
    }

    #[test]
    fn test_missing_output_is_a_parse_error() {
        let transport = echo(vec![]);
        let result = execute_blocking::<GetCurrentConnectionIDsOperation>(
            &transport,
            &GetCurrentConnectionIDsOperationRequest::new(),
        );
        assert!(matches!(result, Err(ApiError::ParseError(_))));
    }

    #[test]
    fn test_invalid_request_never_reaches_transport() {
        let transport = echo(vec![]);
        let (tx, rx) = mpsc::channel();
        execute::<PlayOperation>(
            &transport,
            &PlayOperationRequest::new(0, "fast".to_string()),
            Box::new(move |result| tx.send(result).unwrap()),
        );

        assert!(matches!(rx.recv().unwrap(), Err(ApiError::InvalidParameter(_))));
        assert!(transport.invoked.lock().is_empty());
    }
}
