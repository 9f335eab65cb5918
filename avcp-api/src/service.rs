/// The UPnP AV services a MediaRenderer exposes to a control point
///
/// Control and event URLs are device specific and come from the device
/// description, so only the service type and id live here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// AVTransport service - transport URI, playback and position
    AVTransport,

    /// RenderingControl service - volume and mute per channel
    RenderingControl,

    /// ConnectionManager service - protocol info and connection negotiation
    ConnectionManager,
}

impl Service {
    /// All services, in the order a device description usually lists them
    pub const ALL: [Service; 3] = [
        Service::AVTransport,
        Service::RenderingControl,
        Service::ConnectionManager,
    ];

    /// Get the name of this service as a string
    pub fn name(&self) -> &'static str {
        match self {
            Service::AVTransport => "AVTransport",
            Service::RenderingControl => "RenderingControl",
            Service::ConnectionManager => "ConnectionManager",
        }
    }

    /// The UPnP service type URI used in SOAP requests
    pub fn service_uri(&self) -> &'static str {
        match self {
            Service::AVTransport => "urn:schemas-upnp-org:service:AVTransport:1",
            Service::RenderingControl => "urn:schemas-upnp-org:service:RenderingControl:1",
            Service::ConnectionManager => "urn:schemas-upnp-org:service:ConnectionManager:1",
        }
    }

    /// The service id as it appears in a device description
    pub fn service_id(&self) -> &'static str {
        match self {
            Service::AVTransport => "urn:upnp-org:serviceId:AVTransport",
            Service::RenderingControl => "urn:upnp-org:serviceId:RenderingControl",
            Service::ConnectionManager => "urn:upnp-org:serviceId:ConnectionManager",
        }
    }

    /// Resolve a service from a service type URI of any version
    pub fn from_service_type(service_type: &str) -> Option<Service> {
        Service::ALL.into_iter().find(|service| {
            service_type
                .strip_prefix("urn:schemas-upnp-org:service:")
                .and_then(|rest| rest.split(':').next())
                == Some(service.name())
        })
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("urn:schemas-upnp-org:service:AVTransport:1", Some(Service::AVTransport))]
    #[case("urn:schemas-upnp-org:service:AVTransport:3", Some(Service::AVTransport))]
    #[case("urn:schemas-upnp-org:service:RenderingControl:2", Some(Service::RenderingControl))]
    #[case("urn:schemas-upnp-org:service:ConnectionManager:1", Some(Service::ConnectionManager))]
    #[case("urn:schemas-upnp-org:service:ContentDirectory:1", None)]
    #[case("AVTransport", None)]
    fn test_from_service_type(#[case] input: &str, #[case] expected: Option<Service>) {
        assert_eq!(Service::from_service_type(input), expected);
    }

    #[test]
    fn test_service_uris_round_trip() {
        for service in Service::ALL {
            assert_eq!(Service::from_service_type(service.service_uri()), Some(service));
            assert!(service.service_id().ends_with(service.name()));
        }
    }
}
