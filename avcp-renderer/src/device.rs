//! Static description of a renderer as supplied by discovery

use std::net::Ipv4Addr;

use crate::volume::VolumeRange;

/// Optional actions and eventing a renderer advertises in its service
/// descriptions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// ConnectionManager implements PrepareForConnection
    pub prepare_for_connection: bool,
    /// ConnectionManager implements ConnectionComplete
    pub connection_complete: bool,
    /// AVTransport moderates its state through `LastChange`
    pub av_transport_events: bool,
    /// RenderingControl moderates its state through `LastChange`
    pub rendering_control_events: bool,
    /// ConnectionManager variables are evented
    pub connection_manager_events: bool,
    pub pause: bool,
    pub record: bool,
    pub seek: bool,
    pub next: bool,
    pub previous: bool,
    pub set_play_mode: bool,
    /// Advertised `Volume` range, if any
    pub volume_range: Option<VolumeRange>,
}

impl DeviceCapabilities {
    /// Capabilities of a typical DLNA renderer: every optional transport
    /// action and LastChange eventing, but no connection negotiation
    pub fn standard() -> Self {
        Self {
            prepare_for_connection: false,
            connection_complete: false,
            av_transport_events: true,
            rendering_control_events: true,
            connection_manager_events: true,
            pause: true,
            record: false,
            seek: true,
            next: true,
            previous: true,
            set_play_mode: true,
            volume_range: None,
        }
    }

    /// The volume range to convert with, falling back to the full native range
    pub fn effective_volume_range(&self) -> VolumeRange {
        self.volume_range.unwrap_or_else(VolumeRange::full)
    }

    pub fn with_negotiation(mut self) -> Self {
        self.prepare_for_connection = true;
        self.connection_complete = true;
        self
    }

    pub fn with_volume_range(mut self, range: VolumeRange) -> Self {
        self.volume_range = Some(range);
        self
    }
}

/// A renderer found on the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererDevice {
    /// Unique device name (`uuid:...`)
    pub udn: String,
    pub friendly_name: String,
    /// The renderer's own IPv4 address, used for locality scoring
    pub address: Option<Ipv4Addr>,
    pub capabilities: DeviceCapabilities,
}

impl RendererDevice {
    pub fn new(udn: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            udn: udn.into(),
            friendly_name: friendly_name.into(),
            address: None,
            capabilities: DeviceCapabilities::standard(),
        }
    }

    pub fn with_address(mut self, address: Ipv4Addr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_volume_range() {
        let caps = DeviceCapabilities::standard();
        assert_eq!(caps.effective_volume_range(), VolumeRange::full());

        let caps = caps.with_volume_range(VolumeRange::new(0, 100));
        assert_eq!(caps.effective_volume_range(), VolumeRange::new(0, 100));
    }

    #[test]
    fn test_device_builder() {
        let device = RendererDevice::new("uuid:abc", "Kitchen")
            .with_address(Ipv4Addr::new(10, 0, 0, 7))
            .with_capabilities(DeviceCapabilities::standard().with_negotiation());

        assert_eq!(device.udn, "uuid:abc");
        assert_eq!(device.address, Some(Ipv4Addr::new(10, 0, 0, 7)));
        assert!(device.capabilities.prepare_for_connection);
        assert!(device.capabilities.connection_complete);
        assert!(!DeviceCapabilities::default().pause);
    }
}
