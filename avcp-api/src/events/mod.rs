//! GENA event body parsing
//!
//! A NOTIFY body is a `propertyset` of evented state variables. AVTransport
//! and RenderingControl moderate their variables through a single
//! `LastChange` variable whose value is itself an XML document:
//!
//! ```xml
//! <Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/">
//!   <InstanceID val="0">
//!     <TransportState val="PLAYING"/>
//!     <CurrentTrackURI val="http://10.0.0.5/a.mp3"/>
//!   </InstanceID>
//! </Event>
//! ```
//!
//! RenderingControl adds a `channel` attribute to per-channel variables such
//! as `Volume` and `Mute`.

pub mod xml_utils;

use xmltree::{Element, XMLNode};

use crate::{ApiError, Result};

/// The variables carried by one NOTIFY body, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySet {
    pub properties: Vec<(String, String)>,
}

impl PropertySet {
    /// Parse an `e:propertyset` document
    pub fn from_xml(xml: &str) -> Result<Self> {
        let root = parse_element(xml)?;
        if root.name != "propertyset" {
            return Err(ApiError::ParseError(format!(
                "expected propertyset, found {}",
                root.name
            )));
        }

        let properties = child_elements(&root)
            .filter(|property| property.name == "property")
            .flat_map(child_elements)
            .map(|variable| (variable.name.clone(), element_text(variable)))
            .collect();

        Ok(Self { properties })
    }

    /// Build a property set from name/value pairs
    pub fn from_pairs<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }

    /// Value of the first variable with this name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Parse the embedded `LastChange` document, if present and non-empty
    pub fn last_change(&self) -> Option<Result<LastChange>> {
        self.get("LastChange")
            .filter(|value| !value.trim().is_empty())
            .map(LastChange::from_xml)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// One state variable change inside a `LastChange` document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVariable {
    pub name: String,
    pub channel: Option<String>,
    pub value: String,
}

/// All changes reported for one service instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceChanges {
    pub instance_id: u32,
    pub variables: Vec<StateVariable>,
}

impl InstanceChanges {
    /// Value of the first variable with this name, ignoring channels
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|variable| variable.name == name)
            .map(|variable| variable.value.as_str())
    }
}

/// A parsed `LastChange` document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastChange {
    pub instances: Vec<InstanceChanges>,
}

impl LastChange {
    pub fn from_xml(xml: &str) -> Result<Self> {
        let root = parse_element(xml)?;
        if root.name != "Event" {
            return Err(ApiError::ParseError(format!(
                "expected LastChange Event, found {}",
                root.name
            )));
        }

        let mut instances = Vec::new();
        for instance in child_elements(&root).filter(|e| e.name == "InstanceID") {
            let instance_id = instance
                .attributes
                .get("val")
                .and_then(|val| val.trim().parse::<u32>().ok())
                .ok_or_else(|| ApiError::ParseError("InstanceID without a numeric val".to_string()))?;

            let variables = child_elements(instance)
                .map(|variable| StateVariable {
                    name: variable.name.clone(),
                    channel: variable.attributes.get("channel").cloned(),
                    value: variable.attributes.get("val").cloned().unwrap_or_default(),
                })
                .collect();

            instances.push(InstanceChanges {
                instance_id,
                variables,
            });
        }

        Ok(Self { instances })
    }

    /// Changes for one instance id
    pub fn instance(&self, instance_id: u32) -> Option<&InstanceChanges> {
        self.instances
            .iter()
            .find(|instance| instance.instance_id == instance_id)
    }
}

fn parse_element(xml: &str) -> Result<Element> {
    Element::parse(xml.trim().as_bytes())
        .map_err(|e| ApiError::ParseError(format!("invalid event XML: {e}")))
}

fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(XMLNode::as_element)
}

/// Text content of a property; `LastChange` and metadata values arrive
/// escaped, so this may itself be an XML document
fn element_text(element: &Element) -> String {
    element
        .children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Text(text) | XMLNode::CData(text) => Some(text.as_str()),
            _ => None,
        })
        .collect::<String>()
}
