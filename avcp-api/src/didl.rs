//! DIDL-Lite media metadata
//!
//! A small object model covering what a renderer control point needs: items
//! with their resources (URI plus protocol info) and containers. Metadata
//! arrives in `CurrentTrackMetaData` / `AVTransportURIMetaData` and is sent
//! back with `SetAVTransportURI`.

use serde::Deserialize;

use crate::events::xml_utils;
use crate::protocol_info::ProtocolInfo;
use crate::{xml_escape, ApiError, Result};

/// Value devices report for metadata they do not track
pub const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";

/// A playable resource (`<res>`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MediaResource {
    pub uri: String,
    pub protocol_info: String,
    pub duration: Option<String>,
    pub size: Option<u64>,
}

impl MediaResource {
    pub fn new(uri: impl Into<String>, protocol_info: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            protocol_info: protocol_info.into(),
            ..Default::default()
        }
    }

    /// The parsed protocol info, or `None` when the attribute is malformed
    pub fn parsed_protocol_info(&self) -> Option<ProtocolInfo> {
        self.protocol_info.parse().ok()
    }
}

/// A DIDL-Lite `<item>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaItem {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    pub creator: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub class: String,
    pub album_art_uri: Option<String>,
    pub resources: Vec<MediaResource>,
}

impl MediaItem {
    /// The first resource whose URI equals `uri`
    pub fn resource_for_uri(&self, uri: &str) -> Option<&MediaResource> {
        self.resources.iter().find(|resource| resource.uri == uri)
    }

    /// Serialize this item as a standalone DIDL-Lite document
    pub fn to_didl(&self) -> String {
        let mut xml = String::from(DIDL_OPEN);
        write_item(&mut xml, self);
        xml.push_str(DIDL_CLOSE);
        xml
    }
}

/// A DIDL-Lite `<container>`
///
/// `items` holds children the caller has already browsed; a container read
/// from metadata carries only its own resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaContainer {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    pub class: String,
    pub resources: Vec<MediaResource>,
    pub items: Vec<MediaItem>,
}

/// A parsed DIDL-Lite document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DidlLite {
    pub items: Vec<MediaItem>,
    pub containers: Vec<MediaContainer>,
}

impl DidlLite {
    pub fn parse(xml: &str) -> Result<Self> {
        let trimmed = xml.trim();
        if trimmed.is_empty() || trimmed == NOT_IMPLEMENTED {
            return Err(ApiError::ParseError("no DIDL-Lite metadata".to_string()));
        }

        let raw: RawDidl = xml_utils::parse(trimmed)?;
        Ok(Self {
            items: raw.items.into_iter().map(RawItem::into_item).collect(),
            containers: raw
                .containers
                .into_iter()
                .map(RawContainer::into_container)
                .collect(),
        })
    }

    /// Parse metadata as reported by a device: empty strings and the
    /// `NOT_IMPLEMENTED` sentinel mean "no metadata"
    pub fn parse_reported(xml: &str) -> Option<Result<Self>> {
        let trimmed = xml.trim();
        if trimmed.is_empty() || trimmed == NOT_IMPLEMENTED {
            None
        } else {
            Some(Self::parse(trimmed))
        }
    }

    /// The first item holding a resource with this URI
    pub fn find_item_by_resource_uri(&self, uri: &str) -> Option<&MediaItem> {
        self.items
            .iter()
            .find(|item| item.resource_for_uri(uri).is_some())
    }
}

const DIDL_OPEN: &str = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">"#;
const DIDL_CLOSE: &str = "</DIDL-Lite>";

fn write_item(xml: &mut String, item: &MediaItem) {
    xml.push_str(&format!(
        r#"<item id="{}" parentID="{}" restricted="1">"#,
        xml_escape(&item.id),
        xml_escape(&item.parent_id)
    ));
    xml.push_str(&format!("<dc:title>{}</dc:title>", xml_escape(&item.title)));
    if let Some(creator) = &item.creator {
        xml.push_str(&format!("<dc:creator>{}</dc:creator>", xml_escape(creator)));
    }
    if let Some(artist) = &item.artist {
        xml.push_str(&format!("<upnp:artist>{}</upnp:artist>", xml_escape(artist)));
    }
    if let Some(album) = &item.album {
        xml.push_str(&format!("<upnp:album>{}</upnp:album>", xml_escape(album)));
    }
    if let Some(art) = &item.album_art_uri {
        xml.push_str(&format!(
            "<upnp:albumArtURI>{}</upnp:albumArtURI>",
            xml_escape(art)
        ));
    }
    xml.push_str(&format!("<upnp:class>{}</upnp:class>", xml_escape(&item.class)));
    for resource in &item.resources {
        xml.push_str(&format!(
            r#"<res protocolInfo="{}""#,
            xml_escape(&resource.protocol_info)
        ));
        if let Some(duration) = &resource.duration {
            xml.push_str(&format!(r#" duration="{}""#, xml_escape(duration)));
        }
        if let Some(size) = resource.size {
            xml.push_str(&format!(r#" size="{size}""#));
        }
        xml.push_str(&format!(">{}</res>", xml_escape(&resource.uri)));
    }
    xml.push_str("</item>");
}

#[derive(Debug, Deserialize)]
struct RawDidl {
    #[serde(rename = "item", default)]
    items: Vec<RawItem>,
    #[serde(rename = "container", default)]
    containers: Vec<RawContainer>,
}

#[derive(Debug, Deserialize, Default)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    #[serde(rename = "@protocolInfo", default)]
    protocol_info: String,
    #[serde(rename = "@duration", default)]
    duration: Option<String>,
    #[serde(rename = "@size", default)]
    size: Option<u64>,
    #[serde(rename = "$text", default)]
    uri: String,
}

impl From<RawResource> for MediaResource {
    fn from(raw: RawResource) -> Self {
        Self {
            uri: raw.uri.trim().to_string(),
            protocol_info: raw.protocol_info,
            duration: raw.duration,
            size: raw.size,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "@parentID", default)]
    parent_id: String,
    #[serde(default)]
    title: Option<Text>,
    #[serde(default)]
    creator: Option<Text>,
    #[serde(default)]
    artist: Vec<Text>,
    #[serde(default)]
    album: Option<Text>,
    #[serde(default)]
    class: Option<Text>,
    #[serde(rename = "albumArtURI", default)]
    album_art_uri: Vec<Text>,
    #[serde(default)]
    res: Vec<RawResource>,
}

impl RawItem {
    fn into_item(self) -> MediaItem {
        MediaItem {
            id: self.id,
            parent_id: self.parent_id,
            title: self.title.map(|t| t.value).unwrap_or_default(),
            creator: self.creator.map(|t| t.value),
            artist: self.artist.into_iter().next().map(|t| t.value),
            album: self.album.map(|t| t.value),
            class: self.class.map(|t| t.value).unwrap_or_default(),
            album_art_uri: self.album_art_uri.into_iter().next().map(|t| t.value),
            resources: self.res.into_iter().map(MediaResource::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawContainer {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "@parentID", default)]
    parent_id: String,
    #[serde(default)]
    title: Option<Text>,
    #[serde(default)]
    class: Option<Text>,
    #[serde(default)]
    res: Vec<RawResource>,
}

impl RawContainer {
    fn into_container(self) -> MediaContainer {
        MediaContainer {
            id: self.id,
            parent_id: self.parent_id,
            title: self.title.map(|t| t.value).unwrap_or_default(),
            class: self.class.map(|t| t.value).unwrap_or_default(),
            resources: self.res.into_iter().map(MediaResource::from).collect(),
            items: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK_METADATA: &str = r#"<DIDL-Lite xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/" xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/">
        <item id="42" parentID="7" restricted="1">
            <dc:title>Blue in Green</dc:title>
            <upnp:artist role="Performer">Miles Davis</upnp:artist>
            <upnp:album>Kind of Blue</upnp:album>
            <upnp:class>object.item.audioItem.musicTrack</upnp:class>
            <res protocolInfo="http-get:*:audio/flac:*" duration="0:05:37" size="4096">http://10.0.0.5:8200/42.flac</res>
            <res protocolInfo="http-get:*:audio/mpeg:*">http://10.0.0.5:8200/42.mp3</res>
        </item>
    </DIDL-Lite>"#;

    #[test]
    fn test_parse_item_with_resources() {
        let didl = DidlLite::parse(TRACK_METADATA).unwrap();
        assert_eq!(didl.items.len(), 1);

        let item = &didl.items[0];
        assert_eq!(item.id, "42");
        assert_eq!(item.parent_id, "7");
        assert_eq!(item.title, "Blue in Green");
        assert_eq!(item.artist.as_deref(), Some("Miles Davis"));
        assert_eq!(item.album.as_deref(), Some("Kind of Blue"));
        assert_eq!(item.class, "object.item.audioItem.musicTrack");
        assert_eq!(item.resources.len(), 2);
        assert_eq!(item.resources[0].duration.as_deref(), Some("0:05:37"));
        assert_eq!(item.resources[0].size, Some(4096));
        assert_eq!(item.resources[1].uri, "http://10.0.0.5:8200/42.mp3");
        assert_eq!(
            item.resources[1].parsed_protocol_info().unwrap().content_format,
            "audio/mpeg"
        );
    }

    #[test]
    fn test_find_item_by_resource_uri() {
        let didl = DidlLite::parse(TRACK_METADATA).unwrap();
        assert!(didl
            .find_item_by_resource_uri("http://10.0.0.5:8200/42.mp3")
            .is_some());
        assert!(didl.find_item_by_resource_uri("http://elsewhere/x.mp3").is_none());
    }

    #[test]
    fn test_parse_reported_sentinels() {
        assert!(DidlLite::parse_reported("").is_none());
        assert!(DidlLite::parse_reported(" NOT_IMPLEMENTED ").is_none());
        assert!(DidlLite::parse_reported(TRACK_METADATA).unwrap().is_ok());
        assert!(DidlLite::parse(NOT_IMPLEMENTED).is_err());
    }

    #[test]
    fn test_parse_container() {
        let xml = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/">
            <container id="pl1" parentID="0"><dc:title>Mix</dc:title>
                <res protocolInfo="http-get:*:audio/x-mpegurl:*">http://10.0.0.5/mix.m3u</res>
            </container>
        </DIDL-Lite>"#;

        let didl = DidlLite::parse(xml).unwrap();
        assert!(didl.items.is_empty());
        assert_eq!(didl.containers[0].title, "Mix");
        assert_eq!(didl.containers[0].resources[0].uri, "http://10.0.0.5/mix.m3u");
    }

    #[test]
    fn test_to_didl_escapes_and_parses_back() {
        let item = MediaItem {
            id: "1".to_string(),
            parent_id: "0".to_string(),
            title: "Rock & Roll".to_string(),
            class: "object.item.audioItem.musicTrack".to_string(),
            resources: vec![MediaResource::new(
                "http://10.0.0.5/a.mp3?x=1&y=2",
                "http-get:*:audio/mpeg:*",
            )],
            ..Default::default()
        };

        let xml = item.to_didl();
        assert!(xml.contains("Rock &amp; Roll"));
        assert!(xml.contains("x=1&amp;y=2"));

        let parsed = DidlLite::parse(&xml).unwrap();
        assert_eq!(parsed.items[0], item);
    }
}
