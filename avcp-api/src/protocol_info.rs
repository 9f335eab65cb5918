//! UPnP protocol-info values
//!
//! A protocol-info string has four colon-separated fields,
//! `protocol:network:contentFormat:additionalInfo`, for example
//! `http-get:*:audio/mpeg:DLNA.ORG_PN=MP3`. Any field may be the wildcard
//! `*`. ConnectionManager reports lists of them as comma-separated strings.

use std::fmt;
use std::str::FromStr;

use crate::error::ApiError;

const WILDCARD: &str = "*";

/// Content formats that describe a playlist rather than a single stream
const PLAYLIST_FORMATS: &[&str] = &[
    "audio/x-mpegurl",
    "audio/mpegurl",
    "application/x-mpegurl",
    "application/vnd.apple.mpegurl",
    "audio/x-scpls",
    "audio/x-ms-wax",
    "video/x-ms-asf",
    "video/x-ms-wvx",
    "application/xspf+xml",
];

/// One parsed protocol-info entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolInfo {
    pub protocol: String,
    pub network: String,
    pub content_format: String,
    pub additional_info: String,
}

impl ProtocolInfo {
    pub fn new(
        protocol: impl Into<String>,
        network: impl Into<String>,
        content_format: impl Into<String>,
        additional_info: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            network: network.into(),
            content_format: content_format.into(),
            additional_info: additional_info.into(),
        }
    }

    /// `*:*:*:*`
    pub fn wildcard() -> Self {
        Self::new(WILDCARD, WILDCARD, WILDCARD, WILDCARD)
    }

    /// True when every field is the wildcard
    pub fn is_wildcard(&self) -> bool {
        [
            &self.protocol,
            &self.network,
            &self.content_format,
            &self.additional_info,
        ]
        .iter()
        .all(|field| field.as_str() == WILDCARD)
    }

    /// True when the content format names a playlist type
    pub fn is_playlist(&self) -> bool {
        let format = self.content_format.to_ascii_lowercase();
        PLAYLIST_FORMATS.contains(&format.as_str())
    }

    /// Whether `candidate` is accepted by this entry
    ///
    /// `self` plays the role of a device-advertised pattern. Protocol and
    /// content format compare case-insensitively, network exactly; a `*` on
    /// either side matches anything. The additional-info field also matches
    /// when every `name=value` parameter of the pattern appears in the
    /// candidate.
    pub fn matches(&self, candidate: &ProtocolInfo) -> bool {
        field_matches(&self.protocol, &candidate.protocol, true)
            && field_matches(&self.network, &candidate.network, false)
            && field_matches(&self.content_format, &candidate.content_format, true)
            && additional_info_matches(&self.additional_info, &candidate.additional_info)
    }

    /// Parse a comma-separated protocol-info list, skipping malformed entries
    ///
    /// Order is preserved; devices list entries by preference.
    pub fn parse_list(list: &str) -> Vec<ProtocolInfo> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| entry.parse().ok())
            .collect()
    }

    /// Format a list back into its comma-separated wire form
    pub fn format_list(list: &[ProtocolInfo]) -> String {
        list.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn field_matches(pattern: &str, candidate: &str, ignore_case: bool) -> bool {
    if pattern == WILDCARD || candidate == WILDCARD {
        return true;
    }
    if ignore_case {
        pattern.eq_ignore_ascii_case(candidate)
    } else {
        pattern == candidate
    }
}

fn additional_info_matches(pattern: &str, candidate: &str) -> bool {
    if field_matches(pattern, candidate, false) {
        return true;
    }
    let offered: Vec<&str> = candidate.split(';').map(str::trim).collect();
    pattern
        .split(';')
        .map(str::trim)
        .filter(|param| !param.is_empty())
        .all(|param| offered.contains(&param))
}

impl FromStr for ProtocolInfo {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.trim().splitn(4, ':');
        let mut next = |name: &str| {
            fields
                .next()
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .ok_or_else(|| ApiError::ParseError(format!("protocol info '{s}' has no {name} field")))
        };
        let protocol = next("protocol")?.to_string();
        let network = next("network")?.to_string();
        let content_format = next("content format")?.to_string();
        let additional_info = next("additional info")?.to_string();

        Ok(Self {
            protocol,
            network,
            content_format,
            additional_info,
        })
    }
}

impl fmt::Display for ProtocolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.protocol, self.network, self.content_format, self.additional_info
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn info(s: &str) -> ProtocolInfo {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let parsed = info("http-get:*:audio/mpeg:DLNA.ORG_PN=MP3;DLNA.ORG_OP=01");
        assert_eq!(parsed.protocol, "http-get");
        assert_eq!(parsed.network, "*");
        assert_eq!(parsed.content_format, "audio/mpeg");
        assert_eq!(parsed.additional_info, "DLNA.ORG_PN=MP3;DLNA.ORG_OP=01");
        assert_eq!(
            parsed.to_string(),
            "http-get:*:audio/mpeg:DLNA.ORG_PN=MP3;DLNA.ORG_OP=01"
        );
    }

    #[test]
    fn test_additional_info_may_contain_colons() {
        let parsed = info("rtsp-rtp-udp:*:audio/L16:rate=44100:channels=2");
        assert_eq!(parsed.additional_info, "rate=44100:channels=2");
    }

    #[rstest]
    #[case("")]
    #[case("http-get")]
    #[case("http-get:*:audio/mpeg")]
    #[case("http-get::audio/mpeg:*")]
    fn test_parse_rejects_malformed(#[case] input: &str) {
        assert!(input.parse::<ProtocolInfo>().is_err());
    }

    #[rstest]
    #[case("http-get:*:audio/mpeg:*", "http-get:*:audio/mpeg:DLNA.ORG_PN=MP3", true)]
    #[case("http-get:*:audio/mpeg:*", "HTTP-GET:*:Audio/MPEG:*", true)]
    #[case("http-get:*:audio/mpeg:*", "http-get:*:audio/flac:*", false)]
    #[case("http-get:*:*:*", "http-get:*:video/mp4:*", true)]
    #[case("rtsp-rtp-udp:*:audio/mpeg:*", "http-get:*:audio/mpeg:*", false)]
    #[case("http-get:lan:audio/mpeg:*", "http-get:wan:audio/mpeg:*", false)]
    #[case("http-get:*:audio/mpeg:DLNA.ORG_PN=MP3", "http-get:*:audio/mpeg:DLNA.ORG_PN=MP3;DLNA.ORG_OP=01", true)]
    #[case("http-get:*:audio/mpeg:DLNA.ORG_PN=MP3", "http-get:*:audio/mpeg:DLNA.ORG_PN=MP3X", false)]
    #[case("*:*:*:*", "http-get:*:audio/mpeg:*", true)]
    fn test_matches(#[case] pattern: &str, #[case] candidate: &str, #[case] expected: bool) {
        assert_eq!(info(pattern).matches(&info(candidate)), expected);
    }

    #[test]
    fn test_parse_list_preserves_order_and_skips_garbage() {
        let list = ProtocolInfo::parse_list(
            "http-get:*:audio/flac:*, garbage ,,http-get:*:audio/mpeg:*",
        );
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].content_format, "audio/flac");
        assert_eq!(list[1].content_format, "audio/mpeg");
        assert_eq!(
            ProtocolInfo::format_list(&list),
            "http-get:*:audio/flac:*,http-get:*:audio/mpeg:*"
        );
        assert!(ProtocolInfo::parse_list("").is_empty());
    }

    #[test]
    fn test_playlist_and_wildcard() {
        assert!(info("http-get:*:audio/x-mpegurl:*").is_playlist());
        assert!(info("http-get:*:Audio/MPEGURL:*").is_playlist());
        assert!(!info("http-get:*:audio/mpeg:*").is_playlist());
        assert!(ProtocolInfo::wildcard().is_wildcard());
        assert!(!info("http-get:*:*:*").is_wildcard());
    }
}
