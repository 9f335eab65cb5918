//! XML helpers shared by event and metadata parsing.

use crate::{ApiError, Result};
use serde::de::DeserializeOwned;

/// Parse XML into a deserializable type after stripping namespace prefixes.
///
/// UPnP documents mix prefixes (`dc:`, `upnp:`, `e:`) freely; removing them
/// lets serde structs use plain local names.
pub fn parse<T: DeserializeOwned>(xml: &str) -> Result<T> {
    let stripped = strip_namespaces(xml);
    quick_xml::de::from_str(&stripped)
        .map_err(|e| ApiError::ParseError(format!("XML deserialization failed: {e}")))
}

/// Strip namespace prefixes from element and attribute names and drop
/// `xmlns` declarations.
///
/// Input: `<e:propertyset xmlns:e="urn:x"><dc:title>Song</dc:title></e:propertyset>`
/// Output: `<propertyset><title>Song</title></propertyset>`
pub fn strip_namespaces(xml: &str) -> String {
    let mut result = String::with_capacity(xml.len());
    let mut chars = xml.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '<' {
            result.push(c);
            continue;
        }
        result.push(c);

        if let Some(slash) = chars.next_if_eq(&'/') {
            result.push(slash);
        }

        // Declarations, comments and CDATA are copied through untouched
        if matches!(chars.peek(), Some('?') | Some('!')) {
            for ch in chars.by_ref() {
                result.push(ch);
                if ch == '>' {
                    break;
                }
            }
            continue;
        }

        let mut tag_name = String::new();
        while let Some(ch) = chars.next_if(|ch| !ch.is_whitespace() && *ch != '>' && *ch != '/') {
            tag_name.push(ch);
        }
        result.push_str(local_name(&tag_name));

        // Attributes
        while let Some(&ch) = chars.peek() {
            if ch == '>' {
                chars.next();
                result.push(ch);
                break;
            }
            if ch == '/' || ch.is_whitespace() {
                chars.next();
                result.push(ch);
                continue;
            }

            let mut attr_name = String::new();
            while let Some(ach) =
                chars.next_if(|ach| *ach != '=' && !ach.is_whitespace() && *ach != '>' && *ach != '/')
            {
                attr_name.push(ach);
            }

            let keep = !(attr_name == "xmlns" || attr_name.starts_with("xmlns:"));
            if keep {
                result.push_str(local_name(&attr_name));
            }

            // '=' and the quoted value
            while let Some(&ach) = chars.peek() {
                if ach == '>' || ach == '/' || ach.is_whitespace() {
                    break;
                }
                chars.next();
                if ach == '"' || ach == '\'' {
                    if keep {
                        result.push(ach);
                    }
                    for ch in chars.by_ref() {
                        if keep {
                            result.push(ch);
                        }
                        if ch == ach {
                            break;
                        }
                    }
                    break;
                }
                if keep {
                    result.push(ach);
                }
            }
        }
    }

    result
}

fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_strip_namespaces_elements_and_declarations() {
        let input = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><dc:title>Song</dc:title></e:property></e:propertyset>"#;
        assert_eq!(
            strip_namespaces(input),
            "<propertyset><property><title>Song</title></property></propertyset>"
        );
    }

    #[test]
    fn test_strip_namespaces_attributes() {
        let input = r#"<DIDL-Lite xmlns="urn:x" xmlns:dc="urn:dc"><item id="1" dlna:flag='a b'/></DIDL-Lite>"#;
        assert_eq!(
            strip_namespaces(input),
            r#"<DIDL-Lite  ><item id="1" flag='a b'/></DIDL-Lite>"#
        );
    }

    #[test]
    fn test_strip_namespaces_keeps_prolog_and_text() {
        let input = r#"<?xml version="1.0"?><a:b>x:y &amp; z</a:b>"#;
        assert_eq!(strip_namespaces(input), r#"<?xml version="1.0"?><b>x:y &amp; z</b>"#);
    }

    #[test]
    fn test_parse_into_struct() {
        #[derive(Debug, Deserialize)]
        struct Title {
            #[serde(rename = "$text")]
            value: String,
        }

        let parsed: Title = parse(r#"<dc:title xmlns:dc="urn:dc">Hello</dc:title>"#).unwrap();
        assert_eq!(parsed.value, "Hello");

        let err = parse::<Title>("<unclosed>").unwrap_err();
        assert!(matches!(err, ApiError::ParseError(_)));
    }
}
