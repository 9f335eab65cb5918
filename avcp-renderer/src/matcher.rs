//! Resource selection against a device's sink protocol-info list
//!
//! Candidates are ranked by the position of the first device entry that
//! accepts their protocol info (earlier entries are preferred by the
//! device), and by network locality: a resource served from an address close
//! to the renderer's own address wins over a distant one.

use std::net::Ipv4Addr;

use avcp_api::{MediaResource, ProtocolInfo};
use url::{Host, Url};

/// Locality assigned to resources whose host is not a literal IPv4 address
pub const MAX_DISTANCE: u64 = u64::MAX;

/// Rank of a protocol info against a device list
///
/// `len - index` of the first matching entry; 0 means unsupported.
pub fn protocol_rank(device_protocols: &[ProtocolInfo], candidate: &ProtocolInfo) -> usize {
    device_protocols
        .iter()
        .position(|entry| entry.matches(candidate))
        .map_or(0, |index| device_protocols.len() - index)
}

/// Rank of a resource, 0 when its protocol info is malformed or unsupported
pub fn resource_rank(device_protocols: &[ProtocolInfo], resource: &MediaResource) -> usize {
    resource
        .parsed_protocol_info()
        .map_or(0, |info| protocol_rank(device_protocols, &info))
}

/// Bit-reversed XOR distance between two IPv4 addresses
///
/// The octets are read little-endian and the XOR is bit-reversed, so the
/// first octet lands in the most significant bits: addresses sharing a
/// longer leading prefix are closer.
pub fn ipv4_distance(a: Ipv4Addr, b: Ipv4Addr) -> u64 {
    let xor = u32::from_le_bytes(a.octets()) ^ u32::from_le_bytes(b.octets());
    u64::from(xor.reverse_bits())
}

/// Locality of a resource URI relative to the device address
pub fn locality(device_addr: Option<Ipv4Addr>, uri: &str) -> u64 {
    let Some(device_addr) = device_addr else {
        return MAX_DISTANCE;
    };
    match Url::parse(uri).ok().as_ref().and_then(Url::host) {
        Some(Host::Ipv4(host)) => ipv4_distance(device_addr, host),
        _ => MAX_DISTANCE,
    }
}

/// True if any resource is accepted by some device entry
pub fn is_compatible(device_protocols: &[ProtocolInfo], resources: &[MediaResource]) -> bool {
    resources
        .iter()
        .any(|resource| resource_rank(device_protocols, resource) > 0)
}

/// Pick the best resource for a device
///
/// Minimal locality wins, then maximal rank, then the earliest candidate.
/// Unsupported candidates are never chosen.
pub fn best_match<'a>(
    device_protocols: &[ProtocolInfo],
    device_addr: Option<Ipv4Addr>,
    candidates: &'a [MediaResource],
) -> Option<&'a MediaResource> {
    let mut best: Option<(u64, usize, &'a MediaResource)> = None;

    for candidate in candidates {
        let rank = resource_rank(device_protocols, candidate);
        if rank == 0 {
            continue;
        }
        let distance = locality(device_addr, &candidate.uri);
        let better = match best {
            None => true,
            Some((best_distance, best_rank, _)) => {
                distance < best_distance || (distance == best_distance && rank > best_rank)
            }
        };
        if better {
            best = Some((distance, rank, candidate));
        }
    }

    best.map(|(_, _, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn protocols(entries: &[&str]) -> Vec<ProtocolInfo> {
        entries.iter().map(|e| e.parse().unwrap()).collect()
    }

    fn res(uri: &str, protocol_info: &str) -> MediaResource {
        MediaResource::new(uri, protocol_info)
    }

    const DEVICE: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

    #[test]
    fn test_protocol_rank_prefers_earlier_entries() {
        let device = protocols(&["http-get:*:audio/flac:*", "http-get:*:audio/mpeg:*"]);
        let flac = "http-get:*:audio/flac:*".parse().unwrap();
        let mp3 = "http-get:*:audio/mpeg:*".parse().unwrap();
        let ogg = "http-get:*:audio/ogg:*".parse().unwrap();

        assert_eq!(protocol_rank(&device, &flac), 2);
        assert_eq!(protocol_rank(&device, &mp3), 1);
        assert_eq!(protocol_rank(&device, &ogg), 0);
    }

    #[test]
    fn test_ipv4_distance_orders_by_leading_octets() {
        let same_subnet = ipv4_distance(DEVICE, Ipv4Addr::new(192, 168, 1, 99));
        let other_subnet = ipv4_distance(DEVICE, Ipv4Addr::new(192, 168, 7, 20));
        let other_network = ipv4_distance(DEVICE, Ipv4Addr::new(10, 168, 1, 20));

        assert_eq!(ipv4_distance(DEVICE, DEVICE), 0);
        assert!(same_subnet < other_subnet);
        assert!(other_subnet < other_network);
    }

    #[rstest]
    #[case(Some(DEVICE), "http://192.168.1.20:8200/a.mp3", 0)]
    #[case(Some(DEVICE), "http://media.local/a.mp3", MAX_DISTANCE)]
    #[case(Some(DEVICE), "http://[fe80::1]/a.mp3", MAX_DISTANCE)]
    #[case(Some(DEVICE), "not a uri", MAX_DISTANCE)]
    #[case(None, "http://192.168.1.20/a.mp3", MAX_DISTANCE)]
    fn test_locality(#[case] device: Option<Ipv4Addr>, #[case] uri: &str, #[case] expected: u64) {
        assert_eq!(locality(device, uri), expected);
    }

    #[test]
    fn test_best_match_prefers_locality_over_rank() {
        let device = protocols(&["http-get:*:audio/flac:*", "http-get:*:audio/mpeg:*"]);
        let candidates = vec![
            res("http://10.0.0.5/a.flac", "http-get:*:audio/flac:*"),
            res("http://192.168.1.30/a.mp3", "http-get:*:audio/mpeg:*"),
        ];
        let chosen = best_match(&device, Some(DEVICE), &candidates).unwrap();
        assert_eq!(chosen.uri, "http://192.168.1.30/a.mp3");
    }

    #[test]
    fn test_best_match_breaks_locality_ties_by_rank() {
        let device = protocols(&["http-get:*:audio/flac:*", "http-get:*:audio/mpeg:*"]);
        let candidates = vec![
            res("http://192.168.1.30/a.mp3", "http-get:*:audio/mpeg:*"),
            res("http://192.168.1.30/a.flac", "http-get:*:audio/flac:*"),
        ];
        let chosen = best_match(&device, Some(DEVICE), &candidates).unwrap();
        assert_eq!(chosen.uri, "http://192.168.1.30/a.flac");
    }

    #[test]
    fn test_best_match_keeps_distant_but_compatible_candidates() {
        let device = protocols(&["http-get:*:audio/mpeg:*"]);
        let candidates = vec![
            res("http://192.168.1.20/a.ogg", "http-get:*:audio/ogg:*"),
            res("http://media.example.com/a.mp3", "http-get:*:audio/mpeg:*"),
            res("::garbage::", "http-get:*:audio/mpeg:*"),
        ];
        let chosen = best_match(&device, Some(DEVICE), &candidates).unwrap();
        assert_eq!(chosen.uri, "http://media.example.com/a.mp3");
    }

    #[test]
    fn test_best_match_none_when_incompatible() {
        let device = protocols(&["http-get:*:audio/mpeg:*"]);
        let candidates = vec![
            res("http://192.168.1.20/a.ogg", "http-get:*:audio/ogg:*"),
            res("http://192.168.1.20/a.bin", "malformed"),
        ];
        assert!(best_match(&device, Some(DEVICE), &candidates).is_none());
        assert!(!is_compatible(&device, &candidates));
        assert!(best_match(&device, Some(DEVICE), &[]).is_none());
        assert!(!is_compatible(&[], &candidates));
    }

    fn candidate_strategy() -> impl Strategy<Value = MediaResource> {
        let host = prop_oneof![
            (any::<u8>(), any::<u8>()).prop_map(|(c, d)| format!("192.168.{c}.{d}")),
            Just("media.local".to_string()),
            Just("10.1.2.3".to_string()),
        ];
        let format = prop::sample::select(vec!["audio/mpeg", "audio/flac", "audio/ogg", "video/mp4"]);
        (host, format, 0u16..1000).prop_map(|(host, format, n)| {
            res(&format!("http://{host}/{n}"), &format!("http-get:*:{format}:*"))
        })
    }

    proptest! {
        #[test]
        fn prop_best_match_is_deterministic(
            candidates in prop::collection::vec(candidate_strategy(), 0..12),
            a in any::<u8>(),
            b in any::<u8>(),
        ) {
            let device = protocols(&["http-get:*:audio/flac:*", "http-get:*:audio/mpeg:*", "http-get:*:video/*:*"]);
            let addr = Some(Ipv4Addr::new(192, 168, a, b));

            let first = best_match(&device, addr, &candidates).map(|c| c as *const MediaResource);
            for _ in 0..3 {
                let again = best_match(&device, addr, &candidates).map(|c| c as *const MediaResource);
                prop_assert_eq!(first, again);
            }
        }

        #[test]
        fn prop_best_match_is_compatible_and_optimal(
            candidates in prop::collection::vec(candidate_strategy(), 0..12),
        ) {
            let device = protocols(&["http-get:*:audio/flac:*", "http-get:*:audio/mpeg:*"]);
            let addr = Some(DEVICE);

            match best_match(&device, addr, &candidates) {
                None => prop_assert!(!is_compatible(&device, &candidates)),
                Some(chosen) => {
                    let key = |r: &MediaResource| (locality(addr, &r.uri), std::cmp::Reverse(resource_rank(&device, r)));
                    prop_assert!(resource_rank(&device, chosen) > 0);
                    for other in candidates.iter().filter(|r| resource_rank(&device, r) > 0) {
                        prop_assert!(key(chosen) <= key(other));
                    }
                }
            }
        }
    }
}
