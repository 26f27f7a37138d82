use std::net::SocketAddr;

use keys::Location;

/// The wire form of a peer reference, exchanged as the encrypted
/// payload of handshake messages M3/M4 (§4.4.1). Not named by the
/// distilled spec directly, but required for the handshake's
/// "encrypted node-reference payload" to carry anything meaningful —
/// without it a newly connected peer has no location or address to
/// route through.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRef {
    pub identity_hash: [u8; 32],
    pub location: Location,
    pub address: SocketAddr,
    pub build: u32,
}

impl NodeRef {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 8 + 19 + 4);
        out.extend_from_slice(&self.identity_hash);
        out.extend_from_slice(&self.location.value().to_be_bytes());
        match self.address {
            SocketAddr::V4(addr) => {
                out.push(4);
                out.extend_from_slice(&addr.ip().octets());
                out.extend_from_slice(&addr.port().to_be_bytes());
            }
            SocketAddr::V6(addr) => {
                out.push(6);
                out.extend_from_slice(&addr.ip().octets());
                out.extend_from_slice(&addr.port().to_be_bytes());
            }
        }
        out.extend_from_slice(&self.build.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 32 + 8 + 1 {
            return None;
        }
        let mut identity_hash = [0u8; 32];
        identity_hash.copy_from_slice(&bytes[0..32]);

        let mut loc_bytes = [0u8; 8];
        loc_bytes.copy_from_slice(&bytes[32..40]);
        let location = Location::from_raw(f64::from_be_bytes(loc_bytes));

        let version_tag = bytes[40];
        let (address, rest) = match version_tag {
            4 => {
                if bytes.len() < 40 + 1 + 4 + 2 {
                    return None;
                }
                let mut octets = [0u8; 4];
                octets.copy_from_slice(&bytes[41..45]);
                let port = u16::from_be_bytes([bytes[45], bytes[46]]);
                (SocketAddr::from((octets, port)), &bytes[47..])
            }
            6 => {
                if bytes.len() < 40 + 1 + 16 + 2 {
                    return None;
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&bytes[41..57]);
                let port = u16::from_be_bytes([bytes[57], bytes[58]]);
                (SocketAddr::from((octets, port)), &bytes[59..])
            }
            _ => return None,
        };

        if rest.len() < 4 {
            return None;
        }
        let build = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);

        Some(NodeRef { identity_hash, location, address, build })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ref_round_trips_through_bytes_for_v4_and_v6() {
        for address in ["203.0.113.5:9481".parse().unwrap(), "[2001:db8::1]:9481".parse().unwrap()] {
            let reference = NodeRef {
                identity_hash: [9u8; 32],
                location: Location::from_raw(0.42),
                address,
                build: 1,
            };
            let bytes = reference.to_bytes();
            let decoded = NodeRef::from_bytes(&bytes).unwrap();
            assert_eq!(decoded, reference);
        }
    }
}
