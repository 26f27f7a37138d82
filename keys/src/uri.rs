use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::UriParseError;
use crate::extra::Extra;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Chk,
    Ssk,
    Ksk,
    Usk,
}

impl KeyType {
    fn parse(s: &str) -> Result<Self, UriParseError> {
        match s {
            "CHK" => Ok(KeyType::Chk),
            "SSK" => Ok(KeyType::Ssk),
            "KSK" => Ok(KeyType::Ksk),
            "USK" => Ok(KeyType::Usk),
            other => Err(UriParseError::UnknownKeyType(other.to_string())),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            KeyType::Chk => "CHK",
            KeyType::Ssk => "SSK",
            KeyType::Ksk => "KSK",
            KeyType::Usk => "USK",
        }
    }

    fn has_crypto_fields(self) -> bool {
        !matches!(self, KeyType::Ksk)
    }
}

/// An immutable, parsed Freenet-style URI (§3, §4.1). KSK carries only a
/// document name and metadata; the others carry a 32-byte routing key, a
/// 32-byte crypto key and 5 extra bytes in addition.
#[derive(Debug, Clone, PartialEq)]
pub struct Uri {
    pub key_type: KeyType,
    pub routing_key: Option<[u8; 32]>,
    pub crypto_key: Option<[u8; 32]>,
    pub extra: Option<Extra>,
    pub docname: Option<String>,
    /// `None` means "no edition suggested" (wire value -1). Only
    /// meaningful for USK.
    pub suggested_edition: Option<i64>,
    pub meta: Vec<String>,
}

fn strip_known_prefix(s: &str) -> &str {
    let s = s.strip_prefix("freenet:").unwrap_or(s);
    let s = s.strip_prefix("https://").unwrap_or(s);
    let s = s.strip_prefix("http://").unwrap_or(s);
    s.strip_prefix("//").unwrap_or(s)
}

fn decode_field(field: &str, name: &'static str, expected_len: usize) -> Result<Vec<u8>, UriParseError> {
    let bytes = STANDARD
        .decode(field)
        .map_err(|_| UriParseError::InvalidBase64 { field: name })?;
    if bytes.len() != expected_len {
        return Err(UriParseError::WrongFieldLength {
            field: name,
            expected: expected_len,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

impl Uri {
    pub fn parse(input: &str) -> Result<Self, UriParseError> {
        let input = strip_known_prefix(input);
        let at = input.find('@').ok_or(UriParseError::MissingAt)?;
        let (type_str, rest) = (&input[..at], &input[at + 1..]);
        let key_type = KeyType::parse(type_str)?;

        if key_type == KeyType::Ksk {
            let mut parts = rest.split('/');
            let docname = parts.next().ok_or(UriParseError::MissingDocname)?;
            if docname.is_empty() {
                return Err(UriParseError::MissingDocname);
            }
            let meta = parts.map(str::to_string).collect();
            return Ok(Uri {
                key_type,
                routing_key: None,
                crypto_key: None,
                extra: None,
                docname: Some(docname.to_string()),
                suggested_edition: None,
                meta,
            });
        }

        let (key_segment, tail) = match rest.find('/') {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
            None => (rest, None),
        };

        let mut fields: Vec<&str> = key_segment.split(',').collect();
        if key_type == KeyType::Chk {
            if let Some(last) = fields.last_mut() {
                if let Some(dot) = last.rfind('.') {
                    *last = &last[..dot];
                }
            }
        }
        if fields.len() != 3 {
            return Err(UriParseError::WrongFieldLength {
                field: "key segment (routing,crypto,extra)",
                expected: 3,
                actual: fields.len(),
            });
        }

        let routing_key = decode_field(fields[0], "routing-key", 32)?;
        let crypto_key = decode_field(fields[1], "crypto-key", 32)?;
        let extra_bytes = decode_field(fields[2], "extra", Extra::LEN)?;
        let extra = Extra::from_bytes(&extra_bytes)?;

        let mut routing_arr = [0u8; 32];
        routing_arr.copy_from_slice(&routing_key);
        let mut crypto_arr = [0u8; 32];
        crypto_arr.copy_from_slice(&crypto_key);

        let mut docname = None;
        let mut suggested_edition = None;
        let mut meta = Vec::new();

        if let Some(tail) = tail {
            let mut segments = tail.split('/').peekable();
            if key_type == KeyType::Ssk || key_type == KeyType::Usk {
                if let Some(name) = segments.next() {
                    docname = Some(name.to_string());
                }
            }
            if key_type == KeyType::Usk {
                if let Some(&edition_str) = segments.peek() {
                    if let Ok(edition) = edition_str.parse::<i64>() {
                        suggested_edition = Some(edition);
                        segments.next();
                    }
                }
            }
            meta = segments.map(str::to_string).collect();
        }

        Ok(Uri {
            key_type,
            routing_key: Some(routing_arr),
            crypto_key: Some(crypto_arr),
            extra: Some(extra),
            docname,
            suggested_edition,
            meta,
        })
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(self.key_type.as_str());
        out.push('@');

        if self.key_type == KeyType::Ksk {
            out.push_str(self.docname.as_deref().unwrap_or(""));
            for m in &self.meta {
                out.push('/');
                out.push_str(m);
            }
            return out;
        }

        let routing = self.routing_key.expect("non-KSK URI must carry a routing key");
        let crypto = self.crypto_key.expect("non-KSK URI must carry a crypto key");
        let extra = self.extra.expect("non-KSK URI must carry extra bytes");

        out.push_str(&STANDARD.encode(routing));
        out.push(',');
        out.push_str(&STANDARD.encode(crypto));
        out.push(',');
        out.push_str(&STANDARD.encode(extra.to_bytes()));

        if let Some(name) = &self.docname {
            out.push('/');
            out.push_str(name);
        }
        if let Some(edition) = self.suggested_edition {
            out.push('/');
            out.push_str(&edition.to_string());
        }
        for m in &self.meta {
            out.push('/');
            out.push_str(m);
        }
        out
    }

    pub fn requires_crypto_fields(&self) -> bool {
        self.key_type.has_crypto_fields()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extra::CryptoAlgorithm;
    use proptest::prop_assert_eq;

    fn b64_32(fill: u8) -> String {
        STANDARD.encode([fill; 32])
    }

    #[test]
    fn round_trip_chk_with_extension_hint() {
        let extra = Extra {
            reserved_or_version: 0,
            flag_byte: 0,
            algorithm: CryptoAlgorithm::AesCtr256Sha256,
            compression: None,
        };
        let uri_str = format!(
            "CHK@{},{},{}.myfile.txt",
            b64_32(1),
            b64_32(2),
            STANDARD.encode(extra.to_bytes()),
        );
        let parsed = Uri::parse(&uri_str).unwrap();
        assert_eq!(parsed.key_type, KeyType::Chk);
        assert_eq!(parsed.routing_key.unwrap(), [1u8; 32]);
        assert_eq!(parsed.extra.unwrap().compression_unsigned(), 0xFFFF);
    }

    #[test]
    fn round_trip_via_parse_serialize() {
        let extra = Extra {
            reserved_or_version: 0,
            flag_byte: 0,
            algorithm: CryptoAlgorithm::AesCtr256Sha256,
            compression: None,
        };
        let uri_str = format!("CHK@{},{},{}/myfile.txt", b64_32(9), b64_32(5), STANDARD.encode(extra.to_bytes()));
        let parsed = Uri::parse(&uri_str).unwrap();
        assert_eq!(parsed.meta, vec!["myfile.txt".to_string()]);
        assert_eq!(parsed.serialize(), uri_str);
    }

    #[test]
    fn missing_at_is_an_error() {
        assert_eq!(Uri::parse("not-a-uri").unwrap_err(), UriParseError::MissingAt);
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(matches!(Uri::parse("XYZ@abc").unwrap_err(), UriParseError::UnknownKeyType(_)));
    }

    #[test]
    fn ksk_round_trip() {
        let parsed = Uri::parse("KSK@mypage/index.html").unwrap();
        assert_eq!(parsed.docname.as_deref(), Some("mypage"));
        assert_eq!(parsed.meta, vec!["index.html".to_string()]);
        assert_eq!(parsed.serialize(), "KSK@mypage/index.html");
    }

    proptest::proptest! {
        #[test]
        fn parse_of_serialize_is_identity(
            routing in proptest::collection::vec(proptest::prelude::any::<u8>(), 32..=32),
            crypto in proptest::collection::vec(proptest::prelude::any::<u8>(), 32..=32),
            meta in proptest::collection::vec("[a-z0-9]{1,8}", 0..3),
        ) {
            let mut routing_arr = [0u8; 32];
            routing_arr.copy_from_slice(&routing);
            let mut crypto_arr = [0u8; 32];
            crypto_arr.copy_from_slice(&crypto);

            let uri = Uri {
                key_type: KeyType::Chk,
                routing_key: Some(routing_arr),
                crypto_key: Some(crypto_arr),
                extra: Some(Extra {
                    reserved_or_version: 0,
                    flag_byte: 0,
                    algorithm: CryptoAlgorithm::AesCtr256Sha256,
                    compression: None,
                }),
                docname: None,
                suggested_edition: None,
                meta,
            };

            let serialized = uri.serialize();
            let reparsed = Uri::parse(&serialized).unwrap();
            prop_assert_eq!(reparsed, uri);
        }
    }
}
