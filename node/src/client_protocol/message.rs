use std::collections::BTreeMap;

/// A parsed client-protocol message (§6.2): `MessageName`, then
/// `Key=Value` lines, optionally a trailing `DataLength`/`Data` pair,
/// terminated by `EndMessage`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMessage {
    pub name: String,
    pub fields: BTreeMap<String, String>,
    pub data: Option<Vec<u8>>,
}

impl TextMessage {
    pub fn new(name: &str) -> Self {
        TextMessage { name: name.to_string(), fields: BTreeMap::new(), data: None }
    }

    pub fn with_field(mut self, key: &str, value: impl ToString) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn required_field(&self, key: &str) -> Result<&str, ProtocolError> {
        self.field(key).ok_or_else(|| ProtocolError::missing_field(key))
    }

    /// Serializes to the wire framing: lines end with `\n`, `Data`
    /// (if present) is written as raw bytes right after its
    /// `DataLength` line, and the whole message ends with
    /// `EndMessage\n`.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.name.as_bytes());
        out.push(b'\n');
        for (key, value) in &self.fields {
            out.extend_from_slice(key.as_bytes());
            out.push(b'=');
            out.extend_from_slice(value.as_bytes());
            out.push(b'\n');
        }
        if let Some(data) = &self.data {
            out.extend_from_slice(format!("DataLength={}\n", data.len()).as_bytes());
            out.extend_from_slice(b"Data\n");
            out.extend_from_slice(data);
        }
        out.extend_from_slice(b"EndMessage\n");
        out
    }
}

/// Error codes and descriptions are fixed by §6.2; only the subset
/// this node actually raises is enumerated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorCode {
    MessageParse = 1,
    MissingField = 2,
    UriParse = 4,
    IdentifierCollision = 5,
    ClientHelloMustBeFirst = 18,
    Internal = 15,
    TooManyActive = 16,
    FileTooBig = 17,
    NumberParse = 27,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolError {
    pub code: ProtocolErrorCode,
    pub description: String,
    pub fatal: bool,
}

impl ProtocolError {
    pub fn missing_field(field: &str) -> Self {
        ProtocolError {
            code: ProtocolErrorCode::MissingField,
            description: format!("missing required field: {}", field),
            fatal: false,
        }
    }

    pub fn into_message(self) -> TextMessage {
        TextMessage::new("ProtocolError")
            .with_field("Code", self.code as i32)
            .with_field("CodeDescription", self.description)
            .with_field("Fatal", self.fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_round_trips_field_order_and_data() {
        let msg = TextMessage::new("ClientGet")
            .with_field("Identifier", "req-1")
            .with_field("URI", "CHK@abc")
            .with_data(vec![1, 2, 3]);
        let wire = msg.to_wire();
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("ClientGet\n"));
        assert!(text.contains("Identifier=req-1\n"));
        assert!(text.contains("DataLength=3\n"));
        assert!(text.ends_with("EndMessage\n"));
    }

    #[test]
    fn missing_field_reports_the_right_code() {
        let msg = TextMessage::new("ClientGet").with_field("URI", "CHK@abc");
        let err = msg.required_field("Identifier").unwrap_err();
        assert_eq!(err.code, ProtocolErrorCode::MissingField);
    }
}
