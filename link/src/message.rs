use byteorder::{BigEndian, ByteOrder};

/// The wire-known NPF message types (§4.4.3). Request-engine data-plane
/// names are preserved verbatim for interoperability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Void,
    Disconnect,
    Ping,
    Pong,
    CHKDataRequest,
    SSKDataRequest,
    Accepted,
    DataNotFound,
    RouteNotFound,
    RejectedOverload,
    RejectedLoop,
    RecentlyFailed,
    CHKDataFound,
    CHKData,
    SSKDataFoundHeaders,
    SSKDataFoundData,
    SSKPubKey,
    InsertRequest,
    DataInsert,
    InsertReply,
    DataInsertRejected,
    PacketTransmit,
    AllSent,
    AllReceived,
    SendAborted,
}

const KIND_TABLE: &[MessageKind] = &[
    MessageKind::Void,
    MessageKind::Disconnect,
    MessageKind::Ping,
    MessageKind::Pong,
    MessageKind::CHKDataRequest,
    MessageKind::SSKDataRequest,
    MessageKind::Accepted,
    MessageKind::DataNotFound,
    MessageKind::RouteNotFound,
    MessageKind::RejectedOverload,
    MessageKind::RejectedLoop,
    MessageKind::RecentlyFailed,
    MessageKind::CHKDataFound,
    MessageKind::CHKData,
    MessageKind::SSKDataFoundHeaders,
    MessageKind::SSKDataFoundData,
    MessageKind::SSKPubKey,
    MessageKind::InsertRequest,
    MessageKind::DataInsert,
    MessageKind::InsertReply,
    MessageKind::DataInsertRejected,
    MessageKind::PacketTransmit,
    MessageKind::AllSent,
    MessageKind::AllReceived,
    MessageKind::SendAborted,
];

impl MessageKind {
    pub fn as_u16(self) -> u16 {
        KIND_TABLE.iter().position(|&k| k == self).expect("exhaustive table") as u16 + 1
    }

    pub fn from_u16(tag: u16) -> Option<Self> {
        tag.checked_sub(1).and_then(|idx| KIND_TABLE.get(idx as usize).copied())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Bytes(Vec<u8>),
    Str(String),
}

impl FieldValue {
    fn type_tag(&self) -> u8 {
        match self {
            FieldValue::U8(_) => 0,
            FieldValue::U16(_) => 1,
            FieldValue::U32(_) => 2,
            FieldValue::U64(_) => 3,
            FieldValue::Bytes(_) => 4,
            FieldValue::Str(_) => 5,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            FieldValue::U8(v) => out.push(*v),
            FieldValue::U16(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::U32(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::U64(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Bytes(b) => {
                out.extend_from_slice(&(b.len() as u16).to_be_bytes());
                out.extend_from_slice(b);
            }
            FieldValue::Str(s) => {
                out.extend_from_slice(&(s.len() as u16).to_be_bytes());
                out.extend_from_slice(s.as_bytes());
            }
        }
    }

    fn read(tag: u8, bytes: &[u8]) -> Option<(Self, usize)> {
        match tag {
            0 => bytes.first().map(|&b| (FieldValue::U8(b), 1)),
            1 => (bytes.len() >= 2).then(|| (FieldValue::U16(BigEndian::read_u16(bytes)), 2)),
            2 => (bytes.len() >= 4).then(|| (FieldValue::U32(BigEndian::read_u32(bytes)), 4)),
            3 => (bytes.len() >= 8).then(|| (FieldValue::U64(BigEndian::read_u64(bytes)), 8)),
            4 => {
                if bytes.len() < 2 {
                    return None;
                }
                let len = BigEndian::read_u16(bytes) as usize;
                if bytes.len() < 2 + len {
                    return None;
                }
                Some((FieldValue::Bytes(bytes[2..2 + len].to_vec()), 2 + len))
            }
            5 => {
                if bytes.len() < 2 {
                    return None;
                }
                let len = BigEndian::read_u16(bytes) as usize;
                if bytes.len() < 2 + len {
                    return None;
                }
                let s = String::from_utf8(bytes[2..2 + len].to_vec()).ok()?;
                Some((FieldValue::Str(s), 2 + len))
            }
            _ => None,
        }
    }
}

/// A typed, priority-tagged application message (§4.4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct NpfMessage {
    pub kind: MessageKind,
    pub priority: u8,
    pub fields: Vec<(String, FieldValue)>,
}

impl NpfMessage {
    pub fn new(kind: MessageKind, priority: u8) -> Self {
        NpfMessage { kind, priority, fields: Vec::new() }
    }

    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.push((name.to_string(), value));
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.kind.as_u16().to_be_bytes());
        out.push(self.fields.len() as u8);
        for (name, value) in &self.fields {
            out.push(name.len() as u8);
            out.extend_from_slice(name.as_bytes());
            out.push(value.type_tag());
            value.write(&mut out);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<(Self, usize)> {
        if bytes.len() < 3 {
            return None;
        }
        let tag = BigEndian::read_u16(bytes);
        let kind = MessageKind::from_u16(tag)?;
        let field_count = bytes[2];
        let mut offset = 3;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let name_len = *bytes.get(offset)? as usize;
            offset += 1;
            let name = String::from_utf8(bytes.get(offset..offset + name_len)?.to_vec()).ok()?;
            offset += name_len;
            let field_type = *bytes.get(offset)?;
            offset += 1;
            let (value, consumed) = FieldValue::read(field_type, bytes.get(offset..)?)?;
            offset += consumed;
            fields.push((name, value));
        }
        Some((NpfMessage { kind, priority: 0, fields }, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_through_bytes() {
        let msg = NpfMessage::new(MessageKind::Ping, 1)
            .with_field("seqno", FieldValue::U32(7))
            .with_field("ts", FieldValue::U64(1234567890));
        let bytes = msg.to_bytes();
        let (decoded, consumed) = NpfMessage::from_bytes(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.kind, msg.kind);
        assert_eq!(decoded.fields, msg.fields);
    }

    #[test]
    fn kind_table_round_trips() {
        for tag in 1..=25u16 {
            let kind = MessageKind::from_u16(tag).unwrap();
            assert_eq!(kind.as_u16(), tag);
        }
    }
}
