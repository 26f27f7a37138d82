use std::collections::{BTreeMap, HashMap, VecDeque};

use byteorder::{BigEndian, ByteOrder};

use crate::error::NpfError;
use crate::message::NpfMessage;

pub const NUM_PRIORITIES: usize = 6;
pub const TARGET_MTU: usize = 1280;
pub const MAX_ACK_RANGES: usize = 254;
pub const MAX_ACK_DELTA: u32 = 254;
const LOSSY_MARKER: u8 = 0x1F;

/// A compressed run of contiguous acknowledged packet sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AckRun {
    start: u32,
    count: u8,
}

fn runs_from_sorted(acks: &[u32]) -> Vec<AckRun> {
    let mut runs = Vec::new();
    let mut iter = acks.iter().copied();
    if let Some(mut start) = iter.next() {
        let mut count: u32 = 1;
        let mut prev = start;
        for ack in iter {
            if ack == prev + 1 && count < 255 {
                count += 1;
                prev = ack;
            } else {
                runs.push(AckRun { start, count: count as u8 });
                start = ack;
                prev = ack;
                count = 1;
            }
        }
        runs.push(AckRun { start, count: count as u8 });
    }
    runs
}

fn encode_acks(acks: &[u32]) -> Result<Vec<u8>, NpfError> {
    let mut sorted = acks.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let runs = runs_from_sorted(&sorted);
    if runs.len() > MAX_ACK_RANGES {
        return Err(NpfError::TooManyAckRanges);
    }

    let mut out = Vec::new();
    out.push(runs.len() as u8);
    let mut prev_start: Option<u32> = None;
    for run in &runs {
        match prev_start {
            None => {
                out.extend_from_slice(&run.start.to_be_bytes());
                out.push(run.count);
            }
            Some(prev) => {
                let delta = run.start.wrapping_sub(prev);
                if delta > 0 && delta <= MAX_ACK_DELTA {
                    out.push(delta as u8);
                    out.push(run.count);
                } else {
                    out.push(0);
                    out.extend_from_slice(&run.start.to_be_bytes());
                    out.push(run.count);
                }
            }
        }
        prev_start = Some(run.start);
    }
    Ok(out)
}

fn decode_acks(bytes: &[u8]) -> Result<(Vec<u32>, usize), NpfError> {
    let range_count = *bytes.first().ok_or(NpfError::Truncated)? as usize;
    let mut offset = 1;
    let mut acks = Vec::new();
    let mut prev_start: Option<u32> = None;

    for i in 0..range_count {
        if i == 0 {
            if bytes.len() < offset + 5 {
                return Err(NpfError::Truncated);
            }
            let start = BigEndian::read_u32(&bytes[offset..]);
            let count = bytes[offset + 4];
            acks.extend(start..=start.wrapping_add(count as u32));
            prev_start = Some(start);
            offset += 5;
        } else {
            if bytes.len() < offset + 2 {
                return Err(NpfError::Truncated);
            }
            let delta = bytes[offset];
            if delta == 0 {
                if bytes.len() < offset + 6 {
                    return Err(NpfError::Truncated);
                }
                let start = BigEndian::read_u32(&bytes[offset + 1..]);
                let count = bytes[offset + 5];
                acks.extend(start..=start.wrapping_add(count as u32));
                prev_start = Some(start);
                offset += 6;
            } else {
                let start = prev_start.unwrap_or(0).wrapping_add(delta as u32);
                let count = bytes[offset + 1];
                acks.extend(start..=start.wrapping_add(count as u32));
                prev_start = Some(start);
                offset += 2;
            }
        }
    }
    Ok((acks, offset))
}

/// A single message-fragment record (§4.4.3): a 28-bit message id
/// (delta-compressed when it fits in 12 bits), a length field whose
/// width depends on `short_length`, and either the total message
/// length (first fragment) or the fragment offset (later fragments).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentRecord {
    pub message_id: u32,
    pub is_fragmented: bool,
    pub is_first: bool,
    pub total_len_or_offset: u32,
    pub payload: Vec<u8>,
}

const FLAG_FRAGMENTED: u8 = 0b1000_0000;
const FLAG_FIRST: u8 = 0b0100_0000;
const FLAG_ID_DELTA: u8 = 0b0010_0000;
const FLAG_SHORT_LEN: u8 = 0b0001_0000;

impl FragmentRecord {
    fn encode(&self, previous_id: Option<u32>, out: &mut Vec<u8>) {
        let delta = previous_id.map(|prev| self.message_id.wrapping_sub(prev));
        let use_delta = matches!(delta, Some(d) if d < 4096);
        let short_len = self.payload.len() <= 0xFF;

        let mut flags = 0u8;
        if self.is_fragmented {
            flags |= FLAG_FRAGMENTED;
        }
        if self.is_first {
            flags |= FLAG_FIRST;
        }
        if use_delta {
            flags |= FLAG_ID_DELTA;
        }
        if short_len {
            flags |= FLAG_SHORT_LEN;
        }
        out.push(flags);

        if use_delta {
            let d = delta.unwrap();
            out.push(((d >> 8) & 0x0F) as u8);
            out.push((d & 0xFF) as u8);
        } else {
            out.extend_from_slice(&(self.message_id & 0x0FFF_FFFF).to_be_bytes());
        }

        if short_len {
            out.push(self.payload.len() as u8);
        } else {
            out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        }

        if self.is_fragmented {
            out.extend_from_slice(&self.total_len_or_offset.to_be_bytes());
        }

        out.extend_from_slice(&self.payload);
    }

    fn decode(bytes: &[u8], previous_id: Option<u32>) -> Result<(Self, usize), NpfError> {
        let flags = *bytes.first().ok_or(NpfError::Truncated)?;
        let is_fragmented = flags & FLAG_FRAGMENTED != 0;
        let is_first = flags & FLAG_FIRST != 0;
        let id_delta = flags & FLAG_ID_DELTA != 0;
        let short_len = flags & FLAG_SHORT_LEN != 0;
        let mut offset = 1;

        let message_id = if id_delta {
            if bytes.len() < offset + 2 {
                return Err(NpfError::Truncated);
            }
            let d = (((bytes[offset] & 0x0F) as u32) << 8) | bytes[offset + 1] as u32;
            offset += 2;
            previous_id.unwrap_or(0).wrapping_add(d)
        } else {
            if bytes.len() < offset + 4 {
                return Err(NpfError::Truncated);
            }
            let id = BigEndian::read_u32(&bytes[offset..]) & 0x0FFF_FFFF;
            offset += 4;
            id
        };

        let length = if short_len {
            let l = *bytes.get(offset).ok_or(NpfError::Truncated)? as usize;
            offset += 1;
            l
        } else {
            if bytes.len() < offset + 2 {
                return Err(NpfError::Truncated);
            }
            let l = BigEndian::read_u16(&bytes[offset..]) as usize;
            offset += 2;
            l
        };

        let total_len_or_offset = if is_fragmented {
            if bytes.len() < offset + 4 {
                return Err(NpfError::Truncated);
            }
            let v = BigEndian::read_u32(&bytes[offset..]);
            offset += 4;
            v
        } else {
            0
        };

        if bytes.len() < offset + length {
            return Err(NpfError::Truncated);
        }
        let payload = bytes[offset..offset + length].to_vec();
        offset += length;

        Ok((FragmentRecord { message_id, is_fragmented, is_first, total_len_or_offset, payload }, offset))
    }
}

/// A decoded or about-to-be-encoded NPF packet: the reliability layer
/// riding inside a single encrypted session packet (§4.4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct NpfPacket {
    pub seq: u32,
    pub acks: Vec<u32>,
    pub fragments: Vec<FragmentRecord>,
    pub lossy: Vec<NpfMessage>,
}

impl NpfPacket {
    pub fn to_bytes(&self) -> Result<Vec<u8>, NpfError> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&encode_acks(&self.acks)?);

        out.extend_from_slice(&(self.fragments.len() as u16).to_be_bytes());
        let mut prev_id = None;
        for frag in &self.fragments {
            frag.encode(prev_id, &mut out);
            prev_id = Some(frag.message_id);
        }

        out.push(self.lossy.len() as u8);
        for msg in &self.lossy {
            out.push(LOSSY_MARKER);
            let bytes = msg.to_bytes();
            out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
            out.extend_from_slice(&bytes);
        }
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NpfError> {
        if bytes.len() < 4 {
            return Err(NpfError::Truncated);
        }
        let seq = BigEndian::read_u32(bytes);
        let mut offset = 4;

        let (acks, consumed) = decode_acks(&bytes[offset..])?;
        offset += consumed;

        if bytes.len() < offset + 2 {
            return Err(NpfError::Truncated);
        }
        let fragment_count = BigEndian::read_u16(&bytes[offset..]);
        offset += 2;

        let mut fragments = Vec::with_capacity(fragment_count as usize);
        let mut prev_id = None;
        for _ in 0..fragment_count {
            let (frag, consumed) = FragmentRecord::decode(&bytes[offset..], prev_id)?;
            prev_id = Some(frag.message_id);
            offset += consumed;
            fragments.push(frag);
        }

        let lossy_count = *bytes.get(offset).ok_or(NpfError::Truncated)?;
        offset += 1;
        let mut lossy = Vec::with_capacity(lossy_count as usize);
        for _ in 0..lossy_count {
            if bytes.get(offset) != Some(&LOSSY_MARKER) {
                return Err(NpfError::Truncated);
            }
            offset += 1;
            if bytes.len() < offset + 2 {
                return Err(NpfError::Truncated);
            }
            let len = BigEndian::read_u16(&bytes[offset..]) as usize;
            offset += 2;
            let (msg, _) = NpfMessage::from_bytes(bytes.get(offset..offset + len).ok_or(NpfError::Truncated)?)
                .ok_or(NpfError::Truncated)?;
            offset += len;
            lossy.push(msg);
        }

        Ok(NpfPacket { seq, acks, fragments, lossy })
    }
}

struct PartialMessage {
    total_len: u32,
    chunks: BTreeMap<u32, Vec<u8>>,
    received: usize,
}

/// Reassembles fragmented messages across packets, keyed by message id
/// (§4.4.3). Duplicates are ignored; a non-first fragment seen before
/// its first fragment is rejected.
#[derive(Default)]
pub struct Reassembler {
    partial: HashMap<u32, PartialMessage>,
}

impl Reassembler {
    pub fn new() -> Self {
        Reassembler { partial: HashMap::new() }
    }

    pub fn feed(&mut self, frag: &FragmentRecord) -> Result<Option<Vec<u8>>, NpfError> {
        if !frag.is_fragmented {
            return Ok(Some(frag.payload.clone()));
        }

        if frag.is_first {
            let entry = self.partial.entry(frag.message_id).or_insert_with(|| PartialMessage {
                total_len: frag.total_len_or_offset,
                chunks: BTreeMap::new(),
                received: 0,
            });
            if entry.chunks.insert(0, frag.payload.clone()).is_none() {
                entry.received += frag.payload.len();
            }
        } else {
            let entry = self.partial.get_mut(&frag.message_id).ok_or(NpfError::NonFirstFragmentBeforeFirst)?;
            if entry.chunks.insert(frag.total_len_or_offset, frag.payload.clone()).is_none() {
                entry.received += frag.payload.len();
            }
        }

        let entry = self.partial.get(&frag.message_id).unwrap();
        if entry.received as u32 >= entry.total_len {
            let entry = self.partial.remove(&frag.message_id).unwrap();
            let mut full = Vec::with_capacity(entry.total_len as usize);
            for (_, chunk) in entry.chunks {
                full.extend_from_slice(&chunk);
            }
            return Ok(Some(full));
        }
        Ok(None)
    }
}

/// Six outgoing priority queues (§4.4.3, NumPriorities = 6). Packet
/// construction drains highest-to-lowest priority until the estimated
/// encrypted size approaches the MTU.
pub struct PriorityQueues {
    queues: [VecDeque<NpfMessage>; NUM_PRIORITIES],
}

impl Default for PriorityQueues {
    fn default() -> Self {
        PriorityQueues { queues: Default::default() }
    }
}

impl PriorityQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: NpfMessage) {
        let priority = (message.priority as usize).min(NUM_PRIORITIES - 1);
        self.queues[priority].push_back(message);
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }

    /// Drains queued messages into lossy NPF records until the
    /// estimated packet size approaches `mtu`. Messages that would
    /// overflow the packet stay queued for the next build.
    pub fn drain_into(&mut self, mtu: usize) -> Vec<NpfMessage> {
        let mut taken = Vec::new();
        let mut estimated = 10usize;
        for queue in &mut self.queues {
            while let Some(front) = queue.front() {
                let size = front.to_bytes().len() + 3;
                if estimated + size > mtu {
                    break;
                }
                estimated += size;
                taken.push(queue.pop_front().unwrap());
            }
        }
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    #[test]
    fn ack_ranges_round_trip_contiguous_and_gapped() {
        let acks = vec![5, 6, 7, 20, 21, 100];
        let encoded = encode_acks(&acks).unwrap();
        let (decoded, consumed) = decode_acks(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, acks);
    }

    #[test]
    fn packet_round_trips_with_fragments_and_lossy() {
        let packet = NpfPacket {
            seq: 42,
            acks: vec![1, 2, 3],
            fragments: vec![
                FragmentRecord { message_id: 10, is_fragmented: false, is_first: false, total_len_or_offset: 0, payload: vec![1, 2, 3] },
                FragmentRecord { message_id: 11, is_fragmented: true, is_first: true, total_len_or_offset: 20, payload: vec![4; 10] },
            ],
            lossy: vec![NpfMessage::new(MessageKind::Void, 5)],
        };
        let bytes = packet.to_bytes().unwrap();
        let decoded = NpfPacket::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn reassembler_emits_full_message_once_all_fragments_arrive() {
        let mut reassembler = Reassembler::new();
        let first = FragmentRecord { message_id: 1, is_fragmented: true, is_first: true, total_len_or_offset: 6, payload: vec![1, 2, 3] };
        let second = FragmentRecord { message_id: 1, is_fragmented: true, is_first: false, total_len_or_offset: 3, payload: vec![4, 5, 6] };
        assert_eq!(reassembler.feed(&first).unwrap(), None);
        assert_eq!(reassembler.feed(&second).unwrap(), Some(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn non_first_fragment_before_first_is_rejected() {
        let mut reassembler = Reassembler::new();
        let second = FragmentRecord { message_id: 9, is_fragmented: true, is_first: false, total_len_or_offset: 3, payload: vec![1, 2, 3] };
        assert!(reassembler.feed(&second).is_err());
    }
}
