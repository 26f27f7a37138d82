use std::time::{Duration, Instant};

use link::{FieldValue, MessageKind, NpfMessage};

use crate::state::TerminalStatus;

/// What a downstream reply means for the forwarding request (§4.6's
/// forward policy): either the request is done, it should wait
/// unchanged for the originator to see a `RecentlyFailed` quench, or
/// the failure is non-fatal and routing may re-select among the
/// peers not yet tried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForwardOutcome {
    Terminal(TerminalStatus),
    RecentlyFailed(Instant),
    Reselect,
}

/// Classifies an inbound data-plane reply against the forward policy.
/// `RouteNotFound` and `RejectedLoop` are the non-fatal cases the
/// spec calls out: the request may re-select among remaining peers
/// rather than failing outright.
pub fn classify_reply(message: &NpfMessage, now: Instant) -> ForwardOutcome {
    match message.kind {
        MessageKind::RouteNotFound | MessageKind::RejectedLoop => ForwardOutcome::Reselect,
        MessageKind::RecentlyFailed => {
            let until = until_field(message).map(|ms| now + Duration::from_millis(ms)).unwrap_or(now);
            ForwardOutcome::RecentlyFailed(until)
        }
        MessageKind::DataNotFound => ForwardOutcome::Terminal(TerminalStatus::DataNotFound),
        MessageKind::RejectedOverload => ForwardOutcome::Terminal(TerminalStatus::RejectedOverload),
        MessageKind::CHKDataFound
        | MessageKind::CHKData
        | MessageKind::SSKDataFoundHeaders
        | MessageKind::SSKDataFoundData
        | MessageKind::SSKPubKey
        | MessageKind::InsertReply
        | MessageKind::AllReceived => ForwardOutcome::Terminal(TerminalStatus::Success),
        MessageKind::DataInsertRejected | MessageKind::SendAborted => {
            ForwardOutcome::Terminal(TerminalStatus::TransferFailed)
        }
        _ => ForwardOutcome::Terminal(TerminalStatus::TransferFailed),
    }
}

fn until_field(message: &NpfMessage) -> Option<u64> {
    message.fields.iter().find(|(name, _)| name == "until_ms").and_then(|(_, value)| match value {
        FieldValue::U64(ms) => Some(*ms),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_not_found_is_non_fatal() {
        let msg = NpfMessage::new(MessageKind::RouteNotFound, 1);
        assert_eq!(classify_reply(&msg, Instant::now()), ForwardOutcome::Reselect);
    }

    #[test]
    fn recently_failed_carries_its_wakeup_time() {
        let now = Instant::now();
        let msg = NpfMessage::new(MessageKind::RecentlyFailed, 1).with_field("until_ms", FieldValue::U64(5_000));
        let outcome = classify_reply(&msg, now);
        match outcome {
            ForwardOutcome::RecentlyFailed(until) => assert!(until > now),
            other => panic!("expected RecentlyFailed, got {:?}", other),
        }
    }

    #[test]
    fn chk_data_found_settles_the_request_successfully() {
        let msg = NpfMessage::new(MessageKind::CHKDataFound, 1);
        assert_eq!(classify_reply(&msg, Instant::now()), ForwardOutcome::Terminal(TerminalStatus::Success));
    }
}
