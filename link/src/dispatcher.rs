use std::collections::HashMap;
use std::fmt;

use crate::message::{MessageKind, NpfMessage};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type Handler = Box<dyn Fn(&NpfMessage) -> Result<(), HandlerError> + Send + Sync>;

#[derive(Debug)]
pub struct NoHandlerRegistered(pub MessageKind);

impl fmt::Display for NoHandlerRegistered {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "no handler registered for message kind {:?}", self.0)
    }
}

impl std::error::Error for NoHandlerRegistered {}

/// Dispatches inbound NPF messages to registered per-kind handlers
/// (§4.4.4). Every registered handler for a kind runs in registration
/// order; a handler's error is collected, not fatal to later handlers.
/// A kind with no handler is reported but does not fail dispatch.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<MessageKind, Vec<Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    pub fn register(&mut self, kind: MessageKind, handler: Handler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    pub fn dispatch(&self, message: &NpfMessage) -> Vec<HandlerError> {
        match self.handlers.get(&message.kind) {
            Some(handlers) => handlers.iter().filter_map(|h| h(message).err()).collect(),
            None => vec![Box::new(NoHandlerRegistered(message.kind))],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn handlers_run_in_registration_order() {
        let mut dispatcher = Dispatcher::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let order_a = order.clone();
        dispatcher.register(
            MessageKind::Ping,
            Box::new(move |_| {
                order_a.lock().unwrap().push(1);
                Ok(())
            }),
        );
        let order_b = order.clone();
        dispatcher.register(
            MessageKind::Ping,
            Box::new(move |_| {
                order_b.lock().unwrap().push(2);
                Ok(())
            }),
        );

        let msg = NpfMessage::new(MessageKind::Ping, 1);
        assert!(dispatcher.dispatch(&msg).is_empty());
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn later_handlers_run_even_if_an_earlier_one_errors() {
        let mut dispatcher = Dispatcher::new();
        let ran = Arc::new(AtomicUsize::new(0));

        dispatcher.register(MessageKind::Void, Box::new(|_| Err("boom".into())));
        let ran_clone = ran.clone();
        dispatcher.register(
            MessageKind::Void,
            Box::new(move |_| {
                ran_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let msg = NpfMessage::new(MessageKind::Void, 0);
        let errors = dispatcher.dispatch(&msg);
        assert_eq!(errors.len(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unhandled_kind_is_reported_but_not_fatal() {
        let dispatcher = Dispatcher::new();
        let msg = NpfMessage::new(MessageKind::Pong, 0);
        let errors = dispatcher.dispatch(&msg);
        assert_eq!(errors.len(), 1);
    }
}
