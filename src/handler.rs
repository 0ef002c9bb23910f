//! Handler table for inbound notifications.
//!
//! One optional slot per command code, populated by the embedder before
//! the handle is initialized. Inbound frames whose command has no slot are
//! dropped silently, which is what keeps old clients compatible with newer
//! managers.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::client::Client;
use crate::protocol::Command;

/// Callback invoked with the command, the owning client and the frame body.
///
/// Handlers run without the client's state lock held, so they are free to
/// call decoders, issue outbound requests, or stop/reset the client.
pub type MessageHandler = Arc<dyn Fn(Command, &Client, Bytes) + Send + Sync>;

/// Command-keyed table of optional handlers.
#[derive(Clone, Default)]
pub struct HandlerTable {
    slots: HashMap<u16, MessageHandler>,
}

impl HandlerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill the slot for `command`, replacing any previous handler.
    pub fn set(&mut self, command: Command, handler: MessageHandler) {
        self.slots.insert(command.code(), handler);
    }

    /// Look up the handler for a raw command code.
    pub fn get(&self, code: u16) -> Option<&MessageHandler> {
        self.slots.get(&code)
    }

    /// Number of filled slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codes: Vec<u16> = self.slots.keys().copied().collect();
        codes.sort_unstable();
        f.debug_struct("HandlerTable").field("codes", &codes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_has_no_slots() {
        let table = HandlerTable::new();
        assert!(table.is_empty());
        assert!(table.get(Command::RouterIdUpdate.code()).is_none());
    }

    #[test]
    fn test_set_and_get_by_code() {
        let mut table = HandlerTable::new();
        table.set(Command::InterfaceAdd, Arc::new(|_, _, _| {}));

        assert_eq!(table.len(), 1);
        assert!(table.get(Command::InterfaceAdd.code()).is_some());
        assert!(table.get(Command::InterfaceDelete.code()).is_none());
    }

    #[test]
    fn test_set_replaces_previous_slot() {
        let mut table = HandlerTable::new();
        table.set(Command::InterfaceAdd, Arc::new(|_, _, _| {}));
        table.set(Command::InterfaceAdd, Arc::new(|_, _, _| {}));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unknown_code_is_unhandled() {
        let table = HandlerTable::new();
        assert!(table.get(0x7FFF).is_none());
    }
}
