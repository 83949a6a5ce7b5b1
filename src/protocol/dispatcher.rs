use crate::core::frame::{Command, Frame};
use crate::error::{constants, ProtocolError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type HandlerFn = dyn Fn(&Frame) -> Result<Option<Frame>> + Send + Sync + 'static;

/// Routes established-session payloads (`addresses`, `inventory`, `getdata`)
/// to the collaborators that own them. A handler may answer with a frame.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<Command, Box<HandlerFn>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register `handler` for `command`, replacing any previous one.
    ///
    /// Handshake commands are owned by the state machine and are refused.
    pub fn register<F>(&self, command: Command, handler: F) -> Result<()>
    where
        F: Fn(&Frame) -> Result<Option<Frame>> + Send + Sync + 'static,
    {
        if matches!(command, Command::Version | Command::VersionAck) {
            return Err(ProtocolError::UnexpectedMessage);
        }

        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string()))?;

        handlers.insert(command, Box::new(handler));
        Ok(())
    }

    pub fn has_handler(&self, command: Command) -> bool {
        self.handlers
            .read()
            .map(|h| h.contains_key(&command))
            .unwrap_or(false)
    }

    /// Run the handler registered for the frame's command.
    ///
    /// # Errors
    /// `UnexpectedMessage` when nothing is registered for the command.
    pub fn dispatch(&self, frame: &Frame) -> Result<Option<Frame>> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string()))?;

        handlers
            .get(&frame.command)
            .ok_or(ProtocolError::UnexpectedMessage)
            .and_then(|handler| handler(frame))
    }
}
