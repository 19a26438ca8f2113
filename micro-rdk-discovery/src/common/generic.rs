use std::sync::{Arc, Mutex};

use crate::google::protobuf::Struct;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenericError {
    #[error("Generic: method {0} unimplemented")]
    MethodUnimplemented(&'static str),
    #[error("Generic: invalid command `{0}`")]
    InvalidCommand(String),
    #[error("Generic other error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

pub trait DoCommand {
    /// do_command custom commands outside of a strict API. Takes a command struct that can be interpreted
    /// as a map of method name keys to argument values.
    fn do_command(
        &mut self,
        _command_struct: Option<Struct>,
    ) -> Result<Option<Struct>, GenericError> {
        Err(GenericError::MethodUnimplemented("do_command"))
    }
}

impl<L> DoCommand for Mutex<L>
where
    L: ?Sized + DoCommand,
{
    fn do_command(
        &mut self,
        command_struct: Option<Struct>,
    ) -> Result<Option<Struct>, GenericError> {
        self.get_mut()
            .map_err(|_| GenericError::Other("poisoned lock".into()))?
            .do_command(command_struct)
    }
}

impl<A> DoCommand for Arc<Mutex<A>>
where
    A: ?Sized + DoCommand,
{
    fn do_command(
        &mut self,
        command_struct: Option<Struct>,
    ) -> Result<Option<Struct>, GenericError> {
        self.lock()
            .map_err(|_| GenericError::Other("poisoned lock".into()))?
            .do_command(command_struct)
    }
}
