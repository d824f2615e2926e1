use std::sync::Arc;

use crate::error::CommandError;
use crate::helpers::{CommandRunner, SystemCommandRunner};

use super::record::{Protocol, Tool};

/// Something that can dump a listening-socket table.
///
/// The coordinator only sees this trait; it never builds command lines.
pub trait ConnectionSource: Send + Sync {
    /// Layout of the text returned by [`capture`](Self::capture).
    fn tool(&self) -> Tool;

    /// Raw table for one protocol.
    fn capture(&self, protocol: Protocol) -> Result<String, CommandError>;
}

/// [`ConnectionSource`] that runs the tool's executable.
pub struct CommandSource {
    tool: Tool,
    runner: Arc<dyn CommandRunner>,
}

impl CommandSource {
    pub fn new(tool: Tool, runner: Arc<dyn CommandRunner>) -> Self {
        Self { tool, runner }
    }

    /// Real executable with the default timeout.
    pub fn system(tool: Tool) -> Self {
        Self::new(tool, Arc::new(SystemCommandRunner::default()))
    }
}

impl ConnectionSource for CommandSource {
    fn tool(&self) -> Tool {
        self.tool
    }

    fn capture(&self, protocol: Protocol) -> Result<String, CommandError> {
        self.runner.run(self.tool.program(), self.tool.args(protocol))
    }
}
