//! Builds and runs a single `vdi` command line against the control tool

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use vdi_core::{check_host, check_volume_name, Error, Result};

use crate::CommandExecutor;

/// Runs `vdi` subcommands for one volume
///
/// Every command line has the shape
/// `<tool> vdi <subcommand> -a <address> -p <port> <volume> [<params>...]`.
/// No retries happen here; failures surface as [`Error::Backend`].
///
/// The volume name and address are checked on construction, so neither can
/// add words to the command line.
#[derive(Clone)]
pub struct VolumeCommandRunner {
    executor: Arc<dyn CommandExecutor>,
    tool: String,
    addr: String,
    port: u16,
    name: String,
}

impl fmt::Debug for VolumeCommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeCommandRunner")
            .field("tool", &self.tool)
            .field("addr", &self.addr)
            .field("port", &self.port)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl VolumeCommandRunner {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        tool: impl Into<String>,
        addr: impl Into<String>,
        port: u16,
        name: impl Into<String>,
    ) -> Result<Self> {
        let (addr, name) = (addr.into(), name.into());
        check_volume_name(&name)?;
        check_host(&addr)?;
        Ok(Self {
            executor,
            tool: tool.into(),
            addr,
            port,
            name,
        })
    }

    /// Volume this runner targets
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the command line for `subcommand` with trailing `params`
    pub fn command_line(&self, subcommand: &str, params: &[String]) -> String {
        let mut line = format!(
            "{} vdi {} -a {} -p {} {}",
            self.tool, subcommand, self.addr, self.port, self.name
        );
        for param in params {
            line.push(' ');
            line.push_str(param);
        }
        line
    }

    /// Run `subcommand`, feeding `input` on stdin, and return stdout
    pub fn run(&self, subcommand: &str, input: Option<&[u8]>, params: &[String]) -> Result<Vec<u8>> {
        let line = self.command_line(subcommand, params);
        debug!(command = %line, input_len = input.map(<[u8]>::len), "Running vdi command");

        self.executor.execute(&line, input).map_err(|e| {
            debug!(command = %line, error = %e, "vdi command failed");
            Error::backend(e.message())
        })
    }
}
