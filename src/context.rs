// src/context.rs

//! The long-lived objects one devterm session works with.

use crate::core::config::Config;
use crate::system::debug::DebugController;
use crate::system::executor::ExecutionError;
use crate::system::terminal::Terminal;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// How long `shutdown` waits for a killed process to be reaped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Configuration, terminal and debugger shared by every action of a session.
#[derive(Debug)]
pub struct HostContext {
    pub config: Config,
    pub terminal: Arc<Terminal>,
    pub debugger: DebugController,
}

impl HostContext {
    /// Builds a context around an already loaded configuration.
    pub fn new(config: Config) -> Result<Self, ExecutionError> {
        let terminal = Arc::new(Terminal::from_config(&config.terminal)?);
        let debugger = DebugController::with_terminal(Arc::clone(&terminal), config.log.debugger);
        Ok(Self {
            config,
            terminal,
            debugger,
        })
    }

    /// Builds a context from the global configuration file.
    pub fn load() -> Result<Self> {
        let config = Config::load().context("Failed to load the configuration")?;
        Self::new(config).context("Failed to start the process scheduler")
    }

    /// Ends the debug session and kills the asynchronous processes still running.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        self.debugger.destroy();
        let running = self.terminal.running_processes();
        if running.is_empty() {
            return;
        }
        log::debug!("Killing {} remaining process(es)", running.len());
        self.terminal.kill_async_processes(true);
        for process in running {
            if process.wait_timeout(SHUTDOWN_GRACE).is_none() {
                log::warn!("Process '{}' did not exit after being killed", process.command());
            }
        }
    }
}

impl Drop for HostContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
