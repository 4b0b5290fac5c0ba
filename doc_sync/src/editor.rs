//! The editor subprocess seam.
//!
//! The core only needs one capability from an editor: "open this document in
//! a child process". The contract on the spawned process is signal-driven:
//! SIGUSR2 means persist the buffer, SIGTERM means exit, and SIGUSR1 (the
//! owner-priority channel) is ignored so a preemption aimed at the holding
//! process never tears the editor down out of band.

use crate::config::Config;
use crate::err::{CoordError, CoordErrorKind, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::{Child, Command};

#[async_trait]
pub trait EditorLauncher: Send + Sync {
    async fn launch(&self, document: &Path) -> Result<Child>;
}

/// Launches the configured editor command with the document path appended.
pub struct CommandEditor {
    program: String,
    args: Vec<String>,
}

impl CommandEditor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.editor.command.clone(), config.editor.args.clone())
    }
}

#[async_trait]
impl EditorLauncher for CommandEditor {
    async fn launch(&self, document: &Path) -> Result<Child> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(document);
        unsafe {
            cmd.pre_exec(|| {
                // Isolate the editor from the priority channel.
                unsafe {
                    libc::signal(libc::SIGUSR1, libc::SIG_IGN);
                }
                Ok(())
            });
        }
        cmd.spawn().map_err(|e| {
            CoordError::with_source(
                CoordErrorKind::ResourceFailed,
                format!("failed to launch editor '{}'", self.program),
                e,
            )
            .into()
        })
    }
}
