//! JSON-lines sink for published weather states.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use fusion::{FusedWeatherState, StateReceiver};

pub struct StateWriter {
    out: Box<dyn Write + Send>,
    written: u64,
}

impl StateWriter {
    /// Append to `path`, or write to stdout when no path is given.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let out: Box<dyn Write + Send> = match path {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open output {}", path.display()))?;
                Box::new(BufWriter::new(file))
            }
            None => Box::new(io::stdout()),
        };
        Ok(Self::new(out))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Write one state as a single line and flush.
    pub fn write(&mut self, state: &FusedWeatherState) -> Result<()> {
        serde_json::to_writer(&mut self.out, state)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Write every state published on `receiver` until the engine is dropped.
    pub fn spawn(mut self, mut receiver: StateReceiver) -> JoinHandle<Self> {
        tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let state: Option<Arc<FusedWeatherState>> = receiver.borrow_and_update().clone();
                let Some(state) = state else { continue };
                if let Err(e) = self.write(&state) {
                    warn!(error = %e, revision = state.revision, "Failed to write state");
                }
            }
            debug!(written = self.written, "State channel closed");
            self
        })
    }
}
