//! FileSink - appends events as JSON lines, one file per topic

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use contracts::{ContractError, DataSink, OutputEvent};
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,

    /// Write into a fresh `run_<timestamp>` directory under `base_path`
    pub timestamped: bool,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));
        let timestamped = params
            .get("timestamped")
            .map(|v| v != "false")
            .unwrap_or(true);

        Self {
            base_path,
            timestamped,
        }
    }
}

/// Sink that writes events to `<topic>.jsonl` files
pub struct FileSink {
    name: String,
    dir: PathBuf,
    writers: HashMap<&'static str, BufWriter<File>>,
}

impl FileSink {
    /// Create a new FileSink
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        let dir = if config.timestamped {
            let stamp = chrono::Local::now().format("run_%Y%m%d_%H%M%S");
            config.base_path.join(stamp.to_string())
        } else {
            config.base_path
        };
        fs::create_dir_all(&dir)?;

        Ok(Self {
            name: name.into(),
            dir,
            writers: HashMap::new(),
        })
    }

    /// Create from a sink `params` map
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    /// Directory the topic files are written to
    pub fn output_dir(&self) -> &Path {
        &self.dir
    }

    fn write_event_to_disk(&mut self, event: &OutputEvent) -> std::io::Result<()> {
        let topic = event.topic();
        let writer = match self.writers.entry(topic) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let path = self.dir.join(format!("{topic}.jsonl"));
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                entry.insert(BufWriter::new(file))
            }
        };

        serde_json::to_writer(&mut *writer, event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")
    }

    fn persist_event(&mut self, event: &OutputEvent) -> Result<(), ContractError> {
        self.write_event_to_disk(event).map_err(|e| {
            error!(sink = %self.name, topic = event.topic(), error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }

    fn flush_all(&mut self) -> Result<(), ContractError> {
        for writer in self.writers.values_mut() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        level = "trace",
        name = "file_sink_write",
        skip(self, event),
        fields(sink = %self.name, topic = event.topic())
    )]
    async fn write(&mut self, event: &OutputEvent) -> Result<(), ContractError> {
        self.persist_event(event)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.flush_all()
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush_all()?;
        self.writers.clear();
        debug!(sink = %self.name, dir = %self.dir.display(), "FileSink closed");
        Ok(())
    }
}
