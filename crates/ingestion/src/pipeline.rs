//! Ingestion Pipeline main entry

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::{MeasurementHandler, SensorDataCallback, SensorSource};
use tracing::{debug, info, instrument, trace};

use crate::error::{IngestionError, Result};
use crate::metrics::IngestionMetrics;

/// Ingestion Pipeline
///
/// Owns the registered sources and forwards everything they emit to one
/// [`MeasurementHandler`], counting messages per channel on the way.
pub struct IngestionPipeline {
    /// Registered sources, in registration order
    sources: Vec<Box<dyn SensorSource>>,

    /// Source id -> index into `sources`
    index: HashMap<String, usize>,

    handler: Arc<dyn MeasurementHandler>,

    /// Shared metrics
    metrics: Arc<IngestionMetrics>,

    /// Gate checked by every callback; messages after `stop_all` are dropped
    accepting: Arc<AtomicBool>,
}

impl IngestionPipeline {
    /// Create new Ingestion Pipeline
    pub fn new(handler: Arc<dyn MeasurementHandler>) -> Self {
        Self {
            sources: Vec::new(),
            index: HashMap::new(),
            handler,
            metrics: Arc::new(IngestionMetrics::new()),
            accepting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a data source.
    ///
    /// # Errors
    /// [`IngestionError::DuplicateSource`] if the id is already taken.
    #[instrument(
        name = "ingestion_register_source",
        skip(self, source),
        fields(source_id = %source.source_id(), channel = %source.channel())
    )]
    pub fn register_source(&mut self, source: Box<dyn SensorSource>) -> Result<()> {
        let source_id = source.source_id().to_string();
        if self.index.contains_key(&source_id) {
            return Err(IngestionError::DuplicateSource { source_id });
        }
        debug!(source_id = %source_id, "registered sensor source");
        self.index.insert(source_id, self.sources.len());
        self.sources.push(source);
        Ok(())
    }

    /// Start all registered sources
    #[instrument(name = "ingestion_start_all", skip(self))]
    pub fn start_all(&self) {
        info!(count = self.sources.len(), "starting all sensor sources");
        self.accepting.store(true, Ordering::SeqCst);
        for source in &self.sources {
            self.start_source(source.as_ref());
        }
    }

    /// Stop all sources and join their threads
    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub fn stop_all(&self) {
        info!(count = self.sources.len(), "stopping all sensor sources");
        self.accepting.store(false, Ordering::SeqCst);
        for source in &self.sources {
            if source.is_listening() {
                debug!(source_id = %source.source_id(), "stopping source");
                source.stop();
            }
        }
    }

    /// Stop a single source.
    ///
    /// # Errors
    /// Unknown id or a source that is not running.
    pub fn stop_source(&self, source_id: &str) -> Result<()> {
        let source = self.source(source_id)?;
        if !source.is_listening() {
            return Err(IngestionError::SourceNotListening {
                source_id: source_id.to_string(),
            });
        }
        source.stop();
        Ok(())
    }

    fn start_source(&self, source: &dyn SensorSource) {
        if source.is_listening() {
            return;
        }
        debug!(source_id = %source.source_id(), "starting source");

        let handler = Arc::clone(&self.handler);
        let metrics = Arc::clone(&self.metrics);
        let accepting = Arc::clone(&self.accepting);
        let source_id = source.source_id().to_string();

        let callback: SensorDataCallback = Arc::new(move |message| {
            if !accepting.load(Ordering::Relaxed) {
                metrics.record_dropped();
                return;
            }
            let channel = message.channel();
            metrics.record_received(channel);
            trace!(source_id = %source_id, %channel, "forwarding message");
            handler.handle(message);
        });
        source.listen(callback);
    }

    fn source(&self, source_id: &str) -> Result<&dyn SensorSource> {
        self.index
            .get(source_id)
            .map(|&i| self.sources[i].as_ref())
            .ok_or_else(|| IngestionError::UnknownSource {
                source_id: source_id.to_string(),
            })
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Get registered source count
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Check if specified source is listening
    pub fn is_source_listening(&self, source_id: &str) -> bool {
        self.source(source_id)
            .map(|s| s.is_listening())
            .unwrap_or(false)
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ImuSample, SensorChannel, SensorMessage};
    use nalgebra::Vector3;
    use parking_lot::Mutex;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Collector {
        messages: Mutex<Vec<SensorMessage>>,
    }

    impl MeasurementHandler for Collector {
        fn handle(&self, message: SensorMessage) {
            self.messages.lock().push(message);
        }
    }

    /// Emits a burst of IMU samples on its own thread, then idles
    struct BurstSource {
        id: String,
        count: usize,
        listening: Arc<AtomicBool>,
        worker: Mutex<Option<thread::JoinHandle<()>>>,
    }

    impl BurstSource {
        fn new(id: &str, count: usize) -> Self {
            Self {
                id: id.to_string(),
                count,
                listening: Arc::new(AtomicBool::new(false)),
                worker: Mutex::new(None),
            }
        }
    }

    impl SensorSource for BurstSource {
        fn source_id(&self) -> &str {
            &self.id
        }

        fn channel(&self) -> SensorChannel {
            SensorChannel::Imu
        }

        fn listen(&self, callback: SensorDataCallback) {
            if self.listening.swap(true, Ordering::SeqCst) {
                return;
            }
            let count = self.count;
            *self.worker.lock() = Some(thread::spawn(move || {
                for i in 0..count {
                    callback(SensorMessage::Imu(ImuSample::new(
                        i as f64 * 0.005,
                        Vector3::new(0.0, 0.0, 9.81),
                        Vector3::zeros(),
                    )));
                }
            }));
        }

        fn stop(&self) {
            self.listening.store(false, Ordering::SeqCst);
            if let Some(handle) = self.worker.lock().take() {
                let _ = handle.join();
            }
        }

        fn is_listening(&self) -> bool {
            self.listening.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn test_pipeline_creation() {
        let pipeline = IngestionPipeline::new(Arc::new(Collector::default()));
        assert_eq!(pipeline.source_count(), 0);
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let mut pipeline = IngestionPipeline::new(Arc::new(Collector::default()));
        pipeline
            .register_source(Box::new(BurstSource::new("imu", 1)))
            .unwrap();
        let err = pipeline
            .register_source(Box::new(BurstSource::new("imu", 1)))
            .unwrap_err();
        assert!(matches!(err, IngestionError::DuplicateSource { .. }));
        assert_eq!(pipeline.source_count(), 1);
    }

    #[test]
    fn test_forwards_and_counts() {
        let collector = Arc::new(Collector::default());
        let mut pipeline = IngestionPipeline::new(collector.clone());
        pipeline
            .register_source(Box::new(BurstSource::new("imu", 10)))
            .unwrap();

        pipeline.start_all();
        assert!(pipeline.is_source_listening("imu"));
        thread::sleep(Duration::from_millis(50));
        pipeline.stop_all();

        assert!(!pipeline.is_source_listening("imu"));
        assert_eq!(collector.messages.lock().len(), 10);
        assert_eq!(pipeline.metrics().received(SensorChannel::Imu), 10);
    }

    #[test]
    fn test_stop_unknown_source() {
        let pipeline = IngestionPipeline::new(Arc::new(Collector::default()));
        assert!(matches!(
            pipeline.stop_source("nope"),
            Err(IngestionError::UnknownSource { .. })
        ));
    }
}
