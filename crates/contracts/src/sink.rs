//! DataSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for asynchronous sinks.

use crate::{ContractError, OutputEvent};

/// Data output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one output event
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, event: &OutputEvent) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
