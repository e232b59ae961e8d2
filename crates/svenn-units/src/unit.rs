use svenn_batch::{run_all, BatchProcessor};
use tracing::info;

/// Something a job can run: one no-argument entry point, everything else
/// wired at construction.
pub trait ProcessingUnit: Send {
    fn run(&mut self) -> svenn_core::Result<()>;
}

/// Adapts any [`BatchProcessor`] into a [`ProcessingUnit`] whose `run` is
/// one full [`run_all`] pass.
pub struct BatchUnit<P> {
    processor: P,
}

impl<P> BatchUnit<P> {
    pub fn new(processor: P) -> Self {
        Self { processor }
    }

    pub fn into_inner(self) -> P {
        self.processor
    }
}

impl<P> ProcessingUnit for BatchUnit<P>
where
    P: BatchProcessor + Send,
{
    fn run(&mut self) -> svenn_core::Result<()> {
        let stats = run_all(&mut self.processor)?;
        info!(
            unit = self.processor.name(),
            total = stats.total,
            processed = stats.processed,
            errors = stats.errors,
            "unit finished"
        );
        Ok(())
    }
}
