use crate::chrom_chunk::ChunkResult;
use crate::chunk_genome::chunk_genome;
use crate::consume::consume_chunks;
use crate::glide_err::{GliderError, Result};
use crate::kmer_profile::ReferenceProfiles;
use crate::metrics::{MetricPlan, MetricRegistry};
use crate::read_fasta::{stream_records, FastaSource};
use crate::run_config::RunConfig;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Shared stop flag observed by every stage between items.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> AbortSignal {
        AbortSignal::default()
    }
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
    pub fn check(&self) -> Result<()> {
        if self.is_raised() {
            Err(GliderError::Cancelled)
        } else {
            Ok(())
        }
    }
    /// Blocks for the next item. A closed queue is a clean end of input
    /// unless the signal was raised, in which case upstream failed.
    pub fn recv<T>(&self, recv: &Receiver<T>) -> Result<Option<T>> {
        self.check()?;
        match recv.recv() {
            Ok(item) => Ok(Some(item)),
            Err(_) => self.check().map(|_| None),
        }
    }
}

// Raises the signal when a stage thread unwinds, so the closed queue it
// leaves behind reads as a failure downstream.
struct RaiseOnPanic<'a> {
    name: &'static str,
    abort: &'a AbortSignal,
}

impl Drop for RaiseOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("{} stage panicked", self.name);
            self.abort.raise();
        }
    }
}

pub struct StageJoin {
    name: &'static str,
    handle: thread::JoinHandle<Result<()>>,
}

impl StageJoin {
    pub fn name(&self) -> &'static str {
        self.name
    }
    pub fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| GliderError::StageFailed(self.name.to_string()))?
    }
}

/// A running stage: a worker thread feeding a bounded queue. Reading the
/// queue yields items in production order, once.
pub struct Stage<T> {
    receiver: Receiver<T>,
    worker: StageJoin,
}

impl<T: Send + 'static> Stage<T> {
    pub fn spawn<F>(
        name: &'static str,
        capacity: usize,
        abort: &AbortSignal,
        body: F,
    ) -> Result<Stage<T>>
    where
        F: FnOnce(&Sender<T>, &AbortSignal) -> Result<()> + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        let abort = abort.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // locals drop in reverse order: the guard runs before the sender closes
                let sender = sender;
                let _guard = RaiseOnPanic {
                    name,
                    abort: &abort,
                };
                let res = body(&sender, &abort);
                if let Err(err) = &res {
                    if !err.is_cancelled() {
                        error!("{} stage failed: {}", name, err);
                        // raised before the queue closes so downstream never
                        // mistakes the failure for end of input
                        abort.raise();
                    }
                }
                drop(sender);
                res
            })?;
        Ok(Stage {
            receiver,
            worker: StageJoin { name, handle },
        })
    }
}

impl<T> Stage<T> {
    pub fn receiver(&self) -> &Receiver<T> {
        &self.receiver
    }
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, T> {
        self.receiver.iter()
    }
    pub fn into_parts(self) -> (Receiver<T>, StageJoin) {
        (self.receiver, self.worker)
    }
    /// Stops reading and waits for the worker.
    pub fn join(self) -> Result<()> {
        drop(self.receiver);
        self.worker.join()
    }
}

impl<'a, T> IntoIterator for &'a Stage<T> {
    type Item = T;
    type IntoIter = crossbeam_channel::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.receiver.iter()
    }
}

/// Reader, chunker and window consumer wired by bounded queues.
pub struct Pipeline {
    header: Vec<String>,
    results: Receiver<ChunkResult>,
    stages: Vec<StageJoin>,
    abort: AbortSignal,
}

impl Pipeline {
    /// Validates the configuration and metric names, then starts all three
    /// stages. Nothing is read before validation succeeds.
    pub fn spawn(
        source: FastaSource,
        config: &RunConfig,
        registry: &MetricRegistry,
        references: &ReferenceProfiles,
    ) -> Result<Pipeline> {
        config.validate()?;
        let layout = config.layout()?;
        let plan = MetricPlan::new(&config.metrics, registry, references, config.distance)?;
        info!(
            "window size {}, stride {}, {} windows per chunk, metrics: {}",
            layout.window_size,
            layout.window_stride,
            layout.chunk_size,
            plan.describe()
        );
        let header = plan.header();
        let abort = AbortSignal::new();
        let capacity = config.queue_capacity;

        let (records, reader) = stream_records(source, capacity, &abort)?.into_parts();
        let (chunks, chunker) = chunk_genome(records, layout, capacity, &abort)?.into_parts();
        let (results, consumer) =
            consume_chunks(chunks, Arc::new(plan), capacity, &abort)?.into_parts();
        Ok(Pipeline {
            header,
            results,
            stages: vec![reader, chunker, consumer],
            abort,
        })
    }

    /// Column names shared by every result table.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn results(&self) -> crossbeam_channel::Iter<'_, ChunkResult> {
        self.results.iter()
    }

    pub fn abort(&self) {
        self.abort.raise();
    }

    /// Closes the result queue, joins every stage and reports the error that
    /// brought the pipeline down, if any.
    pub fn finish(self) -> Result<()> {
        drop(self.results);
        let mut root_cause: Option<GliderError> = None;
        let mut cancelled = false;
        for stage in self.stages {
            let name = stage.name();
            match stage.join() {
                Ok(()) => debug!("{} stage finished", name),
                Err(err) if err.is_cancelled() => {
                    debug!("{} stage cancelled", name);
                    cancelled = true;
                }
                Err(err) => {
                    if root_cause.is_none() {
                        root_cause = Some(err);
                    }
                }
            }
        }
        match root_cause {
            Some(err) => Err(err),
            None if cancelled => Err(GliderError::Cancelled),
            None => Ok(()),
        }
    }

    /// Drains every result table, then joins the stages.
    pub fn collect(self) -> Result<Vec<ChunkResult>> {
        let tables: Vec<ChunkResult> = self.results.iter().collect();
        self.finish()?;
        Ok(tables)
    }
}
