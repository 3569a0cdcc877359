use std::sync::Arc;
use std::thread;

use engine_logging::{engine_info, engine_warn};
use news_core::{
    split_work, CounterSnapshot, FilterChain, JobConfig, JobError, JobResult, ResultLimiter,
    WorkItem,
};
use tokio_util::sync::CancellationToken;

use crate::extract::ArticleExtractor;
use crate::fetch::ArchiveFetcher;
use crate::pipeline::{PartitionRun, Pipeline};
use crate::sink::{CollectingSink, RecordSink};

/// Runs a [`Pipeline`] over a work list, one OS thread per partition.
///
/// Workers block on fetches through a shared tokio runtime owned by the engine.
/// Drop the engine outside of any async context.
pub struct Engine {
    pipeline: Pipeline,
    runtime: tokio::runtime::Runtime,
}

impl Engine {
    pub fn new(pipeline: Pipeline) -> Result<Self, JobError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("fetch-io")
            .enable_all()
            .build()?;
        Ok(Self { pipeline, runtime })
    }

    /// Engine over a pipeline with no extra filters.
    pub fn from_parts(
        fetcher: Arc<dyn ArchiveFetcher>,
        extractor: Arc<dyn ArticleExtractor>,
    ) -> Result<Self, JobError> {
        Self::new(Pipeline::new(fetcher, extractor))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Processes `work` and returns every emitted record with the summed counters.
    ///
    /// Records are filtered by `config.criteria`, then by the pipeline's own filters.
    pub fn run(&self, work: Vec<WorkItem>, config: &JobConfig) -> Result<JobResult, JobError> {
        let slices = self.prepare(work, config)?;
        let sinks: Vec<CollectingSink> = slices.iter().map(|_| CollectingSink::new()).collect();
        let sink_refs: Vec<&dyn RecordSink> =
            sinks.iter().map(|sink| sink as &dyn RecordSink).collect();
        let cancel = CancellationToken::new();

        let counters = self.run_partitions(slices, config, &sink_refs, &cancel)?;
        drop(sink_refs);
        let records = sinks
            .into_iter()
            .flat_map(CollectingSink::into_records)
            .collect();
        Ok(JobResult { records, counters })
    }

    /// Like [`Engine::run`], but hands each record to `sink` as soon as it is
    /// emitted. Cancelling `cancel` makes every worker stop at the next record.
    pub fn run_streaming(
        &self,
        work: Vec<WorkItem>,
        config: &JobConfig,
        sink: &dyn RecordSink,
        cancel: &CancellationToken,
    ) -> Result<CounterSnapshot, JobError> {
        let slices = self.prepare(work, config)?;
        let sink_refs = vec![sink; slices.len()];
        self.run_partitions(slices, config, &sink_refs, cancel)
    }

    fn prepare(
        &self,
        work: Vec<WorkItem>,
        config: &JobConfig,
    ) -> Result<Vec<Vec<WorkItem>>, JobError> {
        config.validate()?;
        if work.is_empty() {
            return Err(JobError::Validation);
        }
        engine_info!(
            "Splitting {} work items into {} partitions",
            work.len(),
            config.partition_count
        );
        Ok(split_work(work, config.partition_count))
    }

    fn run_partitions(
        &self,
        slices: Vec<Vec<WorkItem>>,
        config: &JobConfig,
        sinks: &[&dyn RecordSink],
        cancel: &CancellationToken,
    ) -> Result<CounterSnapshot, JobError> {
        let partition_count = slices.len();
        let handle = self.runtime.handle();
        let pipeline = &self.pipeline;
        let filters = &FilterChain::from_criteria(&config.criteria);
        engine_info!(
            "Filters: {:?} then {:?}",
            filters.names(),
            pipeline.extra_filters().names()
        );

        let snapshots = thread::scope(|scope| {
            let mut workers = Vec::with_capacity(partition_count);
            let assignments = slices.into_iter().zip(sinks.iter().copied()).enumerate();
            for (index, (slice, sink)) in assignments {
                if slice.is_empty() {
                    continue;
                }
                let limiter = ResultLimiter::for_partition(config.global_limit, partition_count);
                let url_only = config.url_only;
                let worker = thread::Builder::new()
                    .name(format!("partition-{index}"))
                    .spawn_scoped(scope, move || {
                        engine_logging::set_partition(index);
                        let mut run = PartitionRun::new(limiter, filters, sink, cancel);
                        if url_only {
                            pipeline.emit_urls(&slice, &mut run);
                        } else {
                            pipeline.process_partition(handle, &slice, &mut run);
                        }
                        engine_info!(
                            "Finished {} items, {} records emitted",
                            slice.len(),
                            run.limiter.emitted()
                        );
                        engine_logging::clear_partition();
                        run.counters.snapshot()
                    });
                match worker {
                    Ok(worker) => workers.push((index, worker)),
                    Err(err) => {
                        // Stop the workers already running before reporting.
                        cancel.cancel();
                        return Err(JobError::Runtime(err));
                    }
                }
            }

            let mut snapshots = Vec::with_capacity(workers.len());
            let mut panicked = None;
            for (index, worker) in workers {
                match worker.join() {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(_) => {
                        engine_warn!("Worker for partition {} panicked", index);
                        panicked.get_or_insert(index);
                    }
                }
            }
            match panicked {
                Some(index) => Err(JobError::WorkerPanicked(index)),
                None => Ok(snapshots),
            }
        })?;

        let counters: CounterSnapshot = snapshots.into_iter().sum();
        counters.log_summary();
        Ok(counters)
    }
}
