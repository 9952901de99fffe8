// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded-concurrency traversal of a pre-built DAG in topological order.
//!
//! Grounded on `engine::level_by_level::LevelByLevelExecutor`'s frontier-by-frontier Kahn's
//! algorithm (reverse-dependency in-degree map, queue-driven level computation, all processors
//! in a level run concurrently before the next level starts), generalized from a fixed
//! processor pipeline to a caller-supplied [`VertexProcessor`] and extended with reverse
//! traversal.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::concurrency::ConcurrentDag;
use crate::errors::GraphError;
use crate::observability::messages::processing as msg;
use crate::store::{Dag, ProcessingState};

type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Invoked at most once per vertex, in topological (or reverse-topological) order. Must be
/// safe to call concurrently and must not mutate graph structure.
#[async_trait]
pub trait VertexProcessor<K>: Send + Sync {
    async fn process(&self, cancel: &CancellationToken, key: &K) -> Result<(), CallbackError>;
}

/// Tuning knobs for a processing run. `concurrency <= 0` (the default) resolves to the host's
/// logical CPU count, matching [`crate::discover::DiscovererConfig`].
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub concurrency: usize,
    pub reverse: bool,
}

impl ProcessorConfig {
    pub fn new() -> Self {
        ProcessorConfig { concurrency: default_concurrency(), reverse: false }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = if concurrency == 0 { default_concurrency() } else { concurrency };
        self
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig::new()
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Drives a [`VertexProcessor`] across a pre-built [`crate::Dag`] in topological order.
pub struct TopologicalProcessor<K> {
    processor: Arc<dyn VertexProcessor<K>>,
    config: ProcessorConfig,
}

impl<K> TopologicalProcessor<K>
where
    K: Ord + Hash + Clone + std::fmt::Display + Send + Sync + 'static,
{
    pub fn new(processor: Arc<dyn VertexProcessor<K>>, config: ProcessorConfig) -> Self {
        TopologicalProcessor { processor, config }
    }

    /// Walks `wrapper`'s current graph to completion, level by level, marking
    /// `dag/processing-state` on the original graph as it goes. The original is never
    /// structurally mutated; only its attributes change. Panics in the callback or internal
    /// steps are recovered here and surfaced as [`GraphError::Panic`].
    pub async fn process_topology<V>(
        &self,
        wrapper: Arc<ConcurrentDag<K, V>>,
        cancel: CancellationToken,
    ) -> Result<(), GraphError>
    where
        V: Send + Sync + 'static,
    {
        let mut working: Dag<K, V> = wrapper.snapshot();
        if self.config.reverse {
            working = working.reverse();
        }
        let total = working.len();

        let run_cancel = cancel.child_token();
        let span = tracing::info_span!("process_topology", reverse = self.config.reverse);
        let _entered = span.enter();
        msg::ProcessingStarted { vertex_count: total, reverse: self.config.reverse }.log();

        let ctx = ProcessCtx {
            processor: self.processor.clone(),
            wrapper: wrapper.clone(),
            semaphore: Arc::new(Semaphore::new(self.config.concurrency)),
            cancel: run_cancel.clone(),
        };

        let outcome = tokio::spawn(async move { run(ctx, working, total).await }).await;

        match outcome {
            Ok(result) => {
                if let Err(ref e) = result {
                    msg::ProcessingFailed { error: e }.log();
                } else {
                    msg::ProcessingCompleted.log();
                }
                result
            }
            Err(join_err) => Err(GraphError::Panic {
                phase: "process_topology",
                message: join_err.to_string(),
            }),
        }
    }
}

struct ProcessCtx<K, V> {
    processor: Arc<dyn VertexProcessor<K>>,
    wrapper: Arc<ConcurrentDag<K, V>>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl<K, V> Clone for ProcessCtx<K, V> {
    fn clone(&self) -> Self {
        ProcessCtx {
            processor: self.processor.clone(),
            wrapper: self.wrapper.clone(),
            semaphore: self.semaphore.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

async fn run<K, V>(ctx: ProcessCtx<K, V>, working: Dag<K, V>, total: usize) -> Result<(), GraphError>
where
    K: Ord + Hash + Clone + std::fmt::Display + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let mut frontier = working.roots();

    ctx.wrapper.with_write(|dag| {
        for k in &frontier {
            dag.set_processing_state(k, ProcessingState::Queued);
        }
    });
    for k in &frontier {
        msg::VertexQueued { key: k }.log();
    }

    // In-degree of a vertex as it appears in the working copy, decremented here rather than
    // on the copy itself; populated lazily the first time a vertex is seen as someone's child.
    let mut remaining: HashMap<K, usize> = HashMap::new();
    let mut done: HashSet<K> = HashSet::new();

    while !frontier.is_empty() {
        if ctx.cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }

        let mut join_set = JoinSet::new();
        for k in frontier.drain(..) {
            if !done.insert(k.clone()) {
                continue;
            }
            let ctx = ctx.clone();
            join_set.spawn(async move {
                ctx.wrapper.with_write(|dag| dag.set_processing_state(&k, ProcessingState::Processing));
                msg::VertexProcessing { key: &k }.log();
                let permit = ctx
                    .semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("processing semaphore never closes");
                let result = ctx.processor.process(&ctx.cancel, &k).await;
                drop(permit);
                (k, result)
            });
        }

        let mut completed: Vec<K> = Vec::new();
        let mut first_err: Option<GraphError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((k, Ok(()))) => {
                    ctx.wrapper.with_write(|dag| dag.set_processing_state(&k, ProcessingState::Completed));
                    msg::VertexProcessingCompleted { key: &k }.log();
                    completed.push(k);
                }
                Ok((k, Err(e))) => {
                    ctx.wrapper.with_write(|dag| dag.set_processing_state(&k, ProcessingState::Error));
                    let err = GraphError::processor_failure(k.to_string(), CallbackErrorWrapper(e));
                    msg::VertexProcessingFailed { key: &k, error: &err }.log();
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
                Err(join_err) => {
                    if first_err.is_none() {
                        first_err = Some(GraphError::Panic {
                            phase: "process_topology",
                            message: join_err.to_string(),
                        });
                    }
                }
            }
        }

        if let Some(e) = first_err {
            ctx.cancel.cancel();
            return Err(e);
        }

        let mut next_frontier = Vec::new();
        for k in &completed {
            for child in working.current_edges(k) {
                let count = remaining
                    .entry(child.clone())
                    .or_insert_with(|| working.get(&child).map(|v| v.in_degree()).unwrap_or(0));
                *count -= 1;
                if *count == 0 {
                    ctx.wrapper.with_write(|dag| dag.set_processing_state(&child, ProcessingState::Queued));
                    msg::VertexQueued { key: &child }.log();
                    next_frontier.push(child);
                }
            }
        }
        frontier = next_frontier;
    }

    if done.len() != total {
        return Err(GraphError::UnprocessedRemainder { remaining: total - done.len() });
    }
    Ok(())
}

/// See `discover::CallbackErrorWrapper` for why this newtype exists: `CallbackError` is
/// already `Box<dyn Error + Send + Sync>`, and this lets it flow into
/// `GraphError::processor_failure`'s `impl std::error::Error` parameter.
#[derive(Debug)]
struct CallbackErrorWrapper(CallbackError);

impl std::fmt::Display for CallbackErrorWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CallbackErrorWrapper {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Dag;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    struct RecordingProcessor {
        order: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl RecordingProcessor {
        fn new() -> Self {
            RecordingProcessor { order: Mutex::new(Vec::new()), fail_on: None }
        }

        fn failing_on(key: &str) -> Self {
            RecordingProcessor { order: Mutex::new(Vec::new()), fail_on: Some(key.to_string()) }
        }
    }

    #[async_trait]
    impl VertexProcessor<String> for RecordingProcessor {
        async fn process(&self, _cancel: &CancellationToken, key: &String) -> Result<(), CallbackError> {
            if self.fail_on.as_deref() == Some(key.as_str()) {
                return Err("boom".into());
            }
            self.order.lock().unwrap().push(key.clone());
            Ok(())
        }
    }

    fn diamond() -> Dag<String, ()> {
        let mut dag: Dag<String, ()> = Dag::new();
        for id in ["a", "b", "c", "d"] {
            dag.add_vertex(id.to_string(), vec![StdHashMap::new()]);
        }
        dag.add_edge(&"a".to_string(), &"b".to_string(), Some(0), vec![]).unwrap();
        dag.add_edge(&"a".to_string(), &"c".to_string(), Some(1), vec![]).unwrap();
        dag.add_edge(&"b".to_string(), &"d".to_string(), Some(0), vec![]).unwrap();
        dag.add_edge(&"c".to_string(), &"d".to_string(), Some(0), vec![]).unwrap();
        dag
    }

    #[tokio::test]
    async fn diamond_processes_parents_before_children() {
        let processor = Arc::new(RecordingProcessor::new());
        let topo = TopologicalProcessor::new(processor.clone(), ProcessorConfig::default());
        let wrapper = Arc::new(ConcurrentDag::new(diamond()));
        topo.process_topology(wrapper.clone(), CancellationToken::new()).await.unwrap();

        let order = processor.order.lock().unwrap();
        let pos = |id: &str| order.iter().position(|k| k == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
        assert_eq!(
            wrapper.with_read(|dag| dag.get(&"d".to_string()).unwrap().processing_state()),
            Some(ProcessingState::Completed)
        );
    }

    #[tokio::test]
    async fn reverse_processes_children_before_parents() {
        let processor = Arc::new(RecordingProcessor::new());
        let topo =
            TopologicalProcessor::new(processor.clone(), ProcessorConfig::default().with_reverse(true));
        let wrapper = Arc::new(ConcurrentDag::new(diamond()));
        topo.process_topology(wrapper, CancellationToken::new()).await.unwrap();

        let order = processor.order.lock().unwrap();
        let pos = |id: &str| order.iter().position(|k| k == id).unwrap();
        assert!(pos("d") < pos("b"));
        assert!(pos("d") < pos("c"));
        assert!(pos("b") < pos("a"));
        assert!(pos("c") < pos("a"));
    }

    #[tokio::test]
    async fn failure_mid_run_aborts_and_preserves_partial_state() {
        let processor = Arc::new(RecordingProcessor::failing_on("b"));
        let topo = TopologicalProcessor::new(processor, ProcessorConfig::default());
        let wrapper = Arc::new(ConcurrentDag::new(diamond()));
        let err = topo
            .process_topology(wrapper.clone(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::ProcessorFailure { ref key, .. } if key == "b"));

        assert_eq!(
            wrapper.with_read(|dag| dag.get(&"a".to_string()).unwrap().processing_state()),
            Some(ProcessingState::Completed)
        );
        assert_eq!(
            wrapper.with_read(|dag| dag.get(&"b".to_string()).unwrap().processing_state()),
            Some(ProcessingState::Error)
        );
        assert_eq!(
            wrapper.with_read(|dag| dag.get(&"d".to_string()).unwrap().processing_state()),
            None
        );
    }

    #[tokio::test]
    async fn empty_graph_processes_successfully() {
        let processor = Arc::new(RecordingProcessor::new());
        let topo = TopologicalProcessor::new(processor.clone(), ProcessorConfig::default());
        let wrapper: Arc<ConcurrentDag<String, ()>> = Arc::new(ConcurrentDag::default());
        topo.process_topology(wrapper, CancellationToken::new())
            .await
            .expect("an empty graph has nothing to process and is not an error");
        assert!(processor.order.lock().unwrap().is_empty());
    }
}
