//! Layout request scheduling
//!
//! Requests run one at a time. When a newer request was issued while one
//! was running, the older result is discarded so the displayed layout
//! always reflects the latest document.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{LayoutEngine, PositionedNode};
use crate::config::LayoutSettings;
use crate::error::Result;
use crate::events::{CanvasEvent, DiagnosticSink};
use crate::graph::FlowGraph;

/// Serializes layout requests, latest wins
pub struct LayoutScheduler {
    engine: Arc<dyn LayoutEngine>,
    sink: Arc<dyn DiagnosticSink>,
    latest: AtomicU64,
    running: Mutex<()>,
}

impl LayoutScheduler {
    pub fn new(engine: Arc<dyn LayoutEngine>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            engine,
            sink,
            latest: AtomicU64::new(0),
            running: Mutex::new(()),
        }
    }

    /// Lay out `graph`
    ///
    /// Returns `Ok(None)` when a newer request superseded this one.
    pub async fn request(
        &self,
        graph: &FlowGraph,
        settings: &LayoutSettings,
        measured: &HashMap<String, (f64, f64)>,
    ) -> Result<Option<Vec<PositionedNode>>> {
        let request = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.running.lock().await;

        if self.latest.load(Ordering::SeqCst) != request {
            return Ok(self.superseded(request));
        }

        let result = super::layout(self.engine.as_ref(), graph, settings, measured).await;

        if self.latest.load(Ordering::SeqCst) != request {
            return Ok(self.superseded(request));
        }
        result.map(Some)
    }

    fn superseded(&self, request: u64) -> Option<Vec<PositionedNode>> {
        log::debug!("Discarding superseded layout request {}", request);
        self.sink.report(CanvasEvent::LayoutSuperseded { request });
        None
    }

    /// Number of requests issued so far
    pub fn issued(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CanvasError;
    use crate::events::VecDiagnosticSink;
    use crate::layout::{LayeredLayout, LayoutGraph};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Engine that waits before delegating
    struct SlowEngine(Duration);

    #[async_trait]
    impl LayoutEngine for SlowEngine {
        async fn layout(&self, graph: LayoutGraph) -> Result<LayoutGraph> {
            tokio::time::sleep(self.0).await;
            LayeredLayout::new().layout(graph).await
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl LayoutEngine for FailingEngine {
        async fn layout(&self, _graph: LayoutGraph) -> Result<LayoutGraph> {
            Err(CanvasError::layout("rejected"))
        }
    }

    fn graph() -> FlowGraph {
        use crate::builder::RouteBuilder;
        use crate::events::NullDiagnosticSink;
        use crate::graph::GraphBuilder;
        use crate::node::VisualFlow;

        let flow = VisualFlow::new(
            RouteBuilder::new("route-1")
                .from("timer:a")
                .step("log", serde_json::json!({}))
                .build(),
        );
        GraphBuilder::new(&NullDiagnosticSink).build_flow(&flow)
    }

    #[tokio::test]
    async fn test_single_request() {
        let sink = Arc::new(VecDiagnosticSink::new());
        let scheduler = LayoutScheduler::new(Arc::new(LayeredLayout::new()), sink.clone());
        let result = scheduler
            .request(&graph(), &LayoutSettings::default(), &HashMap::new())
            .await
            .unwrap();
        assert_eq!(result.unwrap().len(), 3);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_latest_wins() {
        let sink = Arc::new(VecDiagnosticSink::new());
        let scheduler = LayoutScheduler::new(Arc::new(SlowEngine(Duration::from_millis(50))), sink.clone());
        let graph = graph();
        let settings = LayoutSettings::default();
        let measured = HashMap::new();

        let (first, second) = tokio::join!(
            scheduler.request(&graph, &settings, &measured),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                scheduler.request(&graph, &settings, &measured).await
            }
        );

        assert!(first.unwrap().is_none());
        assert!(second.unwrap().is_some());
        assert_eq!(scheduler.issued(), 2);
        assert_eq!(sink.events(), vec![CanvasEvent::LayoutSuperseded { request: 1 }]);
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let scheduler = LayoutScheduler::new(Arc::new(FailingEngine), Arc::new(VecDiagnosticSink::new()));
        let result = scheduler
            .request(&graph(), &LayoutSettings::default(), &HashMap::new())
            .await;
        assert!(matches!(result, Err(CanvasError::Layout(_))));
    }
}
