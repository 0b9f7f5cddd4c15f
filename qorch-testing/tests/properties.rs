//! Universal invariants 1, 2, 3, 6, and 7 from the specification's testable-
//! properties section. Invariants 4 (conversation bound) and 8 (research
//! monotonicity) are proptest-covered in `qorch-core/tests/property_tests.rs`
//! and in `qorch-research`'s own test module; invariant 5 (citation-analysis
//! correctness) is proptest-covered directly in `qorch-research::citation`.
//! Those are not duplicated here.
//!
//! Run with `cargo test -p qorch-testing --features property-tests`.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use proptest::prelude::*;
use qorch_config::OrchestratorSettings;
use qorch_context::ContextStore;
use qorch_core::model::{Chunk, ChunkMetadata, Request, SearchInfo, SearchSource};
use qorch_core::Skill;
use qorch_events::EventBus;
use qorch_gateway::circuit_breaker::{BreakerConfig, CircuitBreaker};
use qorch_gateway::Gateway;
use qorch_memory::MemoryActor;
use qorch_orchestrator::executor::ExecutorPool;
use qorch_orchestrator::file_extraction::PlaceholderFileExtractor;
use qorch_orchestrator::orchestrator::Orchestrator;
use qorch_orchestrator::planner::Planner;
use qorch_retriever::rrf;
use qorch_testing::{FakeLlmProvider, FakeService};
use serde_json::json;

fn chunk(id: &str, text: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        text: text.to_string(),
        metadata: ChunkMetadata {
            file_name: "doc.txt".to_string(),
            page_label: None,
            chunk_index: 0,
            content_type: "text/plain".to_string(),
        },
        score: 0.0,
        search_info: SearchInfo {
            vector_rank: None,
            bm25_rank: None,
            rrf_score: 0.0,
            rerank_score: None,
            source: SearchSource::Vector,
        },
    }
}

fn build_orchestrator(gateway: Arc<Gateway>) -> Arc<Orchestrator> {
    let pool = Arc::new(ExecutorPool::new(gateway, 2, Duration::from_secs(5), 1));
    Arc::new(Orchestrator::new(
        Arc::new(ContextStore::new(50, Duration::from_secs(3600))),
        Arc::new(MemoryActor::new(50, 200)),
        Arc::new(EventBus::new(100)),
        Arc::new(Planner::new(None)),
        pool,
        Arc::new(FakeLlmProvider::responding("an answer")),
        None,
        Arc::new(PlaceholderFileExtractor),
        OrchestratorSettings::default(),
    ))
}

proptest! {
    /// Universal invariant 1: for every request, the event stream ends with
    /// exactly one terminal event and no events follow it. Queries are
    /// generated across both the execution and search branches of the
    /// rule-based fallback planner so both plan shapes are exercised.
    #[test]
    fn event_stream_has_exactly_one_trailing_terminal_event(
        query in "(run bash |search for |find |)[a-zA-Z0-9 ]{0,40}",
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let knowledge = Arc::new(
                FakeService::new(
                    "knowledge",
                    vec!["rag_search_multiple".to_string(), "rag_ask".to_string()],
                )
                .always_ok("rag_search_multiple", json!({"query": "q", "results": [], "sources": []}))
                .always_ok("rag_ask", json!({"query": "q", "results": [], "sources": []})),
            );
            let sandbox = Arc::new(
                FakeService::new("sandbox", vec!["execute_bash".to_string()])
                    .always_ok("execute_bash", json!({"stdout": "", "exit_code": 0})),
            );
            let gateway = Gateway::new(BreakerConfig::default(), Duration::from_secs(3600));
            gateway.register(knowledge as Arc<dyn qorch_gateway::Service>).await.unwrap();
            gateway.register(sandbox as Arc<dyn qorch_gateway::Service>).await.unwrap();

            let orchestrator = build_orchestrator(gateway);
            let mut stream = orchestrator.process_intent(Request::new(query, "prop-session"));

            let mut terminal_count = 0usize;
            let mut saw_event_after_terminal = false;
            while let Some(event) = stream.next().await {
                if terminal_count > 0 {
                    saw_event_after_terminal = true;
                }
                if event.is_terminal() {
                    terminal_count += 1;
                }
            }

            prop_assert_eq!(terminal_count, 1, "expected exactly one terminal event");
            prop_assert!(!saw_event_after_terminal, "no event may follow the terminal event");
            Ok(())
        })?;
    }

    /// Universal invariant 3: after `failure_threshold` consecutive
    /// failures, every call within `recovery_timeout` fails with
    /// `CircuitOpen` and never reaches the service, regardless of the
    /// configured threshold.
    #[test]
    fn circuit_breaker_blocks_every_call_until_recovery_elapses(
        failure_threshold in 1u32..10,
        extra_calls in 0u32..10,
    ) {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold,
            recovery_timeout: Duration::from_secs(3600),
        });

        for _ in 0..failure_threshold {
            prop_assert!(breaker.can_execute());
            breaker.record_failure();
        }

        for _ in 0..extra_calls {
            prop_assert!(!breaker.can_execute(), "breaker must stay open well inside the recovery window");
        }
    }

    /// Universal invariant 6: running fusion twice over the same two ranked
    /// lists reproduces the same ordering (tested here over arbitrary
    /// id/text pairs rather than the two-chunk fixture in `rrf.rs`'s own
    /// unit tests).
    #[test]
    fn rrf_fusion_is_idempotent_over_arbitrary_lists(
        vector_ids in prop::collection::vec(0usize..12, 0..10),
        bm25_ids in prop::collection::vec(0usize..12, 0..10),
    ) {
        let vector: Vec<Chunk> = vector_ids.iter().map(|i| chunk(&i.to_string(), &format!("passage number {i}"))).collect();
        let bm25: Vec<Chunk> = bm25_ids.iter().map(|i| chunk(&i.to_string(), &format!("passage number {i}"))).collect();

        let first = rrf::fuse(vector, bm25, rrf::DEFAULT_K);
        let second = rrf::fuse(first.clone(), Vec::new(), rrf::DEFAULT_K);

        let first_ids: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|c| c.id.as_str()).collect();
        prop_assert_eq!(first_ids, second_ids);
    }

    /// Universal invariant 7: after any sequence of `record_skill` calls,
    /// the cached skill count never exceeds `max_skills`.
    #[test]
    fn skill_cache_never_exceeds_its_cap(max_skills in 1usize..20, inserts in 0usize..100) {
        let memory = MemoryActor::new(50, max_skills);
        for i in 0..inserts {
            let mut skill = Skill::new(format!("skill-{i}"), vec![format!("trigger-{i}")], Default::default());
            skill.success_count = (i % 7) as u64;
            memory.record_skill(skill);
            prop_assert!(memory.find_similar_skills("skill", inserts.max(1)).len() <= max_skills);
        }
    }
}

/// Universal invariant 2 (topological execution): every task with
/// dependencies only runs after all its dependencies have produced a
/// `task_result`. Exercised via the rule-based fallback's own two-task
/// `search -> ask` chain (`qorch-orchestrator::planner` keeps
/// `topological_order` private, so this is asserted at the Orchestrator
/// level rather than calling the sort function directly): a service fake
/// that records call order lets the test confirm the search task's result
/// lands before the dependent ask task is dispatched.
#[tokio::test]
async fn dependent_task_always_executes_after_its_dependency_resolves() {
    let call_log = Arc::new(std::sync::Mutex::new(Vec::new()));
    let log_for_search = call_log.clone();

    struct LoggingService {
        id: String,
        log: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl qorch_gateway::Service for LoggingService {
        fn service_id(&self) -> &str {
            &self.id
        }
        fn capabilities(&self) -> &[String] {
            &[]
        }
        async fn initialize(&self) -> qorch_core::Result<()> {
            Ok(())
        }
        async fn execute(&self, method: &str, _params: serde_json::Value) -> qorch_core::Result<serde_json::Value> {
            self.log.lock().unwrap().push(method.to_string());
            Ok(json!({"query": "q", "results": [], "sources": []}))
        }
        async fn health_check(&self) -> bool {
            true
        }
        async fn shutdown(&self) -> qorch_core::Result<()> {
            Ok(())
        }
    }

    let gateway = Gateway::new(BreakerConfig::default(), Duration::from_secs(3600));
    gateway
        .register(Arc::new(LoggingService {
            id: "knowledge".to_string(),
            log: log_for_search,
        }))
        .await
        .unwrap();

    let orchestrator = build_orchestrator(gateway);
    let mut stream = orchestrator.process_intent(Request::new("what does it talk about", "topo-session"));
    while let Some(event) = stream.next().await {
        if event.is_terminal() {
            break;
        }
    }

    let log = call_log.lock().unwrap();
    let search_pos = log.iter().position(|m| m == "rag_search_multiple");
    let ask_pos = log.iter().position(|m| m == "rag_ask");
    if let (Some(s), Some(a)) = (search_pos, ask_pos) {
        assert!(s < a, "the dependent rag_ask task must be dispatched after rag_search_multiple resolves");
    }
}
