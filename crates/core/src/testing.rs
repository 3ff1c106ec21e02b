//! In-memory transport for exercising the execution engine without a
//! cluster. Statements execute against scripted rules; everything that ran
//! is recorded with start and finish instants so tests can assert ordering
//! and barrier behavior.

use crate::cql::{PhysicalStatement, StatementKind};
use crate::error::ExecutionError;
use crate::transport::{ClusterMetadata, ObservedKeyspace, RawResultSet, RawRow, Transport, TransportConfig};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// What a rule replies with: zero or more pages of rows plus the
/// conditional outcome.
#[derive(Debug, Clone)]
pub struct MockData {
    pub pages: Vec<Vec<RawRow>>,
    pub applied: bool,
}

impl Default for MockData {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            applied: true,
        }
    }
}

impl MockData {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows(rows: Vec<RawRow>) -> Self {
        Self {
            pages: vec![rows],
            applied: true,
        }
    }

    pub fn paged(pages: Vec<Vec<RawRow>>) -> Self {
        Self { pages, applied: true }
    }

    pub fn not_applied(row: Option<RawRow>) -> Self {
        Self {
            pages: vec![row.into_iter().collect()],
            applied: false,
        }
    }
}

type Matcher = Box<dyn Fn(&PhysicalStatement) -> bool + Send + Sync>;
type Reply = Box<dyn Fn(&PhysicalStatement) -> Result<MockData, ExecutionError> + Send + Sync>;

struct MockRule {
    matcher: Matcher,
    delay: Duration,
    reply: Reply,
}

/// One executed statement, with when it started and finished.
#[derive(Debug, Clone)]
pub struct ExecutionEvent {
    pub cql: String,
    pub keyspace: String,
    pub kind: StatementKind,
    pub started: Instant,
    pub finished: Instant,
}

pub struct MockTransport {
    nodes: usize,
    rules: RwLock<Vec<MockRule>>,
    events: Mutex<Vec<ExecutionEvent>>,
    observed: RwLock<HashMap<String, ObservedKeyspace>>,
}

impl MockTransport {
    pub fn new(nodes: usize) -> Arc<Self> {
        Arc::new(Self {
            nodes,
            rules: RwLock::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            observed: RwLock::new(HashMap::new()),
        })
    }

    /// Later rules win over earlier ones; unmatched statements succeed with
    /// an empty result.
    pub fn when(
        &self,
        matcher: impl Fn(&PhysicalStatement) -> bool + Send + Sync + 'static,
        reply: impl Fn(&PhysicalStatement) -> Result<MockData, ExecutionError> + Send + Sync + 'static,
    ) {
        self.when_delayed(matcher, Duration::ZERO, reply)
    }

    pub fn when_delayed(
        &self,
        matcher: impl Fn(&PhysicalStatement) -> bool + Send + Sync + 'static,
        delay: Duration,
        reply: impl Fn(&PhysicalStatement) -> Result<MockData, ExecutionError> + Send + Sync + 'static,
    ) {
        self.rules.write().push(MockRule {
            matcher: Box::new(matcher),
            delay,
            reply: Box::new(reply),
        });
    }

    /// Every statement takes at least `delay`, regardless of rules.
    pub fn base_delay(&self, delay: Duration) {
        self.rules.write().insert(
            0,
            MockRule {
                matcher: Box::new(|_| true),
                delay,
                reply: Box::new(|_| Ok(MockData::empty())),
            },
        );
    }

    /// Registers a keyspace's observable schema.
    pub fn observe(&self, schema: ObservedKeyspace) {
        self.observed.write().insert(schema.name.clone(), schema);
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().clone()
    }

    /// Executed CQL strings, in submission order.
    pub fn executed(&self) -> Vec<String> {
        let mut events = self.events();
        events.sort_by_key(|e| e.started);
        events.into_iter().map(|e| e.cql).collect()
    }

    pub fn event_for(&self, needle: &str) -> Option<ExecutionEvent> {
        self.events().into_iter().find(|e| e.cql.contains(needle))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, statement: &PhysicalStatement) -> Result<Box<dyn RawResultSet>, ExecutionError> {
        let started = Instant::now();
        let (delay, outcome) = {
            let rules = self.rules.read();
            match rules.iter().rev().find(|r| (r.matcher)(statement)) {
                Some(rule) => (rule.delay, (rule.reply)(statement)),
                None => (Duration::ZERO, Ok(MockData::empty())),
            }
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.events.lock().push(ExecutionEvent {
            cql: statement.cql.clone(),
            keyspace: statement.keyspace.clone(),
            kind: statement.kind,
            started,
            finished: Instant::now(),
        });
        outcome.map(|data| Box::new(MockResultSet::new(data)) as Box<dyn RawResultSet>)
    }

    fn cluster_metadata(&self) -> ClusterMetadata {
        ClusterMetadata {
            nodes: self.nodes,
            data_centers: vec!["dc1".to_owned()],
        }
    }

    fn configuration(&self) -> TransportConfig {
        TransportConfig::default()
    }

    async fn observe_schema(&self, keyspace: &str) -> Result<Option<ObservedKeyspace>, ExecutionError> {
        Ok(self.observed.read().get(keyspace).cloned())
    }
}

/// Result set over scripted pages; the first page arrives pre-fetched.
pub struct MockResultSet {
    fetched: VecDeque<RawRow>,
    pending: VecDeque<Vec<RawRow>>,
    applied: bool,
}

impl MockResultSet {
    pub fn new(data: MockData) -> Self {
        let mut pending: VecDeque<Vec<RawRow>> = data.pages.into();
        let fetched = pending.pop_front().unwrap_or_default().into();
        Self {
            fetched,
            pending,
            applied: data.applied,
        }
    }
}

#[async_trait]
impl RawResultSet for MockResultSet {
    fn next_row(&mut self) -> Option<RawRow> {
        self.fetched.pop_front()
    }

    fn available_without_fetching(&self) -> usize {
        self.fetched.len()
    }

    fn is_fully_fetched(&self) -> bool {
        self.pending.is_empty()
    }

    async fn fetch_more(&mut self) -> Result<bool, ExecutionError> {
        match self.pending.pop_front() {
            Some(page) => {
                self.fetched.extend(page);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn was_applied(&self) -> bool {
        self.applied
    }
}
