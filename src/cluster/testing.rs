//! 테스트용 그래프 드라이버

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::config::ServerAddress;
use super::connection::{ConnectionHandle, GraphConnection, GraphDriver, GraphSession};
use super::control_plane::InstanceRole;
use super::error::{ClusterError, ClusterResult};
use super::query::{Query, QueryResult, Record, Value};
use super::snapshot::Instance;

/// URL에서 호스트 추출 (`bolt+s://host:port/db` → `host`)
fn host_of(url: &str) -> String {
    let rest = url.split("://").nth(1).unwrap_or(url);
    rest.split(|c| c == ':' || c == '/').next().unwrap_or(rest).to_string()
}

/// 테스트용 세션
#[derive(Debug, Default)]
pub struct FakeSession {
    host: String,
    queries: Mutex<Vec<String>>,
    fail_queries: AtomicBool,
    query_delay: Mutex<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    close_count: AtomicUsize,
}

impl FakeSession {
    fn new(host: String, fail_queries: bool) -> Self {
        Self {
            host,
            fail_queries: AtomicBool::new(fail_queries),
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock() = delay;
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphSession for FakeSession {
    async fn run(&self, query: &Query) -> ClusterResult<QueryResult> {
        self.queries.lock().push(query.text.clone());
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(ClusterError::query(
                "Neo.TransientError.General.DatabaseUnavailable",
                format!("{} is not ready", self.host),
            ));
        }

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let delay = *self.query_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        Ok(QueryResult::new(
            vec!["host".to_string()],
            vec![Record::new(vec!["host".to_string()], vec![Value::from(self.host.as_str())])],
        ))
    }

    fn read_only(self: Arc<Self>) -> Arc<dyn GraphSession> {
        Arc::new(FakeReadOnlySession { inner: self })
    }

    async fn close(&self) -> ClusterResult<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 서버 측 쓰기 거부를 흉내 내는 읽기 전용 세션
#[derive(Debug)]
pub struct FakeReadOnlySession {
    inner: Arc<FakeSession>,
}

/// 쓰기 키워드를 단어 단위로 검사 (`apoc.create.node` 포함)
fn writes(text: &str) -> bool {
    const WRITE_WORDS: &[&str] = &["CREATE", "MERGE", "DELETE", "SET", "REMOVE", "DROP"];
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| WRITE_WORDS.contains(&word.to_ascii_uppercase().as_str()))
}

#[async_trait]
impl GraphSession for FakeReadOnlySession {
    async fn run(&self, query: &Query) -> ClusterResult<QueryResult> {
        if writes(&query.text) {
            return Err(ClusterError::query(
                "Neo.ClientError.Statement.AccessMode",
                format!("Writing in read access mode not allowed on {}", self.inner.host),
            ));
        }
        self.inner.run(query).await
    }

    fn read_only(self: Arc<Self>) -> Arc<dyn GraphSession> {
        self
    }

    async fn close(&self) -> ClusterResult<()> {
        self.inner.close().await
    }
}

/// 테스트용 드라이버
///
/// 호스트별로 연결 거부, 확인 쿼리 실패, 지연을 설정할 수 있습니다.
#[derive(Debug, Default)]
pub struct FakeDriver {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    refused: Mutex<HashSet<String>>,
    failing_probes: Mutex<HashSet<String>>,
    open_delays: Mutex<HashMap<String, Duration>>,
    opened_urls: Mutex<Vec<String>>,
    last_limits: Mutex<Option<(usize, usize)>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse(&self, host: &str) {
        self.refused.lock().insert(host.to_string());
    }

    pub fn fail_probe(&self, host: &str) {
        self.failing_probes.lock().insert(host.to_string());
    }

    pub fn set_open_delay(&self, host: &str, delay: Duration) {
        self.open_delays.lock().insert(host.to_string(), delay);
    }

    /// 호스트에 대해 가장 최근에 열린 세션
    pub fn session(&self, host: &str) -> Option<Arc<FakeSession>> {
        self.sessions.lock().iter().rev().find(|s| s.host == host).cloned()
    }

    /// 지금까지 열린 모든 세션
    pub fn all_sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().clone()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.opened_urls.lock().clone()
    }

    pub fn last_limits(&self) -> Option<(usize, usize)> {
        *self.last_limits.lock()
    }
}

#[async_trait]
impl GraphDriver for FakeDriver {
    async fn open(
        &self,
        url: &str,
        pool_size: usize,
        concurrency_limit: usize,
    ) -> ClusterResult<Arc<dyn GraphSession>> {
        let host = host_of(url);

        let delay = self.open_delays.lock().get(&host).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.refused.lock().contains(&host) {
            return Err(ClusterError::connection(format!("Connection refused: {}", url)));
        }

        self.opened_urls.lock().push(url.to_string());
        *self.last_limits.lock() = Some((pool_size, concurrency_limit));

        let failing = self.failing_probes.lock().contains(&host);
        let session = Arc::new(FakeSession::new(host, failing));
        self.sessions.lock().push(session.clone());
        Ok(session)
    }
}

/// 연결이 준비된 스냅샷 인스턴스
pub fn fake_instance(identifier: &str, role: InstanceRole) -> Instance {
    let endpoint = ServerAddress::new(format!("{}.local", identifier), 7687);
    let session: Arc<dyn GraphSession> = Arc::new(FakeSession::new(endpoint.host.clone(), false));
    let session = match role {
        InstanceRole::Writer => session,
        InstanceRole::Reader => session.read_only(),
    };
    let connection = GraphConnection::new(
        identifier,
        endpoint.clone(),
        role,
        session,
        1,
        Duration::from_secs(1),
    );
    Instance {
        identifier: identifier.to_string(),
        role,
        endpoint,
        connection: ConnectionHandle::for_role(connection),
    }
}
