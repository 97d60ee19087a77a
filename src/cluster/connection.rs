//! Instance Connections
//!
//! 인스턴스별 프로토콜 세션과 역할에 따른 연결 핸들
//!
//! - [`GraphDriver`] / [`GraphSession`]: 외부 그래프 드라이버 경계
//! - [`GraphConnection`]: 풀 크기만큼 동시 사용을 허용하는 세션 래퍼
//! - [`ReadOnlyConnection`]: 읽기 쿼리만 노출하는 리더용 래퍼
//! - [`InstanceConnector`]: 연결 생성 및 확인 쿼리 수행

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::config::ServerAddress;
use super::control_plane::InstanceRole;
use super::error::{ClusterError, ClusterResult};
use super::query::{AccessMode, Query, QueryResult};

/// 연결 확인용 쿼리
pub const LIVENESS_QUERY: &str = "MATCH (n) RETURN n LIMIT 1";

// ============================================================================
// GraphDriver / GraphSession - 외부 드라이버 경계
// ============================================================================

/// 그래프 프로토콜 세션
#[async_trait]
pub trait GraphSession: Send + Sync {
    /// 쿼리 실행
    async fn run(&self, query: &Query) -> ClusterResult<QueryResult>;

    /// 읽기 전용으로 제한된 세션
    ///
    /// 같은 채널을 공유하며, 변경 쿼리는 드라이버가 거부합니다.
    /// 제한된 세션을 닫으면 원래 세션의 채널도 해제됩니다.
    fn read_only(self: Arc<Self>) -> Arc<dyn GraphSession>;

    /// 세션의 모든 채널 해제
    async fn close(&self) -> ClusterResult<()>;
}

/// 그래프 프로토콜 드라이버
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// URL로 세션 열기
    async fn open(
        &self,
        url: &str,
        pool_size: usize,
        concurrency_limit: usize,
    ) -> ClusterResult<Arc<dyn GraphSession>>;
}

// ============================================================================
// GraphConnection - 인스턴스 연결
// ============================================================================

/// 단일 인스턴스에 대한 풀링된 연결
///
/// 최대 `pool_size`개의 요청이 동시에 세션을 사용할 수 있습니다.
pub struct GraphConnection {
    /// 인스턴스 식별자
    identifier: String,
    /// 서버 주소
    address: ServerAddress,
    /// 역할
    role: InstanceRole,
    /// 프로토콜 세션
    session: Arc<dyn GraphSession>,
    /// 채널 세마포어
    channels: Semaphore,
    /// 풀 크기
    pool_size: usize,
    /// 채널 획득 타임아웃
    acquire_timeout: Duration,
    /// 닫힘 여부
    closed: AtomicBool,
    /// 실행된 쿼리 수
    total_queries: AtomicU64,
}

impl GraphConnection {
    /// 새 연결 생성
    pub fn new(
        identifier: impl Into<String>,
        address: ServerAddress,
        role: InstanceRole,
        session: Arc<dyn GraphSession>,
        pool_size: usize,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            address,
            role,
            session,
            channels: Semaphore::new(pool_size),
            pool_size,
            acquire_timeout,
            closed: AtomicBool::new(false),
            total_queries: AtomicU64::new(0),
        }
    }

    /// 쿼리 실행 (역할 제한은 핸들에서 적용)
    pub(crate) async fn run(&self, query: impl Into<Query>) -> ClusterResult<QueryResult> {
        self.ensure_open()?;
        let query = query.into();

        let _permit = tokio::time::timeout(self.acquire_timeout, self.channels.acquire())
            .await
            .map_err(|_| ClusterError::timeout(format!("Channel acquisition on {}", self.address)))?
            .map_err(|_| ClusterError::ConnectionClosed(self.identifier.clone()))?;

        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.session.run(&query).await
    }

    /// 연결 닫기
    ///
    /// 두 번째 호출부터는 `AlreadyClosed`를 반환합니다.
    pub async fn close(&self) -> ClusterResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ClusterError::AlreadyClosed(self.identifier.clone()));
        }
        self.channels.close();
        self.session.close().await
    }

    fn ensure_open(&self) -> ClusterResult<()> {
        if self.is_closed() {
            Err(ClusterError::ConnectionClosed(self.identifier.clone()))
        } else {
            Ok(())
        }
    }

    /// 닫힘 여부
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 인스턴스 식별자
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// 역할
    pub fn role(&self) -> InstanceRole {
        self.role
    }

    /// 풀 크기
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// 사용 중인 채널 수
    pub fn in_use(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.pool_size - self.channels.available_permits()
    }

    /// 실행된 쿼리 수
    pub fn total_queries(&self) -> u64 {
        self.total_queries.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for GraphConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConnection")
            .field("identifier", &self.identifier)
            .field("address", &self.address)
            .field("role", &self.role)
            .field("pool_size", &self.pool_size)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// ReadOnlyConnection - 읽기 전용 래퍼
// ============================================================================

/// 읽기 전용 연결
///
/// 변경 쿼리는 세션에 도달하기 전에 `ReadOnlyViolation`으로 거부됩니다.
#[derive(Debug, Clone)]
pub struct ReadOnlyConnection {
    inner: Arc<GraphConnection>,
}

impl ReadOnlyConnection {
    /// 연결을 읽기 전용으로 감싸기
    pub fn new(inner: Arc<GraphConnection>) -> Self {
        Self { inner }
    }

    /// 읽기 쿼리 실행
    pub async fn run(&self, query: impl Into<Query>) -> ClusterResult<QueryResult> {
        let query = query.into();
        if query.is_mutating() {
            return Err(ClusterError::ReadOnlyViolation(self.inner.identifier().to_string()));
        }
        self.inner.run(query).await
    }

    pub(crate) fn connection(&self) -> &Arc<GraphConnection> {
        &self.inner
    }
}

// ============================================================================
// ConnectionHandle - 라우팅 결과
// ============================================================================

/// 라우팅으로 얻는 연결 핸들
///
/// 같은 인스턴스로 라우팅된 호출자들이 복제본을 공유합니다.
#[derive(Debug, Clone)]
pub enum ConnectionHandle {
    /// 읽기/쓰기 (라이터)
    ReadWrite(Arc<GraphConnection>),
    /// 읽기 전용 (리더)
    ReadOnly(ReadOnlyConnection),
}

impl ConnectionHandle {
    /// 역할에 맞는 핸들 생성
    pub fn for_role(connection: GraphConnection) -> Self {
        let connection = Arc::new(connection);
        match connection.role() {
            InstanceRole::Writer => Self::ReadWrite(connection),
            InstanceRole::Reader => Self::ReadOnly(ReadOnlyConnection::new(connection)),
        }
    }

    /// 쿼리 실행
    pub async fn run(&self, query: impl Into<Query>) -> ClusterResult<QueryResult> {
        match self {
            Self::ReadWrite(conn) => conn.run(query).await,
            Self::ReadOnly(conn) => conn.run(query).await,
        }
    }

    /// 허용된 접근 모드
    pub fn access_mode(&self) -> AccessMode {
        match self {
            Self::ReadWrite(_) => AccessMode::Write,
            Self::ReadOnly(_) => AccessMode::Read,
        }
    }

    pub(crate) fn connection(&self) -> &Arc<GraphConnection> {
        match self {
            Self::ReadWrite(conn) => conn,
            Self::ReadOnly(conn) => conn.connection(),
        }
    }

    /// 인스턴스 식별자
    pub fn identifier(&self) -> &str {
        self.connection().identifier()
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        self.connection().address()
    }

    /// 인스턴스 역할
    pub fn role(&self) -> InstanceRole {
        self.connection().role()
    }

    /// 풀 크기
    pub fn pool_size(&self) -> usize {
        self.connection().pool_size()
    }

    /// 사용 중인 채널 수
    pub fn in_use(&self) -> usize {
        self.connection().in_use()
    }

    /// 실행된 쿼리 수
    pub fn total_queries(&self) -> u64 {
        self.connection().total_queries()
    }

    /// 닫힘 여부
    pub fn is_closed(&self) -> bool {
        self.connection().is_closed()
    }

    /// 연결 닫기
    pub async fn close(&self) -> ClusterResult<()> {
        self.connection().close().await
    }
}

// ============================================================================
// InstanceConnector - 연결 생성
// ============================================================================

/// 인스턴스 커넥터
#[derive(Clone)]
pub struct InstanceConnector {
    driver: Arc<dyn GraphDriver>,
    use_tls: bool,
    database: String,
    concurrency_limit: usize,
    timeout: Duration,
}

impl InstanceConnector {
    /// 새 커넥터 생성
    pub fn new(
        driver: Arc<dyn GraphDriver>,
        use_tls: bool,
        database: impl Into<String>,
        concurrency_limit: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            driver,
            use_tls,
            database: database.into(),
            concurrency_limit,
            timeout,
        }
    }

    /// 인스턴스에 연결하고 확인 쿼리 수행
    pub async fn connect(
        &self,
        identifier: &str,
        endpoint: &ServerAddress,
        role: InstanceRole,
        pool_size: usize,
    ) -> ClusterResult<ConnectionHandle> {
        let url = endpoint.to_url(self.use_tls, &self.database);

        let session = tokio::time::timeout(
            self.timeout,
            self.driver.open(&url, pool_size, self.concurrency_limit),
        )
        .await
        .map_err(|_| ClusterError::timeout(format!("Connecting to {}", url)))??;

        let probe = tokio::time::timeout(self.timeout, session.run(&Query::new(LIVENESS_QUERY))).await;
        let failure = match probe {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("liveness probe exceeded {:?}", self.timeout)),
        };

        if let Some(reason) = failure {
            if let Err(e) = session.close().await {
                tracing::debug!("Closing unhealthy session {} failed: {}", url, e);
            }
            return Err(ClusterError::unhealthy(endpoint.to_string(), reason));
        }

        tracing::debug!("Connected to {} {} at {}", role.as_str(), identifier, endpoint);

        let session = match role {
            InstanceRole::Writer => session,
            InstanceRole::Reader => session.read_only(),
        };

        Ok(ConnectionHandle::for_role(GraphConnection::new(
            identifier,
            endpoint.clone(),
            role,
            session,
            pool_size,
            self.timeout,
        )))
    }
}

impl fmt::Debug for InstanceConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceConnector")
            .field("use_tls", &self.use_tls)
            .field("database", &self.database)
            .field("concurrency_limit", &self.concurrency_limit)
            .field("timeout", &self.timeout)
            .finish()
    }
}
