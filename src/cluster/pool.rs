//! Cluster Pool
//!
//! 토폴로지 스냅샷을 구성하고 원자적으로 교체하며, 읽기/쓰기 요청을
//! 적절한 인스턴스 연결로 라우팅합니다.
//!
//! 라우팅 호출은 현재 설치된 스냅샷만 읽으므로 진행 중인 갱신에 의해
//! 차단되지 않습니다. 교체된 스냅샷의 연결은 더 이상 참조되지 않거나
//! 드레인 타임아웃이 지난 뒤에 닫힙니다.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::ClusterConfig;
use super::connection::{ConnectionHandle, GraphDriver, InstanceConnector};
use super::control_plane::{ClusterMember, ControlPlane, TopologyClient};
use super::error::{ClusterError, ClusterResult};
use super::policy::{ReadPolicy, ReplicaSelector};
use super::recycler::Recycler;
use super::snapshot::{Instance, TopologySnapshot};

/// 참조 해제 확인 주기
const QUIESCENCE_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ============================================================================
// GraphDatabase - 외부 노출 인터페이스
// ============================================================================

/// 그래프 데이터베이스 접근 인터페이스
///
/// API 계층이 의존하는 유일한 표면입니다.
#[async_trait]
pub trait GraphDatabase: Send + Sync {
    /// 쓰기 연결
    fn get_write_connection(&self) -> ClusterResult<ConnectionHandle>;

    /// 읽기 연결
    fn get_read_connection(&self) -> ClusterResult<ConnectionHandle>;

    /// 모든 연결 닫기
    async fn close(&self) -> ClusterResult<()>;
}

// ============================================================================
// RefreshOutcome / ClusterPoolMetrics
// ============================================================================

/// 비차단 갱신 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// 새 스냅샷 설치
    Refreshed,
    /// 다른 갱신이 진행 중이어서 건너뜀
    Skipped,
}

/// 클러스터 풀 메트릭
#[derive(Debug, Clone, Default)]
pub struct ClusterPoolMetrics {
    /// 현재 스냅샷 세대
    pub generation: u64,
    /// 현재 인스턴스 수
    pub instance_count: usize,
    /// 현재 리더 수
    pub reader_count: usize,
    /// 라이터 존재 여부
    pub has_writer: bool,
    /// 현재 스냅샷 경과 시간
    pub snapshot_age: Duration,
    /// 성공한 갱신 수
    pub refreshes_succeeded: u64,
    /// 실패한 갱신 수
    pub refreshes_failed: u64,
    /// 건너뛴 갱신 수
    pub refreshes_skipped: u64,
    /// 닫히기를 기다리는 스냅샷 수
    pub retiring_snapshots: usize,
}

#[derive(Debug, Default)]
struct RefreshCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

// ============================================================================
// ClusterPool - 클러스터 풀
// ============================================================================

/// 클러스터 인식 연결 풀
pub struct ClusterPool {
    /// 설정
    config: ClusterConfig,
    /// 토폴로지 조회
    topology: TopologyClient,
    /// 인스턴스 커넥터
    connector: InstanceConnector,
    /// 읽기 대상 선택기
    selector: ReplicaSelector,
    /// 현재 스냅샷
    snapshot: ArcSwap<TopologySnapshot>,
    /// 마지막 세대 번호
    generation: AtomicU64,
    /// 갱신 직렬화
    refresh_lock: tokio::sync::Mutex<()>,
    /// 열린 상태
    open: AtomicBool,
    /// 주기적 갱신 작업
    recycler: Mutex<Option<Recycler>>,
    /// 교체된 스냅샷 정리 작업
    retiring: Mutex<Vec<JoinHandle<()>>>,
    /// 종료 신호
    shutdown_token: CancellationToken,
    /// 갱신 카운터
    counters: RefreshCounters,
}

impl ClusterPool {
    /// 클러스터에 연결
    ///
    /// 첫 토폴로지 구성이 실패하면 풀을 만들지 않고 에러를 반환합니다.
    pub async fn connect(
        config: ClusterConfig,
        control_plane: Arc<dyn ControlPlane>,
        driver: Arc<dyn GraphDriver>,
    ) -> ClusterResult<Arc<Self>> {
        let selector = ReplicaSelector::new(ReadPolicy::from_config(&config));
        Self::connect_with_selector(config, control_plane, driver, selector).await
    }

    /// 지정한 선택기로 클러스터에 연결
    pub async fn connect_with_selector(
        config: ClusterConfig,
        control_plane: Arc<dyn ControlPlane>,
        driver: Arc<dyn GraphDriver>,
        selector: ReplicaSelector,
    ) -> ClusterResult<Arc<Self>> {
        config.validate()?;

        let topology = TopologyClient::new(control_plane, config.port, config.control_plane_timeout);
        let connector = InstanceConnector::new(
            driver,
            config.use_tls,
            config.database.clone(),
            config.concurrency_limit,
            config.connection_timeout,
        );

        let pool = Arc::new(Self {
            config,
            topology,
            connector,
            selector,
            snapshot: ArcSwap::from_pointee(TopologySnapshot::empty(0)),
            generation: AtomicU64::new(0),
            refresh_lock: tokio::sync::Mutex::new(()),
            open: AtomicBool::new(true),
            recycler: Mutex::new(None),
            retiring: Mutex::new(Vec::new()),
            shutdown_token: CancellationToken::new(),
            counters: RefreshCounters::default(),
        });

        if let Err(e) = pool.refresh().await {
            tracing::error!(
                "Initial topology build for cluster {} failed: {}",
                pool.config.cluster_id,
                e
            );
            pool.shutdown_token.cancel();
            return Err(e);
        }

        let recycler = Recycler::start(
            Arc::downgrade(&pool),
            pool.config.recycle_interval,
            pool.shutdown_token.child_token(),
        );
        *pool.recycler.lock() = Some(recycler);

        Ok(pool)
    }

    // ------------------------------------------------------------------------
    // 라우팅
    // ------------------------------------------------------------------------

    /// 라이터 연결
    pub fn get_write_connection(&self) -> ClusterResult<ConnectionHandle> {
        self.ensure_open()?;
        let snapshot = self.snapshot.load_full();

        snapshot
            .writer()
            .map(|writer| writer.connection.clone())
            .ok_or(ClusterError::NoWriterAvailable)
    }

    /// 읽기 연결
    ///
    /// 리더가 없으면 라이터로, 둘 다 없으면 `NoWriterAvailable`.
    pub fn get_read_connection(&self) -> ClusterResult<ConnectionHandle> {
        self.ensure_open()?;
        let snapshot = self.snapshot.load_full();

        self.selector
            .select(snapshot.writer_identifier(), snapshot.reader_identifiers())
            .and_then(|identifier| snapshot.get(identifier))
            .map(|instance| instance.connection.clone())
            .ok_or(ClusterError::NoWriterAvailable)
    }

    /// 현재 스냅샷
    pub fn snapshot(&self) -> Arc<TopologySnapshot> {
        self.snapshot.load_full()
    }

    // ------------------------------------------------------------------------
    // 갱신
    // ------------------------------------------------------------------------

    /// 토폴로지 갱신
    ///
    /// 진행 중인 다른 갱신이 끝날 때까지 기다립니다. 멤버 목록 조회가
    /// 실패하면 이전 스냅샷이 유지되고 `TopologyRefreshFailed`를 반환합니다.
    pub async fn refresh(&self) -> ClusterResult<()> {
        self.ensure_open()?;
        let _guard = self.refresh_lock.lock().await;
        self.ensure_open()?;
        self.refresh_locked().await
    }

    /// 비차단 토폴로지 갱신
    ///
    /// 다른 갱신이 진행 중이면 즉시 `Skipped`를 반환합니다.
    pub async fn try_refresh(&self) -> ClusterResult<RefreshOutcome> {
        self.ensure_open()?;
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "Refresh of cluster {} already in progress, skipping",
                self.config.cluster_id
            );
            return Ok(RefreshOutcome::Skipped);
        };
        self.ensure_open()?;
        self.refresh_locked().await?;
        Ok(RefreshOutcome::Refreshed)
    }

    async fn refresh_locked(&self) -> ClusterResult<()> {
        let started = Instant::now();
        let cluster_id = &self.config.cluster_id;

        let members = match self.topology.list_members(cluster_id).await {
            Ok(members) => members,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Listing members of cluster {} failed: {}", cluster_id, e);
                return Err(ClusterError::refresh_failed(e));
            }
        };

        let instances: Vec<Instance> = join_all(members.iter().map(|m| self.connect_member(m)))
            .await
            .into_iter()
            .flatten()
            .collect();

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (snapshot, rejected) = TopologySnapshot::build(generation, instances);

        for instance in rejected {
            tracing::warn!(
                "Dropping {} {} from cluster {}: another writer is already active",
                instance.role.as_str(),
                instance.identifier,
                cluster_id
            );
            close_handle(&instance.connection).await;
        }

        if snapshot.is_empty() {
            tracing::warn!("No instance of cluster {} is available", cluster_id);
        } else if snapshot.is_degraded() {
            tracing::warn!("Cluster {} has no available writer", cluster_id);
        }

        tracing::info!(
            "Cluster {} topology generation {}: writer={:?}, readers={}, took {:?}",
            cluster_id,
            generation,
            snapshot.writer_identifier(),
            snapshot.reader_identifiers().len(),
            started.elapsed()
        );

        let previous = self.snapshot.swap(Arc::new(snapshot));
        self.retire(previous);
        self.counters.succeeded.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// 멤버 하나를 조회하고 연결 (실패 시 이번 주기에서 제외)
    async fn connect_member(&self, member: &ClusterMember) -> Option<Instance> {
        let description = match self
            .topology
            .describe_instance(&self.config.cluster_id, &member.identifier)
            .await
        {
            Ok(description) => description,
            Err(e) => {
                tracing::warn!("Skipping instance {}: {}", member.identifier, e);
                return None;
            }
        };

        let Some(endpoint) = description.available_endpoint().cloned() else {
            tracing::debug!(
                "Skipping instance {}: status {:?}",
                member.identifier,
                description.status
            );
            return None;
        };

        match self
            .connector
            .connect(&member.identifier, &endpoint, member.role, self.config.pool_size)
            .await
        {
            Ok(connection) => Some(Instance {
                identifier: member.identifier.clone(),
                role: member.role,
                endpoint,
                connection,
            }),
            Err(e) => {
                tracing::warn!("Skipping instance {} at {}: {}", member.identifier, endpoint, e);
                None
            }
        }
    }

    /// 교체된 스냅샷을 참조가 사라진 뒤 닫도록 예약
    fn retire(&self, snapshot: Arc<TopologySnapshot>) {
        if snapshot.is_empty() {
            return;
        }

        let handle = tokio::spawn(drain_and_close(
            snapshot,
            self.config.drain_timeout,
            self.shutdown_token.clone(),
        ));

        let mut retiring = self.retiring.lock();
        retiring.retain(|h| !h.is_finished());
        retiring.push(handle);
    }

    // ------------------------------------------------------------------------
    // 종료
    // ------------------------------------------------------------------------

    /// 풀 종료
    ///
    /// 갱신 작업을 멈추고 모든 연결을 닫습니다. 이후 호출은 `PoolClosed`로
    /// 실패합니다. 두 번째 호출은 아무 일도 하지 않습니다.
    pub async fn shutdown(&self) -> ClusterResult<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        self.shutdown_token.cancel();

        let recycler = self.recycler.lock().take();
        if let Some(recycler) = recycler {
            recycler.stop().await;
        }

        let _guard = self.refresh_lock.lock().await;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let last = self.snapshot.swap(Arc::new(TopologySnapshot::empty(generation)));
        close_snapshot(&last).await;

        let retiring = std::mem::take(&mut *self.retiring.lock());
        for result in join_all(retiring).await {
            if let Err(e) = result {
                tracing::warn!("Snapshot retirement task failed: {}", e);
            }
        }

        tracing::info!("Cluster pool for {} closed", self.config.cluster_id);
        Ok(())
    }

    /// 열린 상태 확인
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> ClusterResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ClusterError::PoolClosed)
        }
    }

    /// 설정
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// 메트릭
    pub fn metrics(&self) -> ClusterPoolMetrics {
        let snapshot = self.snapshot.load();
        let retiring_snapshots = self.retiring.lock().iter().filter(|h| !h.is_finished()).count();

        ClusterPoolMetrics {
            generation: snapshot.generation(),
            instance_count: snapshot.len(),
            reader_count: snapshot.reader_identifiers().len(),
            has_writer: !snapshot.is_degraded(),
            snapshot_age: snapshot.age(),
            refreshes_succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            refreshes_failed: self.counters.failed.load(Ordering::Relaxed),
            refreshes_skipped: self.counters.skipped.load(Ordering::Relaxed),
            retiring_snapshots,
        }
    }
}

#[async_trait]
impl GraphDatabase for ClusterPool {
    fn get_write_connection(&self) -> ClusterResult<ConnectionHandle> {
        ClusterPool::get_write_connection(self)
    }

    fn get_read_connection(&self) -> ClusterResult<ConnectionHandle> {
        ClusterPool::get_read_connection(self)
    }

    async fn close(&self) -> ClusterResult<()> {
        self.shutdown().await
    }
}

impl Drop for ClusterPool {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

impl fmt::Debug for ClusterPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("ClusterPool")
            .field("cluster_id", &self.config.cluster_id)
            .field("open", &self.is_open())
            .field("generation", &snapshot.generation())
            .field("writer", &snapshot.writer_identifier())
            .field("readers", &snapshot.reader_identifiers())
            .field("selector", &self.selector)
            .finish()
    }
}

// ============================================================================
// 스냅샷 정리
// ============================================================================

/// 참조가 사라지거나 타임아웃/종료 신호가 올 때까지 기다린 뒤 연결을 닫음
async fn drain_and_close(
    snapshot: Arc<TopologySnapshot>,
    drain_timeout: Duration,
    shutdown: CancellationToken,
) {
    tokio::select! {
        _ = wait_for_quiescence(&snapshot) => {}
        _ = tokio::time::sleep(drain_timeout) => {
            tracing::warn!(
                "Snapshot generation {} still in use after {:?}, closing anyway",
                snapshot.generation(),
                drain_timeout
            );
        }
        _ = shutdown.cancelled() => {}
    }

    close_snapshot(&snapshot).await;
}

async fn wait_for_quiescence(snapshot: &Arc<TopologySnapshot>) {
    let mut ticker = tokio::time::interval(QUIESCENCE_POLL_INTERVAL);
    loop {
        ticker.tick().await;
        // 스냅샷 자체를 가진 호출자가 없어야 새 핸들 복제도 없음
        if Arc::strong_count(snapshot) == 1 && snapshot.is_quiescent() {
            return;
        }
    }
}

async fn close_snapshot(snapshot: &TopologySnapshot) {
    join_all(snapshot.connections().map(close_handle)).await;
    tracing::debug!(
        "Closed {} connections of snapshot generation {}",
        snapshot.len(),
        snapshot.generation()
    );
}

async fn close_handle(handle: &ConnectionHandle) {
    match handle.close().await {
        Ok(()) | Err(ClusterError::AlreadyClosed(_)) => {}
        Err(e) => tracing::warn!("Closing connection to {} failed: {}", handle.address(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::control_plane::InMemoryControlPlane;
    use crate::cluster::query::AccessMode;
    use crate::cluster::testing::FakeDriver;
    use std::collections::HashMap;

    const CLUSTER: &str = "graph-test";

    fn test_config() -> ClusterConfig {
        ClusterConfig::builder(CLUSTER, "local")
            .with_control_plane_timeout(Duration::from_millis(300))
            .with_connection_timeout(Duration::from_millis(300))
            .with_drain_timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    fn control_plane(members: &[(&str, bool)]) -> Arc<InMemoryControlPlane> {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.set_members(CLUSTER, members);
        for (identifier, _) in members {
            let host = format!("{}.local", identifier);
            plane.set_instance(CLUSTER, identifier, "available", Some(&host));
        }
        plane
    }

    async fn connect(
        plane: &Arc<InMemoryControlPlane>,
        driver: &Arc<FakeDriver>,
        policy: ReadPolicy,
    ) -> Arc<ClusterPool> {
        ClusterPool::connect_with_selector(
            test_config(),
            plane.clone(),
            driver.clone(),
            ReplicaSelector::with_seed(policy, 17),
        )
        .await
        .unwrap()
    }

    async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_connect_builds_initial_snapshot() {
        let plane = control_plane(&[("w", true), ("r1", false), ("r2", false)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = ClusterPool::connect(test_config(), plane, driver.clone()).await.unwrap();

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.generation(), 1);
        assert_eq!(snapshot.writer_identifier(), Some("w"));
        assert_eq!(snapshot.reader_identifiers(), &["r1".to_string(), "r2".to_string()]);

        let writer = pool.get_write_connection().unwrap();
        assert_eq!(writer.identifier(), "w");
        assert_eq!(writer.access_mode(), AccessMode::Write);
        assert_eq!(driver.opened_urls().len(), 3);

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_fails_without_cluster() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let driver = Arc::new(FakeDriver::new());

        let result = ClusterPool::connect(test_config(), plane, driver).await;
        match result {
            Err(ClusterError::TopologyRefreshFailed(cause)) => {
                assert!(matches!(*cause, ClusterError::NoClusterFound(_)));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let plane = control_plane(&[("w", true)]);
        let driver = Arc::new(FakeDriver::new());
        let mut config = test_config();
        config.pool_size = 0;

        let result = ClusterPool::connect(config, plane, driver).await;
        assert!(matches!(result, Err(ClusterError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unusable_members_are_skipped() {
        let plane = control_plane(&[("w", true), ("r1", false), ("r2", false), ("r3", false), ("r4", false)]);
        plane.set_instance(CLUSTER, "r1", "creating", None);
        plane.push_instance_record(crate::cluster::control_plane::InstanceRecord {
            identifier: "r3".into(),
            cluster_id: CLUSTER.into(),
            status: "available".into(),
            endpoint_address: Some("r3-dup.local".into()),
        });
        plane.set_latency("r4", Duration::from_secs(5));

        let driver = Arc::new(FakeDriver::new());
        driver.fail_probe("r2.local");

        let pool = connect(&plane, &driver, ReadPolicy::default()).await;
        let snapshot = pool.snapshot();

        assert_eq!(snapshot.writer_identifier(), Some("w"));
        assert!(snapshot.reader_identifiers().is_empty());
        assert_eq!(snapshot.len(), 1);

        // 확인 쿼리에 실패한 세션은 닫힘
        assert_eq!(driver.session("r2.local").unwrap().close_count(), 1);

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_routing_weights() {
        let plane = control_plane(&[("w", true), ("r1", false), ("r2", false)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::default()).await;

        let trials = 50_000;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..trials {
            let handle = pool.get_read_connection().unwrap();
            *counts.entry(handle.identifier().to_string()).or_insert(0) += 1;
        }

        let freq = |id: &str| counts.get(id).copied().unwrap_or(0) as f64 / trials as f64;
        assert!((freq("w") - 0.2).abs() < 0.01);
        assert!((freq("r1") - 0.4).abs() < 0.01);
        assert!((freq("r2") - 0.4).abs() < 0.01);

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_routing_without_writer_reads() {
        let plane = control_plane(&[("w", true), ("r1", false), ("r2", false)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::readers_only()).await;

        for _ in 0..1_000 {
            let handle = pool.get_read_connection().unwrap();
            assert_ne!(handle.identifier(), "w");
            assert_eq!(handle.access_mode(), AccessMode::Read);
        }

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_falls_back_to_writer() {
        let plane = control_plane(&[("w", true)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::default()).await;

        for _ in 0..100 {
            assert_eq!(pool.get_read_connection().unwrap().identifier(), "w");
        }

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_degraded_pool_routing() {
        let plane = control_plane(&[("w", true), ("r1", false)]);
        plane.set_instance(CLUSTER, "w", "rebooting", Some("w.local"));
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::default()).await;

        assert!(matches!(pool.get_write_connection(), Err(ClusterError::NoWriterAvailable)));
        assert_eq!(pool.get_read_connection().unwrap().identifier(), "r1");

        // 모든 인스턴스가 사라지면 읽기도 실패
        plane.set_instance(CLUSTER, "r1", "failed", None);
        pool.refresh().await.unwrap();
        assert!(pool.snapshot().is_empty());
        assert!(matches!(pool.get_read_connection(), Err(ClusterError::NoWriterAvailable)));

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_listing_keeps_previous_snapshot() {
        let plane = control_plane(&[("w", true), ("r1", false)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::default()).await;
        let before = pool.snapshot();

        plane.fail_cluster_lookups(Some("throttled"));
        let result = pool.refresh().await;
        assert!(matches!(result, Err(ClusterError::TopologyRefreshFailed(_))));

        plane.remove_cluster(CLUSTER);
        plane.fail_cluster_lookups(None);
        let result = pool.refresh().await;
        assert!(matches!(result, Err(ClusterError::TopologyRefreshFailed(_))));

        let after = pool.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        let writer = pool.get_write_connection().unwrap();
        assert!(!writer.is_closed());
        assert!(writer.run("MATCH (n) RETURN n").await.is_ok());

        let metrics = pool.metrics();
        assert_eq!(metrics.refreshes_failed, 2);
        assert_eq!(metrics.refreshes_succeeded, 1);

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_membership_listing_timeout_fails_refresh() {
        let plane = control_plane(&[("w", true)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::default()).await;

        plane.set_latency(CLUSTER, Duration::from_secs(5));
        match pool.refresh().await {
            Err(ClusterError::TopologyRefreshFailed(cause)) => {
                assert!(matches!(*cause, ClusterError::Timeout(_)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(pool.snapshot().generation(), 1);

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_recycles_connections() {
        let plane = control_plane(&[("w", true), ("r1", false)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::default()).await;

        let old_writer = pool.get_write_connection().unwrap();
        let old_sessions = driver.all_sessions();
        assert_eq!(old_sessions.len(), 2);
        pool.refresh().await.unwrap();

        let new_writer = pool.get_write_connection().unwrap();
        assert!(!Arc::ptr_eq(old_writer.connection(), new_writer.connection()));
        assert_eq!(pool.snapshot().generation(), 2);

        // 이전 핸들을 가진 호출자가 있는 동안에는 닫히지 않음
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!old_writer.is_closed());
        assert!(old_writer.run("MATCH (n) RETURN n").await.is_ok());

        assert!(old_sessions.iter().all(|s| s.close_count() == 0));

        drop(old_writer);
        assert!(eventually(|| old_sessions.iter().all(|s| s.close_count() == 1)).await);
        assert!(!new_writer.is_closed());

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_demoted_writer_is_not_reused() {
        let plane = control_plane(&[("a", true), ("b", false)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::default()).await;
        assert_eq!(pool.get_write_connection().unwrap().identifier(), "a");

        // 장애 조치: b가 라이터로 승격되었지만 아직 사용 불가, a는 리더로 강등
        plane.set_members(CLUSTER, &[("a", false), ("b", true)]);
        plane.set_instance(CLUSTER, "b", "modifying", Some("b.local"));
        pool.refresh().await.unwrap();

        assert!(matches!(pool.get_write_connection(), Err(ClusterError::NoWriterAvailable)));
        let read = pool.get_read_connection().unwrap();
        assert_eq!(read.identifier(), "a");
        assert_eq!(read.access_mode(), AccessMode::Read);

        plane.set_instance(CLUSTER, "b", "available", Some("b.local"));
        pool.refresh().await.unwrap();
        assert_eq!(pool.get_write_connection().unwrap().identifier(), "b");

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_writer_is_dropped_and_closed() {
        let plane = control_plane(&[("w1", true), ("w2", true), ("r1", false)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::default()).await;

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.writer_identifier(), Some("w1"));
        assert!(snapshot.get("w2").is_none());
        assert_eq!(driver.session("w2.local").unwrap().close_count(), 1);

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_try_refresh_skips_when_busy() {
        let plane = control_plane(&[("w", true)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::default()).await;

        plane.set_latency(CLUSTER, Duration::from_millis(150));
        let background = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(pool.try_refresh().await.unwrap(), RefreshOutcome::Skipped);
        assert!(background.await.unwrap().is_ok());
        assert_eq!(pool.metrics().refreshes_skipped, 1);

        plane.set_latency(CLUSTER, Duration::ZERO);
        assert_eq!(pool.try_refresh().await.unwrap(), RefreshOutcome::Refreshed);

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_reads_see_complete_snapshots() {
        let plane = control_plane(&[("w", true), ("r1", false), ("r2", false), ("r3", false)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::default()).await;

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let snapshot = pool.snapshot();
                        assert_eq!(snapshot.len(), 4);
                        assert_eq!(snapshot.writer_identifier(), Some("w"));
                        assert_eq!(snapshot.reader_identifiers().len(), 3);

                        let handle = pool.get_read_connection().unwrap();
                        assert!(["w", "r1", "r2", "r3"].contains(&handle.identifier()));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            pool.refresh().await.unwrap();
        }
        for reader in readers {
            reader.await.unwrap();
        }

        assert_eq!(pool.snapshot().generation(), 21);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything_once() {
        let plane = control_plane(&[("w", true), ("r1", false), ("r2", false)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::default()).await;

        // 이전 세대를 붙잡고 있어도 종료 시 모두 닫힘
        let held = pool.get_read_connection().unwrap();
        pool.refresh().await.unwrap();
        pool.refresh().await.unwrap();

        pool.shutdown().await.unwrap();
        assert!(!pool.is_open());
        assert!(held.is_closed());

        let sessions = driver.all_sessions();
        assert_eq!(sessions.len(), 9);
        assert!(sessions.iter().all(|s| s.close_count() == 1));

        assert!(matches!(pool.get_write_connection(), Err(ClusterError::PoolClosed)));
        assert!(matches!(pool.get_read_connection(), Err(ClusterError::PoolClosed)));
        assert!(matches!(pool.refresh().await, Err(ClusterError::PoolClosed)));
        assert!(matches!(pool.try_refresh().await, Err(ClusterError::PoolClosed)));

        // 두 번째 종료는 아무 일도 하지 않음
        assert!(pool.shutdown().await.is_ok());
        assert!(sessions.iter().all(|s| s.close_count() == 1));
    }

    #[tokio::test]
    async fn test_graph_database_interface() {
        let plane = control_plane(&[("w", true), ("r1", false)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::readers_only()).await;
        let database: Arc<dyn GraphDatabase> = pool.clone();

        let write = database.get_write_connection().unwrap();
        assert!(write.run("CREATE (n:Person {name: 'Alice'})").await.is_ok());

        let read = database.get_read_connection().unwrap();
        let result = read.run("MATCH (n) RETURN n").await.unwrap();
        assert_eq!(
            result.first().and_then(|r| r.get("host")).and_then(|v| v.as_str()),
            Some("r1.local")
        );
        assert!(matches!(
            read.run("MATCH (n) DETACH DELETE n").await,
            Err(ClusterError::ReadOnlyViolation(_))
        ));

        database.close().await.unwrap();
        assert!(matches!(database.get_read_connection(), Err(ClusterError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_metrics() {
        let plane = control_plane(&[("w", true), ("r1", false), ("r2", false)]);
        let driver = Arc::new(FakeDriver::new());
        let pool = connect(&plane, &driver, ReadPolicy::default()).await;

        let metrics = pool.metrics();
        assert_eq!(metrics.generation, 1);
        assert_eq!(metrics.instance_count, 3);
        assert_eq!(metrics.reader_count, 2);
        assert!(metrics.has_writer);
        assert_eq!(metrics.refreshes_succeeded, 1);

        pool.shutdown().await.unwrap();
    }
}
