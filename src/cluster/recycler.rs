//! Connection Recycler
//!
//! 주기적으로 토폴로지를 갱신하는 백그라운드 작업

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::error::ClusterError;
use super::pool::{ClusterPool, RefreshOutcome};

/// 주기적 갱신 작업
///
/// 풀에 대한 약한 참조만 가지므로 풀이 해제되면 스스로 종료됩니다.
/// 이전 갱신이 끝나지 않았으면 해당 주기는 건너뜁니다.
#[derive(Debug)]
pub struct Recycler {
    token: CancellationToken,
    handle: JoinHandle<()>,
    interval: Duration,
}

impl Recycler {
    /// 작업 시작 (첫 갱신은 한 주기 뒤)
    pub fn start(pool: Weak<ClusterPool>, interval: Duration, token: CancellationToken) -> Self {
        let handle = tokio::spawn(run(pool, interval, token.clone()));
        Self {
            token,
            handle,
            interval,
        }
    }

    /// 갱신 주기
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// 작업 중지 후 종료 대기
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!("Recycler task ended abnormally: {}", e);
        }
    }
}

async fn run(pool: Weak<ClusterPool>, period: Duration, token: CancellationToken) {
    let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!("Recycler started, period {:?}", period);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(pool) = pool.upgrade() else {
            break;
        };

        match pool.try_refresh().await {
            Ok(RefreshOutcome::Refreshed) => {
                tracing::debug!("Recycled connections of cluster {}", pool.config().cluster_id);
            }
            Ok(RefreshOutcome::Skipped) => {}
            Err(ClusterError::PoolClosed) => break,
            Err(e) => {
                tracing::warn!(
                    "Recycling connections of cluster {} failed: {}",
                    pool.config().cluster_id,
                    e
                );
            }
        }
    }

    tracing::debug!("Recycler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::config::ClusterConfig;
    use crate::cluster::control_plane::InMemoryControlPlane;
    use crate::cluster::testing::FakeDriver;
    use std::sync::Arc;

    const CLUSTER: &str = "graph-recycle";

    fn control_plane() -> Arc<InMemoryControlPlane> {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.set_members(CLUSTER, &[("w", true), ("r1", false)]);
        plane.set_instance(CLUSTER, "w", "available", Some("w.local"));
        plane.set_instance(CLUSTER, "r1", "available", Some("r1.local"));
        plane
    }

    async fn pool(plane: &Arc<InMemoryControlPlane>) -> Arc<ClusterPool> {
        let config = ClusterConfig::builder(CLUSTER, "local")
            .with_recycle_minutes(5)
            .build()
            .unwrap();
        ClusterPool::connect(config, plane.clone(), Arc::new(FakeDriver::new()))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_recycles_on_interval() {
        let plane = control_plane();
        let pool = pool(&plane).await;
        assert_eq!(plane.describe_cluster_calls(), 1);

        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        assert_eq!(plane.describe_cluster_calls(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(plane.describe_cluster_calls(), 2);
        assert_eq!(pool.snapshot().generation(), 2);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(pool.snapshot().generation(), 3);

        pool.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_secs(15 * 60)).await;
        assert_eq!(plane.describe_cluster_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_recycle_keeps_running() {
        let plane = control_plane();
        let pool = pool(&plane).await;

        plane.fail_cluster_lookups(Some("throttled"));
        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
        assert_eq!(pool.metrics().refreshes_failed, 1);
        assert_eq!(pool.snapshot().generation(), 1);

        plane.fail_cluster_lookups(None);
        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(pool.snapshot().generation(), 2);

        pool.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_task() {
        let plane = control_plane();
        let pool = pool(&plane).await;

        let recycler = Recycler::start(
            Arc::downgrade(&pool),
            Duration::from_millis(100),
            CancellationToken::new(),
        );
        assert_eq!(recycler.interval(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(recycler.is_running());
        let calls = plane.describe_cluster_calls();
        assert_eq!(calls, 4);

        recycler.stop().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(plane.describe_cluster_calls(), calls);

        pool.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_when_pool_is_dropped() {
        let plane = control_plane();
        let pool = pool(&plane).await;

        let recycler = Recycler::start(
            Arc::downgrade(&pool),
            Duration::from_millis(100),
            CancellationToken::new(),
        );
        drop(pool);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!recycler.is_running());
    }
}
