//! Control Plane / Topology Client
//!
//! 컨트롤 플레인 API에서 클러스터 멤버십과 인스턴스 상태를 조회합니다.
//!
//! [`ControlPlane`]은 외부 API 경계이고, [`TopologyClient`]는 그 응답을
//! 검증하여 라우팅에 필요한 형태([`ClusterMember`], [`InstanceDescription`])로
//! 변환합니다. 모든 호출은 타임아웃을 가집니다.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::config::ServerAddress;
use super::error::{ClusterError, ClusterResult};

// ============================================================================
// InstanceRole / InstanceStatus
// ============================================================================

/// 인스턴스 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceRole {
    /// 쓰기 가능한 단일 인스턴스
    Writer,
    /// 읽기 전용 복제본
    Reader,
}

impl InstanceRole {
    /// 컨트롤 플레인의 writer 플래그에서 변환
    pub fn from_writer_flag(is_writer: bool) -> Self {
        if is_writer {
            Self::Writer
        } else {
            Self::Reader
        }
    }

    /// 역할을 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Writer => "WRITER",
            Self::Reader => "READER",
        }
    }
}

/// 인스턴스 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceStatus {
    /// 생성 또는 구성 중
    Provisioning,
    /// 사용 가능
    Available,
    /// 사용 불가
    Unavailable,
}

impl InstanceStatus {
    /// 컨트롤 플레인 상태 문자열에서 변환
    pub fn from_control_plane(status: &str) -> Self {
        let status = status.trim().to_ascii_lowercase();
        match status.as_str() {
            "available" => Self::Available,
            "creating" | "starting" | "backing-up" | "modifying" | "upgrading" | "renaming"
            | "rebooting" | "maintenance" => Self::Provisioning,
            s if s.starts_with("configuring-") => Self::Provisioning,
            _ => Self::Unavailable,
        }
    }
}

// ============================================================================
// Control plane records
// ============================================================================

/// 클러스터 멤버 레코드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterMemberRecord {
    /// 인스턴스 식별자
    pub identifier: String,
    /// 라이터 여부
    pub is_writer: bool,
}

/// 클러스터 조회 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDescription {
    /// 클러스터 식별자
    pub cluster_id: String,
    /// 멤버 목록
    pub members: Vec<ClusterMemberRecord>,
}

/// 인스턴스 조회 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    /// 인스턴스 식별자
    pub identifier: String,
    /// 소속 클러스터
    pub cluster_id: String,
    /// 상태 문자열 (`available`, `creating`, ...)
    pub status: String,
    /// 엔드포인트 호스트 (프로비저닝 완료 후에만 존재)
    pub endpoint_address: Option<String>,
}

/// 컨트롤 플레인 API
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// 클러스터 조회
    async fn describe_cluster(&self, cluster_id: &str) -> ClusterResult<Vec<ClusterDescription>>;

    /// 클러스터 필터를 적용한 인스턴스 조회
    async fn describe_instances(
        &self,
        identifier: &str,
        cluster_filter: &str,
    ) -> ClusterResult<Vec<InstanceRecord>>;
}

// ============================================================================
// TopologyClient - 토폴로지 조회
// ============================================================================

/// 클러스터 멤버
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterMember {
    /// 인스턴스 식별자
    pub identifier: String,
    /// 역할
    pub role: InstanceRole,
}

/// 인스턴스 상태 및 엔드포인트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDescription {
    /// 상태
    pub status: InstanceStatus,
    /// 엔드포인트
    pub endpoint: Option<ServerAddress>,
}

impl InstanceDescription {
    /// 사용 불가 인스턴스
    pub fn unavailable() -> Self {
        Self {
            status: InstanceStatus::Unavailable,
            endpoint: None,
        }
    }

    /// 연결 가능한 엔드포인트 (Available 상태일 때만)
    pub fn available_endpoint(&self) -> Option<&ServerAddress> {
        match self.status {
            InstanceStatus::Available => self.endpoint.as_ref(),
            _ => None,
        }
    }
}

/// 토폴로지 클라이언트
///
/// 상태를 보관하지 않는 읽기 전용 협력자입니다.
#[derive(Clone)]
pub struct TopologyClient {
    control_plane: Arc<dyn ControlPlane>,
    port: u16,
    timeout: Duration,
}

impl TopologyClient {
    /// 새 토폴로지 클라이언트 생성
    pub fn new(control_plane: Arc<dyn ControlPlane>, port: u16, timeout: Duration) -> Self {
        Self {
            control_plane,
            port,
            timeout,
        }
    }

    /// 클러스터 멤버 목록 조회 (컨트롤 플레인 순서 유지)
    pub async fn list_members(&self, cluster_id: &str) -> ClusterResult<Vec<ClusterMember>> {
        let clusters = self
            .with_timeout("describe_cluster", self.control_plane.describe_cluster(cluster_id))
            .await?;

        let cluster = clusters
            .into_iter()
            .next()
            .ok_or_else(|| ClusterError::no_cluster_found(cluster_id))?;

        if cluster.members.is_empty() {
            return Err(ClusterError::no_cluster_members(cluster_id));
        }

        Ok(cluster
            .members
            .into_iter()
            .map(|m| ClusterMember {
                identifier: m.identifier,
                role: InstanceRole::from_writer_flag(m.is_writer),
            })
            .collect())
    }

    /// 인스턴스 상태 조회
    pub async fn describe_instance(
        &self,
        cluster_id: &str,
        identifier: &str,
    ) -> ClusterResult<InstanceDescription> {
        let mut records = self
            .with_timeout(
                "describe_instances",
                self.control_plane.describe_instances(identifier, cluster_id),
            )
            .await?;

        if records.len() > 1 {
            return Err(ClusterError::InstanceLookupAmbiguous {
                identifier: identifier.to_string(),
                count: records.len(),
            });
        }

        let Some(record) = records.pop() else {
            return Ok(InstanceDescription::unavailable());
        };

        let status = InstanceStatus::from_control_plane(&record.status);
        let endpoint = record
            .endpoint_address
            .filter(|host| !host.is_empty())
            .map(|host| ServerAddress::new(host, self.port));

        // 엔드포인트가 아직 없으면 프로비저닝이 끝나지 않은 것으로 간주
        let status = match (status, &endpoint) {
            (InstanceStatus::Available, None) => InstanceStatus::Provisioning,
            (status, _) => status,
        };

        Ok(InstanceDescription { status, endpoint })
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = ClusterResult<T>>,
    ) -> ClusterResult<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                ClusterError::timeout(format!("{} exceeded {:?}", operation, self.timeout))
            })?
    }
}

impl std::fmt::Debug for TopologyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyClient")
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// InMemoryControlPlane - 인메모리 컨트롤 플레인
// ============================================================================

/// 인메모리 컨트롤 플레인
///
/// 로컬 개발과 테스트용입니다. 레코드를 실행 중에 바꿀 수 있고,
/// 지연과 장애를 주입할 수 있습니다.
#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    clusters: RwLock<HashMap<String, ClusterDescription>>,
    instances: RwLock<HashMap<String, Vec<InstanceRecord>>>,
    latencies: RwLock<HashMap<String, Duration>>,
    cluster_failure: RwLock<Option<String>>,
    describe_cluster_calls: AtomicUsize,
}

impl InMemoryControlPlane {
    /// 빈 컨트롤 플레인 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 클러스터 멤버 설정 (`(identifier, is_writer)` 순서 유지)
    pub fn set_members(&self, cluster_id: &str, members: &[(&str, bool)]) {
        let description = ClusterDescription {
            cluster_id: cluster_id.to_string(),
            members: members
                .iter()
                .map(|(identifier, is_writer)| ClusterMemberRecord {
                    identifier: identifier.to_string(),
                    is_writer: *is_writer,
                })
                .collect(),
        };
        self.clusters.write().insert(cluster_id.to_string(), description);
    }

    /// 클러스터 제거
    pub fn remove_cluster(&self, cluster_id: &str) {
        self.clusters.write().remove(cluster_id);
    }

    /// 인스턴스 레코드 설정 (기존 레코드 대체)
    pub fn set_instance(&self, cluster_id: &str, identifier: &str, status: &str, endpoint: Option<&str>) {
        let record = InstanceRecord {
            identifier: identifier.to_string(),
            cluster_id: cluster_id.to_string(),
            status: status.to_string(),
            endpoint_address: endpoint.map(str::to_string),
        };
        self.instances.write().insert(identifier.to_string(), vec![record]);
    }

    /// 인스턴스 레코드 추가 (중복 레코드 시뮬레이션용)
    pub fn push_instance_record(&self, record: InstanceRecord) {
        self.instances
            .write()
            .entry(record.identifier.clone())
            .or_default()
            .push(record);
    }

    /// 인스턴스 레코드 제거
    pub fn remove_instance(&self, identifier: &str) {
        self.instances.write().remove(identifier);
    }

    /// 클러스터 또는 인스턴스 식별자별 응답 지연 설정
    pub fn set_latency(&self, key: &str, latency: Duration) {
        self.latencies.write().insert(key.to_string(), latency);
    }

    /// 클러스터 조회 장애 주입 (`None`이면 해제)
    pub fn fail_cluster_lookups(&self, message: Option<&str>) {
        *self.cluster_failure.write() = message.map(str::to_string);
    }

    /// 클러스터 조회 호출 횟수
    pub fn describe_cluster_calls(&self) -> usize {
        self.describe_cluster_calls.load(Ordering::Relaxed)
    }

    async fn simulate_latency(&self, key: &str) {
        let latency = self.latencies.read().get(key).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn describe_cluster(&self, cluster_id: &str) -> ClusterResult<Vec<ClusterDescription>> {
        self.describe_cluster_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency(cluster_id).await;

        let failure = self.cluster_failure.read().clone();
        if let Some(message) = failure {
            return Err(ClusterError::control_plane(message));
        }

        Ok(self.clusters.read().get(cluster_id).cloned().into_iter().collect())
    }

    async fn describe_instances(
        &self,
        identifier: &str,
        cluster_filter: &str,
    ) -> ClusterResult<Vec<InstanceRecord>> {
        self.simulate_latency(identifier).await;

        Ok(self
            .instances
            .read()
            .get(identifier)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.cluster_id == cluster_filter)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
