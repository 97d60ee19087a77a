//! Cluster Error Types
//!
//! 클러스터 풀 에러 정의

use thiserror::Error;

// ============================================================================
// ClusterError - 클러스터 에러
// ============================================================================

/// 클러스터 풀 에러
#[derive(Error, Debug)]
pub enum ClusterError {
    /// 컨트롤 플레인에 클러스터가 없음
    #[error("No cluster found: {0}")]
    NoClusterFound(String),

    /// 클러스터에 멤버가 없음
    #[error("No cluster members found: {0}")]
    NoClusterMembers(String),

    /// 하나의 식별자에 여러 인스턴스 레코드가 반환됨
    #[error("More than one instance found for {identifier} ({count} records)")]
    InstanceLookupAmbiguous { identifier: String, count: usize },

    /// 연결 확인 쿼리 실패
    #[error("Connection unhealthy: {address} - {reason}")]
    ConnectionUnhealthy { address: String, reason: String },

    /// 사용 가능한 라이터 없음
    #[error("No writer instance available")]
    NoWriterAvailable,

    /// 읽기 전용 연결에서 변경 쿼리 시도
    #[error("Read-only violation: mutating query rejected on {0}")]
    ReadOnlyViolation(String),

    /// 풀이 닫힘
    #[error("Cluster pool is closed")]
    PoolClosed,

    /// 토폴로지 갱신 실패
    #[error("Topology refresh failed: {0}")]
    TopologyRefreshFailed(#[source] Box<ClusterError>),

    /// 이미 닫힌 연결
    #[error("Connection already closed: {0}")]
    AlreadyClosed(String),

    /// 닫힌 연결에서 쿼리 실행
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// 연결 에러
    #[error("Connection error: {0}")]
    Connection(String),

    /// 컨트롤 플레인 에러
    #[error("Control plane error: {0}")]
    ControlPlane(String),

    /// 쿼리 에러
    #[error("Query error: {code} - {message}")]
    Query { code: String, message: String },

    /// 타임아웃 에러
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClusterError {
    /// 클러스터 없음 에러 생성
    pub fn no_cluster_found(cluster_id: impl Into<String>) -> Self {
        Self::NoClusterFound(cluster_id.into())
    }

    /// 멤버 없음 에러 생성
    pub fn no_cluster_members(cluster_id: impl Into<String>) -> Self {
        Self::NoClusterMembers(cluster_id.into())
    }

    /// 비정상 연결 에러 생성
    pub fn unhealthy(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionUnhealthy {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// 연결 에러 생성
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// 컨트롤 플레인 에러 생성
    pub fn control_plane(msg: impl Into<String>) -> Self {
        Self::ControlPlane(msg.into())
    }

    /// 쿼리 에러 생성
    pub fn query(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 타임아웃 에러 생성
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 갱신 실패로 감싸기
    pub fn refresh_failed(cause: ClusterError) -> Self {
        Self::TopologyRefreshFailed(Box::new(cause))
    }

    /// 재시도 가능 여부
    ///
    /// 토폴로지가 바뀌는 중에 발생하는 에러는 다음 갱신 이후 성공할 수 있습니다.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_)
            | Self::ConnectionUnhealthy { .. }
            | Self::ConnectionClosed(_)
            | Self::ControlPlane(_)
            | Self::Timeout(_)
            | Self::NoWriterAvailable => true,
            Self::TopologyRefreshFailed(cause) => cause.is_retryable(),
            _ => false,
        }
    }

    /// 클라이언트 에러 여부
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ReadOnlyViolation(_) | Self::Configuration(_) | Self::Query { .. }
        )
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 클러스터 결과 타입
pub type ClusterResult<T> = Result<T, ClusterError>;

// ============================================================================
// Tests
// ============================================================================
