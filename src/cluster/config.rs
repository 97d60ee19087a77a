//! Cluster Configuration
//!
//! 클러스터 풀 설정 및 서버 주소

use std::fmt;
use std::time::Duration;

use super::error::{ClusterError, ClusterResult};

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

/// 기본 토폴로지 갱신 주기 (5분)
pub const DEFAULT_RECYCLE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// 최소 토폴로지 갱신 주기 (1분)
pub const MIN_RECYCLE_INTERVAL: Duration = Duration::from_secs(60);

/// 최대 갱신 주기
pub const MAX_RECYCLE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// 인스턴스 URL 생성
    ///
    /// `bolt://host:port/database` 또는 TLS 사용 시 `bolt+s://host:port/database`
    pub fn to_url(&self, use_tls: bool, database: &str) -> String {
        let scheme = if use_tls { "bolt+s" } else { "bolt" };
        format!("{}://{}:{}/{}", scheme, self.host, self.port, database)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ============================================================================
// ClusterConfig - 클러스터 설정
// ============================================================================

/// 클러스터 풀 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `pool_size` | 1 | 인스턴스당 동시 채널 수 |
/// | `port` | 7687 | 인스턴스 포트 |
/// | `database` | `zeta4g` | 데이터베이스 이름 |
/// | `use_tls` | true | `bolt+s://` 사용 |
/// | `read_from_writer` | true | 라이터도 읽기 대상에 포함 |
/// | `writer_weight` / `reader_weight` | 1 / 2 | 읽기 라우팅 가중치 |
/// | `recycle_interval` | 5분 | 토폴로지 갱신 및 연결 재생성 주기 |
/// | `concurrency_limit` | CPU × 5 | 세션당 동시 요청 한도 |
/// | `control_plane_timeout` | 10초 | 컨트롤 플레인 호출 타임아웃 |
/// | `connection_timeout` | 30초 | 연결 및 확인 쿼리 타임아웃 |
/// | `drain_timeout` | 60초 | 교체된 스냅샷의 연결을 닫기 전 최대 대기 |
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// 클러스터 식별자
    pub cluster_id: String,
    /// 리전
    pub region: String,
    /// 인스턴스당 풀 크기
    pub pool_size: usize,
    /// 인스턴스 포트
    pub port: u16,
    /// 데이터베이스 이름
    pub database: String,
    /// TLS 사용
    pub use_tls: bool,
    /// 라이터에서 읽기 허용
    pub read_from_writer: bool,
    /// 라이터 읽기 가중치
    pub writer_weight: u32,
    /// 리더 읽기 가중치
    pub reader_weight: u32,
    /// 갱신 주기
    pub recycle_interval: Duration,
    /// 세션당 동시 요청 한도
    pub concurrency_limit: usize,
    /// 컨트롤 플레인 타임아웃
    pub control_plane_timeout: Duration,
    /// 연결 타임아웃
    pub connection_timeout: Duration,
    /// 드레인 타임아웃
    pub drain_timeout: Duration,
}

impl ClusterConfig {
    /// 새 설정 생성
    pub fn new(cluster_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            region: region.into(),
            pool_size: 1,
            port: DEFAULT_PORT,
            database: "zeta4g".to_string(),
            use_tls: true,
            read_from_writer: true,
            writer_weight: 1,
            reader_weight: 2,
            recycle_interval: DEFAULT_RECYCLE_INTERVAL,
            concurrency_limit: default_concurrency_limit(),
            control_plane_timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(60),
        }
    }

    /// 빌더 시작
    pub fn builder(cluster_id: impl Into<String>, region: impl Into<String>) -> ClusterConfigBuilder {
        ClusterConfigBuilder {
            config: Self::new(cluster_id, region),
        }
    }

    /// 환경 변수에서 설정 로드
    ///
    /// | 변수 | 필수 |
    /// |------|------|
    /// | `CLUSTER_ID` | 예 |
    /// | `CLUSTER_REGION` | 예 |
    /// | `CLUSTER_POOL_SIZE` | 아니오 |
    /// | `CLUSTER_READ_FROM_WRITER` | 아니오 |
    /// | `CLUSTER_RECYCLE_CONN_PERIOD_IN_MINUTES` | 아니오 |
    pub fn from_env() -> ClusterResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정 로드
    pub fn from_lookup<F>(lookup: F) -> ClusterResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ClusterError::configuration(format!("{} is not set", key)))
        };

        let mut config = Self::new(required("CLUSTER_ID")?, required("CLUSTER_REGION")?);

        if let Some(raw) = lookup("CLUSTER_POOL_SIZE") {
            config.pool_size = parse_number("CLUSTER_POOL_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("CLUSTER_READ_FROM_WRITER") {
            config.read_from_writer = parse_bool("CLUSTER_READ_FROM_WRITER", &raw)?;
        }
        if let Some(raw) = lookup("CLUSTER_RECYCLE_CONN_PERIOD_IN_MINUTES") {
            let minutes: u64 = parse_number("CLUSTER_RECYCLE_CONN_PERIOD_IN_MINUTES", &raw)?;
            let seconds = minutes.checked_mul(60).ok_or_else(|| {
                ClusterError::configuration(format!(
                    "CLUSTER_RECYCLE_CONN_PERIOD_IN_MINUTES is out of range: {}",
                    raw
                ))
            })?;
            config.recycle_interval = Duration::from_secs(seconds);
        }

        config.validate()?;
        Ok(config)
    }

    /// 설정 검증
    pub fn validate(&self) -> ClusterResult<()> {
        if self.cluster_id.trim().is_empty() {
            return Err(ClusterError::configuration("Cluster identifier must not be empty"));
        }
        if self.pool_size < 1 {
            return Err(ClusterError::configuration("Pool size must be greater than 0"));
        }
        if self.concurrency_limit < 1 {
            return Err(ClusterError::configuration("Concurrency limit must be greater than 0"));
        }
        if self.recycle_interval < MIN_RECYCLE_INTERVAL {
            return Err(ClusterError::configuration(
                "Recycle interval must be at least one minute",
            ));
        }
        if self.recycle_interval > MAX_RECYCLE_INTERVAL {
            return Err(ClusterError::configuration(
                "Recycle interval must be at most 24 hours",
            ));
        }
        if self.writer_weight == 0 && self.reader_weight == 0 {
            return Err(ClusterError::configuration(
                "Writer and reader weights must not both be zero",
            ));
        }
        Ok(())
    }
}

/// 기본 동시 요청 한도 (CPU 수 × 5)
fn default_concurrency_limit() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 5
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> ClusterResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ClusterError::configuration(format!("{} is not a valid number: {}", key, raw)))
}

fn parse_bool(key: &str, raw: &str) -> ClusterResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ClusterError::configuration(format!(
            "{} is not a valid boolean: {}",
            key, raw
        ))),
    }
}

// ============================================================================
// ClusterConfigBuilder - 설정 빌더
// ============================================================================

/// 클러스터 설정 빌더
#[derive(Debug, Clone)]
pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    /// 인스턴스당 풀 크기 설정
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// 인스턴스 포트 설정
    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// 데이터베이스 이름 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// TLS 설정
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.config.use_tls = use_tls;
        self
    }

    /// 라이터 읽기 허용 설정
    pub fn with_read_from_writer(mut self, enabled: bool) -> Self {
        self.config.read_from_writer = enabled;
        self
    }

    /// 읽기 라우팅 가중치 설정
    pub fn with_weights(mut self, writer_weight: u32, reader_weight: u32) -> Self {
        self.config.writer_weight = writer_weight;
        self.config.reader_weight = reader_weight;
        self
    }

    /// 갱신 주기 설정 (분)
    ///
    /// 범위를 벗어난 값은 `build()`에서 거부됩니다.
    pub fn with_recycle_minutes(mut self, minutes: u64) -> Self {
        self.config.recycle_interval = Duration::from_secs(minutes.saturating_mul(60));
        self
    }

    /// 갱신 주기 설정
    pub fn with_recycle_interval(mut self, interval: Duration) -> Self {
        self.config.recycle_interval = interval;
        self
    }

    /// 동시 요청 한도 설정
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.config.concurrency_limit = limit;
        self
    }

    /// 컨트롤 플레인 타임아웃 설정
    pub fn with_control_plane_timeout(mut self, timeout: Duration) -> Self {
        self.config.control_plane_timeout = timeout;
        self
    }

    /// 연결 타임아웃 설정
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// 드레인 타임아웃 설정
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = timeout;
        self
    }

    /// 검증 후 빌드
    pub fn build(self) -> ClusterResult<ClusterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
