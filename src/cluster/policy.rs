//! 읽기 라우팅 정책
//!
//! 리더 복제본을 우선하는 가중 랜덤 선택

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::ClusterConfig;

// ============================================================================
// ReadPolicy - 읽기 정책
// ============================================================================

/// 읽기 라우팅 정책
///
/// 기본값에서 각 리더는 라이터보다 두 배 자주 선택됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    /// 라이터도 읽기 대상에 포함
    pub read_from_writer: bool,
    /// 라이터 가중치
    pub writer_weight: u32,
    /// 리더별 가중치
    pub reader_weight: u32,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            read_from_writer: true,
            writer_weight: 1,
            reader_weight: 2,
        }
    }
}

impl ReadPolicy {
    /// 설정에서 정책 생성
    pub fn from_config(config: &ClusterConfig) -> Self {
        Self {
            read_from_writer: config.read_from_writer,
            writer_weight: config.writer_weight,
            reader_weight: config.reader_weight,
        }
    }

    /// 리더만 사용하는 정책
    pub fn readers_only() -> Self {
        Self {
            read_from_writer: false,
            ..Self::default()
        }
    }
}

// ============================================================================
// WeightedTable - 누적 가중치 테이블
// ============================================================================

/// 누적 가중치 테이블
///
/// `[0, total)` 범위의 값 하나로 항목을 선택합니다.
#[derive(Debug, Default)]
pub struct WeightedTable<'a> {
    entries: Vec<(&'a str, u64)>,
    total: u64,
}

impl<'a> WeightedTable<'a> {
    /// 빈 테이블 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 항목 추가 (가중치 0은 무시)
    pub fn push(&mut self, identifier: &'a str, weight: u32) {
        if weight == 0 {
            return;
        }
        self.total += u64::from(weight);
        self.entries.push((identifier, self.total));
    }

    /// 전체 가중치
    pub fn total(&self) -> u64 {
        self.total
    }

    /// 값으로 항목 선택
    pub fn pick(&self, draw: u64) -> Option<&'a str> {
        if draw >= self.total {
            return None;
        }
        let index = self.entries.partition_point(|(_, cumulative)| *cumulative <= draw);
        self.entries.get(index).map(|(identifier, _)| *identifier)
    }
}

// ============================================================================
// ReplicaSelector - 읽기 대상 선택기
// ============================================================================

/// 난수 소스
enum RandomSource {
    /// 스레드 로컬 RNG
    Thread,
    /// 시드 고정 RNG (재현 가능한 선택)
    Seeded(Mutex<StdRng>),
}

impl RandomSource {
    fn draw(&self, upper: u64) -> u64 {
        match self {
            Self::Thread => rand::thread_rng().gen_range(0..upper),
            Self::Seeded(rng) => rng.lock().gen_range(0..upper),
        }
    }
}

/// 읽기 대상 선택기
pub struct ReplicaSelector {
    /// 읽기 정책
    policy: ReadPolicy,
    /// 난수 소스
    source: RandomSource,
}

impl ReplicaSelector {
    /// 새 선택기 생성
    pub fn new(policy: ReadPolicy) -> Self {
        Self {
            policy,
            source: RandomSource::Thread,
        }
    }

    /// 시드를 고정한 선택기 생성
    pub fn with_seed(policy: ReadPolicy, seed: u64) -> Self {
        Self {
            policy,
            source: RandomSource::Seeded(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// 현재 정책 조회
    pub fn policy(&self) -> ReadPolicy {
        self.policy
    }

    /// 읽기 대상 선택
    ///
    /// 1. 리더가 없으면 라이터
    /// 2. 라이터 읽기가 꺼져 있으면 리더 중 균등 선택
    /// 3. 그 외에는 라이터와 리더 전체에 대한 가중 선택
    pub fn select<'a>(&self, writer: Option<&'a str>, readers: &'a [String]) -> Option<&'a str> {
        if readers.is_empty() {
            return writer;
        }

        if !self.policy.read_from_writer {
            return self.uniform(readers);
        }

        let mut table = WeightedTable::new();
        if let Some(writer) = writer {
            table.push(writer, self.policy.writer_weight);
        }
        for reader in readers {
            table.push(reader, self.policy.reader_weight);
        }

        if table.total() == 0 {
            return self.uniform(readers);
        }

        table.pick(self.source.draw(table.total()))
    }

    fn uniform<'a>(&self, readers: &'a [String]) -> Option<&'a str> {
        let index = self.source.draw(readers.len() as u64) as usize;
        readers.get(index).map(String::as_str)
    }
}

impl Default for ReplicaSelector {
    fn default() -> Self {
        Self::new(ReadPolicy::default())
    }
}

impl std::fmt::Debug for ReplicaSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaSelector")
            .field("policy", &self.policy)
            .field("seeded", &matches!(self.source, RandomSource::Seeded(_)))
            .finish()
    }
}
