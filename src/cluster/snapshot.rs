//! Topology Snapshot
//!
//! 특정 시점의 클러스터 토폴로지와 연결을 담는 불변 값

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::ServerAddress;
use super::connection::ConnectionHandle;
use super::control_plane::InstanceRole;

/// 스냅샷에 포함된 인스턴스 (Available + 연결 완료)
#[derive(Debug, Clone)]
pub struct Instance {
    /// 인스턴스 식별자
    pub identifier: String,
    /// 역할
    pub role: InstanceRole,
    /// 엔드포인트
    pub endpoint: ServerAddress,
    /// 연결 핸들
    pub connection: ConnectionHandle,
}

/// 토폴로지 스냅샷
///
/// 생성 후 변경되지 않으며, 풀은 스냅샷 전체를 원자적으로 교체합니다.
/// 리더 순서는 컨트롤 플레인의 멤버 순서를 따릅니다.
#[derive(Debug)]
pub struct TopologySnapshot {
    /// 세대 번호
    generation: u64,
    /// 식별자별 인스턴스
    instances: HashMap<String, Instance>,
    /// 라이터 식별자
    writer: Option<String>,
    /// 리더 식별자 (멤버 순서)
    readers: Vec<String>,
    /// 생성 시간
    created_at: Instant,
}

impl TopologySnapshot {
    /// 빈 스냅샷
    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            instances: HashMap::new(),
            writer: None,
            readers: Vec::new(),
            created_at: Instant::now(),
        }
    }

    /// 인스턴스 목록으로 스냅샷 생성
    ///
    /// 라이터는 최대 하나만 채택되고, 채택되지 않은 라이터와 중복 식별자는
    /// 두 번째 반환값으로 돌려줍니다. 호출자가 해당 연결을 닫아야 합니다.
    pub fn build(generation: u64, instances: Vec<Instance>) -> (Self, Vec<Instance>) {
        let mut snapshot = Self::empty(generation);
        let mut rejected = Vec::new();

        for instance in instances {
            if snapshot.instances.contains_key(&instance.identifier) {
                rejected.push(instance);
                continue;
            }

            match instance.role {
                InstanceRole::Writer if snapshot.writer.is_some() => {
                    rejected.push(instance);
                    continue;
                }
                InstanceRole::Writer => snapshot.writer = Some(instance.identifier.clone()),
                InstanceRole::Reader => snapshot.readers.push(instance.identifier.clone()),
            }

            snapshot.instances.insert(instance.identifier.clone(), instance);
        }

        (snapshot, rejected)
    }

    /// 세대 번호
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 생성 후 경과 시간
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// 인스턴스 조회
    pub fn get(&self, identifier: &str) -> Option<&Instance> {
        self.instances.get(identifier)
    }

    /// 라이터 식별자
    pub fn writer_identifier(&self) -> Option<&str> {
        self.writer.as_deref()
    }

    /// 라이터 인스턴스
    pub fn writer(&self) -> Option<&Instance> {
        self.writer.as_deref().and_then(|id| self.instances.get(id))
    }

    /// 리더 식별자
    pub fn reader_identifiers(&self) -> &[String] {
        &self.readers
    }

    /// 리더 인스턴스
    pub fn readers(&self) -> impl Iterator<Item = &Instance> {
        self.readers.iter().filter_map(|id| self.instances.get(id))
    }

    /// 인스턴스 수
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// 빈 스냅샷 여부
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// 라이터가 없는 성능 저하 상태
    pub fn is_degraded(&self) -> bool {
        self.writer.is_none()
    }

    /// 모든 연결
    pub fn connections(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.instances.values().map(|i| &i.connection)
    }

    /// 스냅샷 외부에서 참조 중인 연결이 없는지 확인
    pub fn is_quiescent(&self) -> bool {
        self.connections()
            .all(|handle| Arc::strong_count(handle.connection()) == 1)
    }
}
