//! Cluster Module
//!
//! 클러스터 인식 연결 풀과 읽기/쓰기 라우터
//!
//! # 구성
//!
//! - 컨트롤 플레인 조회 (ControlPlane, TopologyClient)
//! - 인스턴스 연결 (GraphDriver, InstanceConnector, ConnectionHandle)
//! - 토폴로지 스냅샷 (TopologySnapshot)
//! - 읽기 라우팅 정책 (ReadPolicy, ReplicaSelector)
//! - 클러스터 풀 (ClusterPool, GraphDatabase)
//! - 주기적 갱신 (Recycler)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zeta4g_cluster::cluster::{ClusterConfig, ClusterPool, GraphDatabase, Query};
//!
//! let config = ClusterConfig::from_env()?;
//! let pool = ClusterPool::connect(config, control_plane, driver).await?;
//!
//! // 쓰기는 라이터로
//! let writer = pool.get_write_connection()?;
//! writer
//!     .run(Query::new("CREATE (n:Person {name: $name})").with_params(params! {"name" => "Alice"}))
//!     .await?;
//!
//! // 읽기는 리더 우선 가중 랜덤
//! let reader = pool.get_read_connection()?;
//! let result = reader.run("MATCH (n:Person) RETURN n.name AS name").await?;
//!
//! pool.close().await?;
//! ```

mod config;
mod connection;
mod control_plane;
mod error;
mod policy;
mod pool;
mod query;
mod recycler;
mod snapshot;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::{
    ClusterConfig, ClusterConfigBuilder, ServerAddress, DEFAULT_PORT, DEFAULT_RECYCLE_INTERVAL,
    MAX_RECYCLE_INTERVAL, MIN_RECYCLE_INTERVAL,
};
pub use connection::{
    ConnectionHandle, GraphConnection, GraphDriver, GraphSession, InstanceConnector,
    ReadOnlyConnection, LIVENESS_QUERY,
};
pub use control_plane::{
    ClusterDescription, ClusterMember, ClusterMemberRecord, ControlPlane, InMemoryControlPlane,
    InstanceDescription, InstanceRecord, InstanceRole, InstanceStatus, TopologyClient,
};
pub use error::{ClusterError, ClusterResult};
pub use policy::{ReadPolicy, ReplicaSelector, WeightedTable};
pub use pool::{ClusterPool, ClusterPoolMetrics, GraphDatabase, RefreshOutcome};
pub use query::{AccessMode, Query, QueryResult, Record, Value};
pub use recycler::Recycler;
pub use snapshot::{Instance, TopologySnapshot};

/// 쿼리 파라미터 맵 생성 매크로
#[macro_export]
macro_rules! params {
    () => {
        std::collections::HashMap::<String, $crate::cluster::Value>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = std::collections::HashMap::<String, $crate::cluster::Value>::new();
        $(
            map.insert($key.into(), $crate::cluster::Value::from($value));
        )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_macro() {
        let empty = params!();
        assert!(empty.is_empty());

        let query = Query::new("CREATE (n:Person {name: $name, age: $age})")
            .with_params(params! {"name" => "Alice", "age" => 30i64});
        assert_eq!(query.parameters.len(), 2);
        assert_eq!(query.parameters["name"].as_str(), Some("Alice"));
        assert_eq!(query.parameters["age"].as_int(), Some(30));
        assert!(query.is_mutating());
    }
}
