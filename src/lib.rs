//! # Zeta4G Cluster
//!
//! A cluster-aware connection pool and read/write router for
//! [Zeta4G](https://github.com/zeta9044/zeta4g) graph database clusters.
//!
//! ## Features
//!
//! - **Topology Discovery** - Cluster membership and instance status from a pluggable control plane
//! - **Write Routing** - Every write goes to the single available writer
//! - **Weighted Read Routing** - Readers are preferred two to one over the writer
//! - **Read-Only Enforcement** - Reader connections reject mutating Cypher
//! - **Connection Recycling** - Topology is rebuilt on a fixed period without blocking callers
//! - **Graceful Shutdown** - Every connection is closed exactly once
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zeta4g_cluster::{ClusterConfig, ClusterPool, ControlPlane, GraphDriver, Query};
//!
//! async fn example(
//!     control_plane: Arc<dyn ControlPlane>,
//!     driver: Arc<dyn GraphDriver>,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClusterConfig::builder("graph-prod", "ap-northeast-2")
//!         .with_pool_size(4)
//!         .build()?;
//!
//!     let pool = ClusterPool::connect(config, control_plane, driver).await?;
//!
//!     // Writes go to the writer
//!     let writer = pool.get_write_connection()?;
//!     writer
//!         .run(Query::new("CREATE (n:Person {name: $name})").with_param("name", "Alice"))
//!         .await?;
//!
//!     // Reads prefer readers
//!     let reader = pool.get_read_connection()?;
//!     let result = reader.run("MATCH (n:Person) RETURN n.name AS name").await?;
//!     println!("{} rows", result.len());
//!
//!     pool.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! [`ClusterConfig::from_env`] reads the same settings from the process
//! environment:
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `CLUSTER_ID` | Cluster identifier | required |
//! | `CLUSTER_REGION` | Control plane region | required |
//! | `CLUSTER_POOL_SIZE` | Concurrent channels per instance | `1` |
//! | `CLUSTER_READ_FROM_WRITER` | Include the writer in read routing | `true` |
//! | `CLUSTER_RECYCLE_CONN_PERIOD_IN_MINUTES` | Recycle period | `5` |
//!
//! ## Error Handling
//!
//! All operations return [`ClusterResult`]:
//!
//! ```rust
//! use zeta4g_cluster::ClusterError;
//!
//! fn describe(err: &ClusterError) -> &'static str {
//!     match err {
//!         ClusterError::NoWriterAvailable => "degraded",
//!         ClusterError::PoolClosed => "closed",
//!         ClusterError::ReadOnlyViolation(_) => "client bug",
//!         _ => "other",
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cluster`] - Topology, routing, pooling and recycling

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cluster;

// Re-exports for convenience
pub use cluster::{
    AccessMode, ClusterConfig, ClusterConfigBuilder, ClusterError, ClusterPool, ClusterPoolMetrics,
    ClusterResult, ConnectionHandle, ControlPlane, GraphDatabase, GraphDriver, GraphSession,
    InMemoryControlPlane, InstanceRole, InstanceStatus, Query, QueryResult, ReadPolicy, Record,
    RefreshOutcome, ServerAddress, TopologySnapshot, Value,
};

/// Config alias for convenience
pub type Config = ClusterConfig;
