//! Custom Resource Definitions (CRDs) for postgres-operator.
//!
//! - `PostgresCluster`: Deploy and manage a PostgreSQL database cluster

mod postgres_cluster;

pub use postgres_cluster::*;
