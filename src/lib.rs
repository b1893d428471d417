/// Blob Exerciser - Client-Side Blob Storage Lifecycle Walkthrough
///
/// Drives a blob storage account through the full lifecycle of containers
/// and block, append and page blobs, checking every postcondition and
/// cleaning up after itself so runs are repeatable against a live account.
///
/// Architecture:
/// 1. StorageGateway: capability trait over the blob service (in-memory or Azure)
/// 2. NameGenerator: unique, recognisable resource names
/// 3. LifecycleScenario: one exercised behaviour with scoped teardown
/// 4. ScenarioRunner: sequential execution and the final RunReport
/// 5. Sweeper: removes containers a failed teardown left behind

pub mod config;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod names;
pub mod runner;
pub mod scenario;
pub mod sweep;

#[cfg(feature = "azure")]
pub mod azure;

pub use config::{connect, Backend, ExerciserConfig};
pub use error::{GatewayError, Result, ScenarioError};
pub use gateway::StorageGateway;
pub use memory::InMemoryGateway;
pub use names::NameGenerator;
pub use runner::{Outcome, RunReport, ScenarioRunner};
pub use scenario::{catalog, select, LifecycleScenario, ScenarioAborted, ScenarioReport, ScenarioSettings};
pub use sweep::{sweep_leaked, SweepReport};
