// Repository layer: one repository per aggregate

pub mod distribution;
pub mod execution;
pub mod file;
pub mod host;
pub mod job;
pub mod script;
pub mod topology;
pub mod user;

pub use distribution::DistributionRepository;
pub use execution::{ExecutionFilter, ExecutionRepository};
pub use file::FileRepository;
pub use host::HostRepository;
pub use job::JobRepository;
pub use script::ScriptRepository;
pub use topology::TopologyRepository;
pub use user::UserRepository;
