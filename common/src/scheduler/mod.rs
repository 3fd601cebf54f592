// Background scheduling: periodic host reachability polling

pub mod poller;

pub use poller::{DbPollerStore, HostStatusPoller, PollerStore};
