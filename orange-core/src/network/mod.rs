pub mod address;
pub mod link;
pub mod prober;
pub mod provision;

pub use address::{normalize, probe_url, server_name};
pub use link::{Link, LinkEvents, LinkFailure, Outbound};
pub use prober::{DEFAULT_PROBE_TIMEOUT, HttpProbe, Probe, Prober};
pub use provision::provision;
