//! Saved package links: persistence, probing and concurrent refresh.

mod probe;
mod record;
mod registry;
mod store;

pub use probe::{HttpProber, Prober};
#[cfg(test)]
pub use probe::MockProber;
pub use record::{LinkRecord, Reachability};
pub use registry::LinkRegistry;
pub use store::LinkStore;
