pub mod latency;
pub mod regulator;
pub mod server;
pub mod session;

// Re-export commonly used types
pub use latency::LatencyTracker;
pub use regulator::{MemoryRegulator, RegulationPolicy, Regulator};
pub use session::{MemorySessionProvider, SessionProvider, UserSession};
