pub mod garbage_collector;
pub mod intake;
pub mod maintenance;
pub mod poller;

pub use garbage_collector::GarbageCollector;
pub use intake::{SessionIntake, SharedSessionIntake};
pub use maintenance::Maintenance;
pub use poller::VerificationPoller;
