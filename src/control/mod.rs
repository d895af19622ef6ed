pub mod commands;
pub mod lock;
pub mod state;
pub mod supervisor;

pub use commands::{CommandError, ControlCommand, Controller, SupervisorCommand};
pub use lock::InstanceLock;
pub use state::{BotState, StatusSnapshot};
pub use supervisor::{ExitReason, HealthMonitor, HealthVerdict, Supervisor};
