pub mod notifier;
pub mod pool_monitor;
#[cfg(feature = "telegram")]
pub mod telegram;

pub use notifier::{FanoutNotifier, LogNotifier, Notifier};
pub use pool_monitor::{PoolFeed, PoolMonitor};

#[cfg(feature = "telegram")]
pub use telegram::{AdminChat, TelegramNotifier};
