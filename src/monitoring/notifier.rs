use async_trait::async_trait;
use log::info;
use std::sync::Arc;

/// Where operator-facing messages (trades, restarts, alerts) go
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        info!("[notify] {}", message);
    }
}

/// Sends every message to each inner notifier in turn
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Arc<dyn Notifier>>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, message: &str) {
        for target in &self.targets {
            target.notify(message).await;
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Collects messages for assertions
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, message: &str) {
            self.messages.lock().push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;

    #[tokio::test]
    async fn fanout_reaches_every_target() {
        let a = Arc::new(RecordingNotifier::default());
        let b = Arc::new(RecordingNotifier::default());
        let fanout = FanoutNotifier::new(vec![a.clone(), b.clone(), Arc::new(LogNotifier)]);

        fanout.notify("bought").await;
        assert_eq!(a.messages.lock().as_slice(), ["bought".to_string()]);
        assert_eq!(b.messages.lock().len(), 1);
    }
}
