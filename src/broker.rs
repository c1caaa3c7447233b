//! Managed-broker boundary. The core never relies on the broker's retry or
//! durability behaviour; a failed send is reported and nothing is rolled back.

use tracing::{debug, warn};

use crate::error::BrokerError;
use crate::types::Task;

pub trait BrokerSender: Send + Sync {
    /// Send `task` to `destination`; `Ok(false)` means the broker declined it.
    fn send(&self, destination: &str, task: &Task) -> Result<bool, BrokerError>;
}

pub fn forward(
    broker: &dyn BrokerSender,
    destination: &str,
    task: &Task,
) -> Result<(), BrokerError> {
    match broker.send(destination, task) {
        Ok(true) => {
            debug!(destination, task = task.id, "task forwarded");
            Ok(())
        }
        Ok(false) => {
            warn!(destination, task = task.id, "broker rejected task");
            Err(BrokerError::Rejected {
                destination: destination.to_string(),
            })
        }
        Err(err) => {
            warn!(destination, task = task.id, error = %err, "broker send failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Accepts everything except destinations listed in `refuse`.
    #[derive(Default)]
    struct MemoryBroker {
        refuse: Vec<String>,
        sent: Mutex<HashMap<String, Vec<String>>>,
    }

    impl BrokerSender for MemoryBroker {
        fn send(&self, destination: &str, task: &Task) -> Result<bool, BrokerError> {
            if destination.is_empty() {
                return Err(BrokerError::Send("empty destination".into()));
            }
            if self.refuse.iter().any(|d| d == destination) {
                return Ok(false);
            }
            let body = serde_json::to_string(task).map_err(|e| BrokerError::Send(e.to_string()))?;
            self.sent
                .lock()
                .expect("broker mutex poisoned")
                .entry(destination.to_string())
                .or_default()
                .push(body);
            Ok(true)
        }
    }

    #[test]
    fn forwards_serialized_task() {
        let broker = MemoryBroker::default();
        forward(&broker, "orders-out", &Task::new(3, "Email 3 from producer 1"))
            .expect("forward");
        let sent = broker.sent.lock().expect("broker mutex poisoned");
        let bodies = sent.get("orders-out").expect("destination");
        let task: Task = serde_json::from_str(&bodies[0]).expect("task json");
        assert_eq!(task.id, 3);
    }

    #[test]
    fn declined_and_failed_sends_are_errors() {
        let broker = MemoryBroker {
            refuse: vec!["closed".into()],
            ..MemoryBroker::default()
        };
        let task = Task::new(1, "x");
        assert!(matches!(
            forward(&broker, "closed", &task),
            Err(BrokerError::Rejected { .. })
        ));
        assert!(matches!(
            forward(&broker, "", &task),
            Err(BrokerError::Send(_))
        ));
    }
}
