//! Simulated-unreliability hooks for testing clients against a misbehaving
//! server: per-line packet loss and corruption at the write boundary, and an
//! out-of-band timer that force-drops a connection.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast;
use uuid::Uuid;

use shared::logger;

use crate::ServerCommand;
use crate::config::ServerConfig;

/// Outcome of passing one outgoing line through the fault policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAction {
    Deliver(String),
    Drop,
}

/// Strategy applied to every outgoing protocol line before it hits the wire.
/// Binary transfer frames bypass the policy; mangling those would desync the
/// recipient's stream instead of simulating a lossy link.
pub trait FaultPolicy: Send + Sync {
    fn on_line(&self, line: &str) -> WriteAction;
}

/// Default policy: every line goes out untouched.
pub struct NoFaults;

impl FaultPolicy for NoFaults {
    fn on_line(&self, line: &str) -> WriteAction {
        WriteAction::Deliver(line.to_string())
    }
}

/// Randomly drops about one line in six and corrupts about one in four,
/// depending on which toggles are set.
pub struct RandomFaults {
    drop_packets: bool,
    corrupt_packets: bool,
}

impl RandomFaults {
    pub fn new(drop_packets: bool, corrupt_packets: bool) -> Self {
        RandomFaults {
            drop_packets,
            corrupt_packets,
        }
    }
}

impl FaultPolicy for RandomFaults {
    fn on_line(&self, line: &str) -> WriteAction {
        let mut rng = rand::thread_rng();
        if self.drop_packets && rng.gen_range(0..6) == 0 {
            return WriteAction::Drop;
        }
        if self.corrupt_packets && rng.gen_range(0..4) == 0 {
            let corrupted = corrupt(line, &mut rng);
            logger::log_warning(&format!("[CORRUPT] {}", corrupted));
            return WriteAction::Deliver(corrupted);
        }
        WriteAction::Deliver(line.to_string())
    }
}

/// Overwrites characters with `X` at random strides, starting near the front
/// of the line.
fn corrupt<R: Rng>(line: &str, rng: &mut R) -> String {
    let mut chars: Vec<char> = line.chars().collect();
    let mut index = rng.gen_range(0..4);
    while index < chars.len() {
        chars[index] = 'X';
        index += rng.gen_range(1..10);
    }
    chars.into_iter().collect()
}

pub fn policy_from_config(config: &ServerConfig) -> Arc<dyn FaultPolicy> {
    if config.simulate_dropped_packets || config.simulate_corrupted_packets {
        Arc::new(RandomFaults::new(
            config.simulate_dropped_packets,
            config.simulate_corrupted_packets,
        ))
    } else {
        Arc::new(NoFaults)
    }
}

/// Sleeps 10 to 20 seconds, then force-terminates the session through the
/// same command channel an admin kick uses.
pub fn spawn_connection_drop(commands: broadcast::Sender<ServerCommand>, session: Uuid) {
    tokio::spawn(async move {
        let delay = {
            let mut rng = rand::thread_rng();
            rng.gen_range(10..=20)
        };
        tokio::time::sleep(Duration::from_secs(delay)).await;
        let _ = commands.send(ServerCommand::Kick { session });
    });
}
