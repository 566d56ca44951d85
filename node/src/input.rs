//! Operator keys from stdin.

use statecast_core::ControlCommand;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Maps raw input bytes to commands, skipping unbound keys.
pub fn commands_from_bytes(bytes: &[u8]) -> impl Iterator<Item = ControlCommand> + '_ {
    bytes.iter().filter_map(|&b| {
        let key = b as char;
        let command = ControlCommand::from_key(key);
        if command.is_none() && key == '1' {
            debug!("key '1' is reserved");
        }
        command
    })
}

/// Reads stdin in the background and forwards commands to the render loop.
///
/// The loop drains the receiver with `try_recv` once per tick.
pub fn spawn_key_reader() -> mpsc::UnboundedReceiver<ControlCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 64];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    for command in commands_from_bytes(&buf[..n]) {
                        if tx.send(command).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("stdin closed: {}", e);
                    break;
                }
            }
        }
        debug!("key reader finished");
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        let commands: Vec<_> = commands_from_bytes(b"2 x1\n").collect();
        assert_eq!(commands, vec![ControlCommand::Reset, ControlCommand::ForceRegenerate]);
    }
}
