// Remote session client: SSH command execution and file transfer

pub mod session;

use crate::errors::SshError;
use crate::models::{Host, ProbeReport};
use async_trait::async_trait;
use std::time::Instant;

pub use session::SshSessionFactory;

/// Captured output of one remote command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandOutput {
    /// Stdout and stderr concatenated in capture order, the way operators
    /// expect to read a terminal transcript
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

/// One authenticated session against a single host.
///
/// A non-zero exit status surfaces as `SshError::RemoteCommand` with both
/// output streams attached, so callers never lose partial output on failure.
#[async_trait]
pub trait RemoteSession: Send {
    async fn run_command(&mut self, command: &str) -> Result<CommandOutput, SshError>;
    async fn upload_file(&mut self, data: &[u8], remote_path: &str) -> Result<(), SshError>;
    async fn download_file(&mut self, remote_path: &str) -> Result<Vec<u8>, SshError>;
    async fn close(&mut self) -> Result<(), SshError>;
}

/// Opens sessions from stored host records. The seam every orchestrator works
/// against, so tests can substitute a recording fake for the real transport.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, host: &Host) -> Result<Box<dyn RemoteSession>, SshError>;
}

/// Probe a host by running a trivial no-op command over a fresh session.
///
/// The timing window covers the full exec round-trip, and a host that
/// authenticates but cannot run commands reports as unreachable.
pub async fn probe_host(factory: &dyn SessionFactory, host: &Host) -> ProbeReport {
    let start = Instant::now();

    let mut session = match factory.open(host).await {
        Ok(session) => session,
        Err(e) => {
            return ProbeReport {
                success: false,
                message: e.to_string(),
                latency_ms: None,
            }
        }
    };

    let result = session.run_command("echo ok").await;
    let latency_ms = start.elapsed().as_millis() as u64;

    if let Err(e) = session.close().await {
        tracing::debug!(host = %host.name, error = %e, "Session close after probe failed");
    }

    match result {
        Ok(_) => ProbeReport {
            success: true,
            message: format!("Connection to {} succeeded", host.addr()),
            latency_ms: Some(latency_ms),
        },
        Err(e) => ProbeReport {
            success: false,
            message: e.to_string(),
            latency_ms: Some(latency_ms),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthMethod, HostStatus};
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    fn test_host() -> Host {
        Host {
            id: Uuid::new_v4(),
            name: "app-1".to_string(),
            address: "10.0.0.5".to_string(),
            port: 22,
            os: None,
            status: HostStatus::Unknown,
            description: None,
            tags: None,
            auth_method: AuthMethod::Password,
            username: "ops".to_string(),
            password: Some("pw".to_string()),
            private_key: None,
            passphrase: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct ProbeSession {
        fail_commands: bool,
        commands: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RemoteSession for ProbeSession {
        async fn run_command(&mut self, command: &str) -> Result<CommandOutput, SshError> {
            self.commands.lock().unwrap().push(command.to_string());
            if self.fail_commands {
                Err(SshError::Session("exec channel refused".to_string()))
            } else {
                Ok(CommandOutput {
                    stdout: "ok\n".to_string(),
                    stderr: String::new(),
                    exit_status: 0,
                })
            }
        }

        async fn upload_file(&mut self, _data: &[u8], _remote_path: &str) -> Result<(), SshError> {
            Ok(())
        }

        async fn download_file(&mut self, _remote_path: &str) -> Result<Vec<u8>, SshError> {
            Ok(Vec::new())
        }

        async fn close(&mut self) -> Result<(), SshError> {
            Ok(())
        }
    }

    struct ProbeFactory {
        fail_open: bool,
        fail_commands: bool,
        commands: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SessionFactory for ProbeFactory {
        async fn open(&self, host: &Host) -> Result<Box<dyn RemoteSession>, SshError> {
            if self.fail_open {
                return Err(SshError::Connection {
                    addr: host.addr(),
                    reason: "timed out".to_string(),
                });
            }
            Ok(Box::new(ProbeSession {
                fail_commands: self.fail_commands,
                commands: Arc::clone(&self.commands),
            }))
        }
    }

    #[test]
    fn test_combined_output_preserves_order() {
        let output = CommandOutput {
            stdout: "line1\n".to_string(),
            stderr: "warn1\n".to_string(),
            exit_status: 0,
        };
        assert_eq!(output.combined(), "line1\nwarn1\n");
    }

    #[tokio::test]
    async fn test_probe_runs_a_noop_command() {
        let factory = ProbeFactory {
            fail_open: false,
            fail_commands: false,
            commands: Arc::new(Mutex::new(Vec::new())),
        };

        let report = probe_host(&factory, &test_host()).await;

        assert!(report.success);
        assert!(report.latency_ms.is_some());
        assert_eq!(
            *factory.commands.lock().unwrap(),
            vec!["echo ok".to_string()]
        );
    }

    #[tokio::test]
    async fn test_probe_fails_when_exec_fails() {
        // Authentication succeeded but the host cannot run commands
        let factory = ProbeFactory {
            fail_open: false,
            fail_commands: true,
            commands: Arc::new(Mutex::new(Vec::new())),
        };

        let report = probe_host(&factory, &test_host()).await;

        assert!(!report.success);
        assert!(report.message.contains("exec channel refused"));
    }

    #[tokio::test]
    async fn test_probe_fails_when_open_fails() {
        let factory = ProbeFactory {
            fail_open: true,
            fail_commands: false,
            commands: Arc::new(Mutex::new(Vec::new())),
        };

        let report = probe_host(&factory, &test_host()).await;

        assert!(!report.success);
        assert_eq!(report.latency_ms, None);
    }
}
