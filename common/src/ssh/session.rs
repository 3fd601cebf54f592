// ssh2-backed session implementation

use crate::errors::SshError;
use crate::models::{AuthMethod, Host};
use crate::ssh::{CommandOutput, RemoteSession, SessionFactory};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use ssh2::Session;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Opens real SSH sessions with ssh2.
///
/// Host keys are not verified: targets are operator-registered hosts on
/// private networks, matching the trust model of the stored credentials.
pub struct SshSessionFactory {
    connect_timeout: Duration,
}

impl SshSessionFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl SessionFactory for SshSessionFactory {
    #[instrument(skip(self, host), fields(host = %host.name, addr = %host.addr()))]
    async fn open(&self, host: &Host) -> Result<Box<dyn RemoteSession>, SshError> {
        // Credential gaps fail before any network traffic
        if let Some(gap) = host.credential_gap() {
            return Err(SshError::Configuration(gap.to_string()));
        }

        let addr = host
            .addr()
            .to_socket_addrs()
            .map_err(|e| SshError::Connection {
                addr: host.addr(),
                reason: format!("Address resolution failed: {}", e),
            })?
            .next()
            .ok_or_else(|| SshError::Connection {
                addr: host.addr(),
                reason: "Address resolved to nothing".to_string(),
            })?;

        debug!(timeout_seconds = self.connect_timeout.as_secs(), "Connecting");

        let tcp = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            error!(error = %e, "Failed to connect");
            SshError::Connection {
                addr: host.addr(),
                reason: e.to_string(),
            }
        })?;

        let timeout = Some(self.connect_timeout);
        tcp.set_read_timeout(timeout)
            .map_err(|e| SshError::Session(format!("Failed to set read timeout: {}", e)))?;
        tcp.set_write_timeout(timeout)
            .map_err(|e| SshError::Session(format!("Failed to set write timeout: {}", e)))?;

        let mut sess = Session::new()
            .map_err(|e| SshError::Session(format!("Failed to create SSH session: {}", e)))?;
        sess.set_tcp_stream(tcp);

        sess.handshake().map_err(|e| {
            error!(error = %e, "SSH handshake failed");
            SshError::Session(format!("SSH handshake failed: {}", e))
        })?;

        // The key is not verified against a known-hosts store, but its
        // fingerprint is logged so unexpected changes are auditable
        if let Some((key, _)) = sess.host_key() {
            debug!(fingerprint = %hex::encode(Sha256::digest(key)), "Host key observed");
        }

        authenticate(&sess, host)?;

        if !sess.authenticated() {
            error!("Authentication failed - session not authenticated");
            return Err(SshError::Session("Authentication failed".to_string()));
        }

        info!("SSH session established");
        Ok(Box::new(SshSession { session: sess }))
    }
}

fn authenticate(sess: &Session, host: &Host) -> Result<(), SshError> {
    match host.auth_method {
        AuthMethod::Password => {
            debug!(username = %host.username, "Authenticating with password");
            let password = host.password.as_deref().unwrap_or_default();
            sess.userauth_password(&host.username, password).map_err(|e| {
                error!(error = %e, username = %host.username, "Password authentication failed");
                SshError::Session(format!(
                    "Password authentication failed for user {}: {}",
                    host.username, e
                ))
            })
        }
        AuthMethod::Key => {
            let key = host.private_key.as_deref().unwrap_or_default();
            // Malformed key material is a configuration problem, not a
            // transport failure, so it is rejected before userauth
            if !key.contains("-----BEGIN") {
                return Err(SshError::KeyParse(
                    "Private key is not PEM-encoded".to_string(),
                ));
            }

            debug!(username = %host.username, "Authenticating with private key");
            sess.userauth_pubkey_memory(&host.username, None, key, host.passphrase.as_deref())
                .map_err(|e| {
                    error!(error = %e, username = %host.username, "Key authentication failed");
                    SshError::Session(format!(
                        "Key authentication failed for user {}: {}",
                        host.username, e
                    ))
                })
        }
    }
}

/// Live ssh2 session. The underlying library is synchronous; per-host work is
/// spawned onto the multi-threaded runtime, matching how the SFTP job steps
/// have always run.
pub struct SshSession {
    session: Session,
}

#[async_trait]
impl RemoteSession for SshSession {
    #[instrument(skip(self, command))]
    async fn run_command(&mut self, command: &str) -> Result<CommandOutput, SshError> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| SshError::Session(format!("Failed to open channel: {}", e)))?;

        channel
            .exec(command)
            .map_err(|e| SshError::Session(format!("Failed to execute command: {}", e)))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| SshError::Session(format!("Failed to read stdout: {}", e)))?;

        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| SshError::Session(format!("Failed to read stderr: {}", e)))?;

        channel
            .wait_close()
            .map_err(|e| SshError::Session(format!("Failed to close channel: {}", e)))?;

        let exit_status = channel
            .exit_status()
            .map_err(|e| SshError::Session(format!("Failed to read exit status: {}", e)))?;

        if exit_status != 0 {
            return Err(SshError::RemoteCommand {
                exit_status,
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_status,
        })
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn upload_file(&mut self, data: &[u8], remote_path: &str) -> Result<(), SshError> {
        let sftp = self
            .session
            .sftp()
            .map_err(|e| SshError::Transfer(format!("Failed to open SFTP channel: {}", e)))?;

        if let Some(parent) = Path::new(remote_path).parent() {
            create_remote_dirs(&sftp, parent);
        }

        let mut remote_file = sftp.create(Path::new(remote_path)).map_err(|e| {
            SshError::Transfer(format!("Failed to create {}: {}", remote_path, e))
        })?;

        std::io::Write::write_all(&mut remote_file, data).map_err(|e| {
            SshError::Transfer(format!("Failed to write {}: {}", remote_path, e))
        })?;

        debug!(remote_path = %remote_path, "File uploaded");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn download_file(&mut self, remote_path: &str) -> Result<Vec<u8>, SshError> {
        let sftp = self
            .session
            .sftp()
            .map_err(|e| SshError::Transfer(format!("Failed to open SFTP channel: {}", e)))?;

        let mut remote_file = sftp
            .open(Path::new(remote_path))
            .map_err(|e| SshError::Transfer(format!("Failed to open {}: {}", remote_path, e)))?;

        let mut buffer = Vec::new();
        remote_file.read_to_end(&mut buffer).map_err(|e| {
            SshError::Transfer(format!("Failed to read {}: {}", remote_path, e))
        })?;

        debug!(remote_path = %remote_path, size = buffer.len(), "File downloaded");
        Ok(buffer)
    }

    #[instrument(skip(self))]
    async fn close(&mut self) -> Result<(), SshError> {
        self.session
            .disconnect(None, "session closed", None)
            .map_err(|e| SshError::Session(format!("Disconnect failed: {}", e)))
    }
}

/// Create remote directories recursively, ignoring already-existing ones
fn create_remote_dirs(sftp: &ssh2::Sftp, path: &Path) {
    if path.as_os_str().is_empty() || path == Path::new("/") {
        return;
    }
    if let Some(parent) = path.parent() {
        create_remote_dirs(sftp, parent);
    }
    let _ = sftp.mkdir(path, 0o755);
}
