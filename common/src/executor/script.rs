// Script runner: stages and executes shell and python scripts over SSH

use crate::errors::SshError;
use crate::models::{Host, ScriptKind};
use crate::ssh::{RemoteSession, SessionFactory};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Remote path the python source is staged to before execution
const STAGED_SCRIPT_PATH: &str = "/tmp/temp_py_script.py";

/// Heredoc delimiter for staging script bodies. Quoted at the redirect so the
/// remote shell performs no expansion inside the script text.
const HEREDOC_MARKER: &str = "PYEOF";

/// Output of a finished script run
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

/// Executes script content on remote hosts through a session factory.
///
/// Shell scripts run verbatim in the login shell. Python scripts are staged
/// to a temp file via heredoc and run through an interpreter fallback chain,
/// then the temp file is removed whether or not the run succeeded.
pub struct ScriptRunner {
    sessions: Arc<dyn SessionFactory>,
}

impl ScriptRunner {
    pub fn new(sessions: Arc<dyn SessionFactory>) -> Self {
        Self { sessions }
    }

    /// Build the remote command line for one script
    pub fn render_command(kind: ScriptKind, content: &str) -> String {
        match kind {
            ScriptKind::Shell => content.to_string(),
            ScriptKind::Python2 => python_command("python2", content),
            ScriptKind::Python3 => python_command("python3", content),
        }
    }

    /// Run a script on one host
    #[instrument(skip(self, content), fields(host = %host.name, kind = %kind))]
    pub async fn execute(
        &self,
        host: &Host,
        kind: ScriptKind,
        content: &str,
    ) -> Result<ExecOutput, SshError> {
        self.execute_with_files(host, kind, content, &[]).await
    }

    /// Run a script on one host, uploading input files first.
    ///
    /// An upload failure aborts before the script runs and names the file
    /// that failed. The staged python source and every uploaded input file
    /// are cleaned up on both the success and failure paths.
    #[instrument(skip(self, content, input_files), fields(host = %host.name, kind = %kind))]
    pub async fn execute_with_files(
        &self,
        host: &Host,
        kind: ScriptKind,
        content: &str,
        input_files: &[(String, Vec<u8>)],
    ) -> Result<ExecOutput, SshError> {
        let mut session = self.sessions.open(host).await?;

        for (name, data) in input_files {
            if let Err(e) = session.upload_file(data, &format!("/tmp/{}", name)).await {
                close_quietly(&mut session, host).await;
                return Err(SshError::Transfer(format!(
                    "Failed to upload input file {}: {}",
                    name, e
                )));
            }
            debug!(file = %name, size = data.len(), "Input file uploaded");
        }

        let command = Self::render_command(kind, content);
        let result = session.run_command(&command).await;

        if kind != ScriptKind::Shell {
            // Best effort: a failed run must still not leave the staged
            // source behind
            if let Err(e) = session
                .run_command(&format!("rm -f {}", STAGED_SCRIPT_PATH))
                .await
            {
                warn!(host = %host.name, error = %e, "Failed to remove staged script");
            }
        }

        // Uploaded input files are likewise removed whether or not the
        // script succeeded
        for (name, _) in input_files {
            if let Err(e) = session
                .run_command(&format!("rm -f /tmp/{}", name))
                .await
            {
                warn!(host = %host.name, file = %name, error = %e, "Failed to remove input file");
            }
        }

        close_quietly(&mut session, host).await;

        result.map(|output| ExecOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Stage the script body via heredoc, then try the named interpreter, its
/// absolute path, and finally a bare `python`
fn python_command(interpreter: &str, content: &str) -> String {
    format!(
        "cat > {path} << '{marker}'\n{content}\n{marker}\n\
         {interp} {path} || /usr/bin/{interp} {path} || python {path}",
        path = STAGED_SCRIPT_PATH,
        marker = HEREDOC_MARKER,
        content = content,
        interp = interpreter,
    )
}

async fn close_quietly(session: &mut Box<dyn RemoteSession>, host: &Host) {
    if let Err(e) = session.close().await {
        debug!(host = %host.name, error = %e, "Session close failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthMethod, HostStatus};
    use crate::ssh::CommandOutput;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
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

    /// Records every call made against it; commands matching a configured
    /// prefix fail with a remote error
    #[derive(Default)]
    struct Recorder {
        commands: Vec<String>,
        uploads: Vec<String>,
        closed: bool,
        fail_command_containing: Option<String>,
        fail_uploads: bool,
    }

    struct FakeSession {
        recorder: Arc<Mutex<Recorder>>,
    }

    #[async_trait]
    impl RemoteSession for FakeSession {
        async fn run_command(&mut self, command: &str) -> Result<CommandOutput, SshError> {
            let mut rec = self.recorder.lock().unwrap();
            rec.commands.push(command.to_string());
            if let Some(needle) = &rec.fail_command_containing {
                if command.contains(needle.as_str()) {
                    return Err(SshError::RemoteCommand {
                        exit_status: 1,
                        stdout: "partial".to_string(),
                        stderr: "boom".to_string(),
                    });
                }
            }
            Ok(CommandOutput {
                stdout: "ok\n".to_string(),
                stderr: String::new(),
                exit_status: 0,
            })
        }

        async fn upload_file(&mut self, _data: &[u8], remote_path: &str) -> Result<(), SshError> {
            let mut rec = self.recorder.lock().unwrap();
            if rec.fail_uploads {
                return Err(SshError::Transfer("disk full".to_string()));
            }
            rec.uploads.push(remote_path.to_string());
            Ok(())
        }

        async fn download_file(&mut self, _remote_path: &str) -> Result<Vec<u8>, SshError> {
            Ok(Vec::new())
        }

        async fn close(&mut self) -> Result<(), SshError> {
            self.recorder.lock().unwrap().closed = true;
            Ok(())
        }
    }

    struct FakeFactory {
        recorder: Arc<Mutex<Recorder>>,
    }

    #[async_trait]
    impl SessionFactory for FakeFactory {
        async fn open(&self, _host: &Host) -> Result<Box<dyn RemoteSession>, SshError> {
            Ok(Box::new(FakeSession {
                recorder: Arc::clone(&self.recorder),
            }))
        }
    }

    fn runner_with_recorder(recorder: Recorder) -> (ScriptRunner, Arc<Mutex<Recorder>>) {
        let recorder = Arc::new(Mutex::new(recorder));
        let factory = Arc::new(FakeFactory {
            recorder: Arc::clone(&recorder),
        });
        (ScriptRunner::new(factory), recorder)
    }

    #[test]
    fn test_shell_command_is_verbatim() {
        let command = ScriptRunner::render_command(ScriptKind::Shell, "df -h && uptime");
        assert_eq!(command, "df -h && uptime");
    }

    #[test]
    fn test_python_command_stages_then_falls_back() {
        let command = ScriptRunner::render_command(ScriptKind::Python3, "print('hi')");
        assert!(command.starts_with("cat > /tmp/temp_py_script.py << 'PYEOF'"));
        assert!(command.contains("print('hi')"));
        assert!(command.contains("python3 /tmp/temp_py_script.py"));
        assert!(command.contains("/usr/bin/python3 /tmp/temp_py_script.py"));
        assert!(command.ends_with("python /tmp/temp_py_script.py"));
    }

    #[test]
    fn test_python2_uses_python2_chain() {
        let command = ScriptRunner::render_command(ScriptKind::Python2, "print 'hi'");
        assert!(command.contains("python2 /tmp/temp_py_script.py"));
        assert!(!command.contains("python3"));
    }

    #[tokio::test]
    async fn test_shell_execution_closes_session() {
        let (runner, recorder) = runner_with_recorder(Recorder::default());

        let output = runner
            .execute(&test_host(), ScriptKind::Shell, "uptime")
            .await
            .unwrap();

        assert_eq!(output.stdout, "ok\n");
        let rec = recorder.lock().unwrap();
        assert_eq!(rec.commands, vec!["uptime".to_string()]);
        assert!(rec.closed);
    }

    #[tokio::test]
    async fn test_python_cleanup_runs_after_success() {
        let (runner, recorder) = runner_with_recorder(Recorder::default());

        runner
            .execute(&test_host(), ScriptKind::Python3, "print('hi')")
            .await
            .unwrap();

        let rec = recorder.lock().unwrap();
        assert_eq!(rec.commands.len(), 2);
        assert_eq!(rec.commands[1], "rm -f /tmp/temp_py_script.py");
        assert!(rec.closed);
    }

    #[tokio::test]
    async fn test_python_cleanup_runs_after_failure() {
        let (runner, recorder) = runner_with_recorder(Recorder {
            fail_command_containing: Some("cat >".to_string()),
            ..Default::default()
        });

        let result = runner
            .execute(&test_host(), ScriptKind::Python3, "print('hi')")
            .await;

        assert!(matches!(result, Err(SshError::RemoteCommand { .. })));
        let rec = recorder.lock().unwrap();
        // The script command failed but the cleanup still went out
        assert_eq!(rec.commands[1], "rm -f /tmp/temp_py_script.py");
        assert!(rec.closed);
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_before_execution() {
        let (runner, recorder) = runner_with_recorder(Recorder {
            fail_uploads: true,
            ..Default::default()
        });

        let files = vec![("data.csv".to_string(), b"a,b\n".to_vec())];
        let result = runner
            .execute_with_files(&test_host(), ScriptKind::Shell, "wc -l /tmp/data.csv", &files)
            .await;

        match result {
            Err(SshError::Transfer(msg)) => assert!(msg.contains("data.csv")),
            other => panic!("expected transfer error, got {:?}", other.map(|o| o.stdout)),
        }
        let rec = recorder.lock().unwrap();
        assert!(rec.commands.is_empty());
        assert!(rec.closed);
    }

    #[tokio::test]
    async fn test_input_files_land_in_tmp() {
        let (runner, recorder) = runner_with_recorder(Recorder::default());

        let files = vec![("data.csv".to_string(), b"a,b\n".to_vec())];
        runner
            .execute_with_files(&test_host(), ScriptKind::Shell, "cat /tmp/data.csv", &files)
            .await
            .unwrap();

        let rec = recorder.lock().unwrap();
        assert_eq!(rec.uploads, vec!["/tmp/data.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_input_files_removed_after_success() {
        let (runner, recorder) = runner_with_recorder(Recorder::default());

        let files = vec![
            ("data.csv".to_string(), b"a,b\n".to_vec()),
            ("lookup.txt".to_string(), b"x\n".to_vec()),
        ];
        runner
            .execute_with_files(&test_host(), ScriptKind::Shell, "wc -l /tmp/data.csv", &files)
            .await
            .unwrap();

        let rec = recorder.lock().unwrap();
        assert_eq!(
            rec.commands,
            vec![
                "wc -l /tmp/data.csv".to_string(),
                "rm -f /tmp/data.csv".to_string(),
                "rm -f /tmp/lookup.txt".to_string(),
            ]
        );
        assert!(rec.closed);
    }

    #[tokio::test]
    async fn test_input_files_removed_after_failure() {
        let (runner, recorder) = runner_with_recorder(Recorder {
            fail_command_containing: Some("wc -l".to_string()),
            ..Default::default()
        });

        let files = vec![("data.csv".to_string(), b"a,b\n".to_vec())];
        let result = runner
            .execute_with_files(&test_host(), ScriptKind::Shell, "wc -l /tmp/data.csv", &files)
            .await;

        assert!(matches!(result, Err(SshError::RemoteCommand { .. })));
        let rec = recorder.lock().unwrap();
        // The script command failed but the upload cleanup still went out
        assert_eq!(rec.commands[1], "rm -f /tmp/data.csv");
        assert!(rec.closed);
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_output() {
        let (runner, _) = runner_with_recorder(Recorder {
            fail_command_containing: Some("uptime".to_string()),
            ..Default::default()
        });

        let result = runner
            .execute(&test_host(), ScriptKind::Shell, "uptime")
            .await;

        match result {
            Err(SshError::RemoteCommand { stdout, stderr, .. }) => {
                assert_eq!(stdout, "partial");
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected remote command error, got {:?}", other.map(|o| o.stdout)),
        }
    }
}
