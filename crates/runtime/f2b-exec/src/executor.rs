use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use f2b_config::{Config, SshTarget};
use tokio::process::Command;

use crate::{ExecError, Result};

/// Raw result of one client invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs `fail2ban-client` with the given arguments.
///
/// A non-zero exit is still `Ok` here; [`crate::Fail2banClient`] decides what
/// counts as failure. `Err` means the command never produced an exit status.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, args: &[String]) -> Result<CommandOutput>;

    /// Human-readable target, for logs.
    fn describe(&self) -> String;
}

/// Spawns the real client as a subprocess.
#[derive(Debug, Clone)]
pub struct ClientExecutor {
    client: String,
    use_sudo: bool,
    ssh: Option<SshTarget>,
    timeout: Duration,
}

impl ClientExecutor {
    pub fn new(config: &Config) -> Self {
        Self {
            client: config.client.clone(),
            use_sudo: config.use_sudo,
            ssh: config.ssh.clone(),
            timeout: config.command_timeout,
        }
    }

    /// Local executor without sudo.
    pub fn local(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            use_sudo: false,
            ssh: None,
            timeout: Duration::from_secs(f2b_config::DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and argv for `args`.
    ///
    /// Over SSH the client command is passed as one string that the remote
    /// shell re-splits, so every word is quoted.
    pub fn command_line(&self, args: &[String]) -> (String, Vec<String>) {
        match &self.ssh {
            Some(target) => {
                let mut argv = vec![
                    "-o".to_string(),
                    "BatchMode=yes".to_string(),
                    "-o".to_string(),
                    format!("ConnectTimeout={}", self.timeout.as_secs().max(1)),
                ];
                if let Some(key) = &target.key {
                    argv.push("-i".to_string());
                    argv.push(key.to_string_lossy().to_string());
                }
                argv.push(format!("{}@{}", target.user, target.host));

                let remote: Vec<String> = std::iter::once(self.client.as_str())
                    .chain(args.iter().map(String::as_str))
                    .map(shell_quote)
                    .collect();
                argv.push(remote.join(" "));
                ("ssh".to_string(), argv)
            }
            None if self.use_sudo => {
                let mut argv = vec!["-n".to_string(), self.client.clone()];
                argv.extend(args.iter().cloned());
                ("sudo".to_string(), argv)
            }
            None => (self.client.clone(), args.to_vec()),
        }
    }
}

#[async_trait]
impl CommandExecutor for ClientExecutor {
    async fn execute(&self, args: &[String]) -> Result<CommandOutput> {
        let (program, argv) = self.command_line(args);

        // kill_on_drop: a timed-out or abandoned request takes its child with it
        let child = Command::new(&program)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(%program, ?args, timeout = ?self.timeout, "client command timed out");
                return Err(ExecError::Timeout {
                    program,
                    timeout: self.timeout,
                });
            }
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code(),
        })
    }

    fn describe(&self) -> String {
        match &self.ssh {
            Some(t) => format!("{} via ssh {}@{}", self.client, t.user, t.host),
            None if self.use_sudo => format!("sudo {}", self.client),
            None => self.client.clone(),
        }
    }
}

/// Quote a word for a POSIX shell. Words made only of safe characters pass
/// through unchanged.
pub fn shell_quote(word: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "._-/:=@%+,".contains(c);
    if !word.is_empty() && word.chars().all(safe) {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn config_with(f: impl FnOnce(&mut Config)) -> Config {
        let mut config = Config::default();
        f(&mut config);
        config
    }

    #[test]
    fn test_local_command_line() {
        let exec = ClientExecutor::new(&config_with(|c| c.use_sudo = false));
        let (program, argv) = exec.command_line(&args(&["status", "sshd"]));
        assert_eq!(program, "fail2ban-client");
        assert_eq!(argv, args(&["status", "sshd"]));
    }

    #[test]
    fn test_sudo_command_line() {
        let exec = ClientExecutor::new(&Config::default());
        let (program, argv) = exec.command_line(&args(&["status"]));
        assert_eq!(program, "sudo");
        assert_eq!(argv, args(&["-n", "fail2ban-client", "status"]));
        assert_eq!(exec.describe(), "sudo fail2ban-client");
    }

    #[test]
    fn test_ssh_command_line() {
        let exec = ClientExecutor::new(&config_with(|c| {
            c.ssh = Some(SshTarget {
                host: "fw.example.net".to_string(),
                user: "ops".to_string(),
                key: Some(PathBuf::from("/keys/id")),
            });
        }));
        let (program, argv) = exec.command_line(&args(&["set", "sshd", "banip", "1.2.3.4"]));
        assert_eq!(program, "ssh");
        assert_eq!(
            argv,
            args(&[
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "-i",
                "/keys/id",
                "ops@fw.example.net",
                "fail2ban-client set sshd banip 1.2.3.4",
            ])
        );
        // sudo is never added on the remote side
        assert!(!argv.iter().any(|a| a.contains("sudo")));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("sshd"), "sshd");
        assert_eq!(shell_quote("2001:db8::1"), "2001:db8::1");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("x;rm -rf /"), "'x;rm -rf /'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_execute_captures_stdout() {
        let exec = ClientExecutor::local("echo");
        let out = exec.execute(&args(&["Jail list:", "sshd"])).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "Jail list: sshd\n");
    }

    #[tokio::test]
    async fn test_execute_reports_exit_code() {
        let exec = ClientExecutor::local("false");
        let out = exec.execute(&[]).await.unwrap();
        assert!(!out.success());
        assert_eq!(out.code, Some(1));
    }

    #[tokio::test]
    async fn test_execute_missing_binary() {
        let exec = ClientExecutor::local("/nonexistent/fail2ban-client");
        let err = exec.execute(&args(&["status"])).await.unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_execute_times_out() {
        let exec = ClientExecutor::local("sleep").with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = exec.execute(&args(&["5"])).await.unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
