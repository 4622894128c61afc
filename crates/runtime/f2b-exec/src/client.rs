use std::sync::Arc;

use f2b_core::ActionKind;

use crate::executor::CommandExecutor;
use crate::{ExecError, Result};

/// Named `fail2ban-client` commands over any [`CommandExecutor`].
///
/// Every method returns stdout on exit status 0 and
/// [`ExecError::Failed`] otherwise. Nothing is retried.
#[derive(Clone)]
pub struct Fail2banClient {
    exec: Arc<dyn CommandExecutor>,
}

impl Fail2banClient {
    pub fn new(exec: Arc<dyn CommandExecutor>) -> Self {
        Self { exec }
    }

    pub fn describe(&self) -> String {
        self.exec.describe()
    }

    /// Generic command runner.
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let argv: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let output = match self.exec.execute(&argv).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(?args, error = %e, "fail2ban-client could not run");
                return Err(e);
            }
        };

        if output.success() {
            tracing::debug!(?args, bytes = output.stdout.len(), "fail2ban-client ok");
            return Ok(output.stdout);
        }

        let stderr = output.stderr.trim();
        let message = if stderr.is_empty() {
            output.stdout.trim().to_string()
        } else {
            stderr.to_string()
        };
        let code = output.code.unwrap_or(-1);
        tracing::warn!(?args, code, %message, "fail2ban-client failed");
        Err(ExecError::Failed { code, message })
    }

    /// `ping`: answers "Server replied: pong" when the daemon is up.
    pub async fn ping(&self) -> Result<String> {
        self.run(&["ping"]).await
    }

    /// Global status with the jail list.
    pub async fn status(&self) -> Result<String> {
        self.run(&["status"]).await
    }

    pub async fn jail_status(&self, jail: &str) -> Result<String> {
        self.run(&["status", jail]).await
    }

    /// Banned addresses with their ban times (fail2ban 0.11+).
    pub async fn banned_with_time(&self, jail: &str) -> Result<String> {
        self.run(&["get", jail, "banip", "--with-time"]).await
    }

    pub async fn ban(&self, jail: &str, ip: &str) -> Result<String> {
        self.run(&["set", jail, "banip", ip]).await
    }

    pub async fn unban(&self, jail: &str, ip: &str) -> Result<String> {
        self.run(&["set", jail, "unbanip", ip]).await
    }

    pub async fn apply(&self, action: ActionKind, jail: &str, ip: &str) -> Result<String> {
        match action {
            ActionKind::Ban => self.ban(jail, ip).await,
            ActionKind::Unban => self.unban(jail, ip).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with a fixed output and remembers what it was asked.
    struct Scripted {
        reply: CommandOutput,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Scripted {
        fn new(code: i32, stdout: &str, stderr: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: CommandOutput {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                    code: Some(code),
                },
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandExecutor for Scripted {
        async fn execute(&self, args: &[String]) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok(self.reply.clone())
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    #[tokio::test]
    async fn test_success_returns_stdout() {
        let exec = Scripted::new(0, "Server replied: pong\n", "");
        let client = Fail2banClient::new(exec.clone());
        assert_eq!(client.ping().await.unwrap(), "Server replied: pong\n");
        assert_eq!(exec.calls.lock().unwrap()[0], vec!["ping".to_string()]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let exec = Scripted::new(255, "", "Sorry but the jail 'nope' does not exist\n");
        let client = Fail2banClient::new(exec);
        match client.jail_status("nope").await.unwrap_err() {
            ExecError::Failed { code, message } => {
                assert_eq!(code, 255);
                assert_eq!(message, "Sorry but the jail 'nope' does not exist");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failure_message_falls_back_to_stdout() {
        let exec = Scripted::new(1, "ERROR  NOK: ('sshd',)\n", "");
        let client = Fail2banClient::new(exec);
        let err = client.ban("sshd", "1.2.3.4").await.unwrap_err();
        assert!(err.to_string().contains("NOK"));
    }

    #[tokio::test]
    async fn test_action_argument_order() {
        let exec = Scripted::new(0, "1\n", "");
        let client = Fail2banClient::new(exec.clone());
        client.apply(ActionKind::Ban, "sshd", "1.2.3.4").await.unwrap();
        client.apply(ActionKind::Unban, "sshd", "1.2.3.4").await.unwrap();
        client.banned_with_time("sshd").await.unwrap();

        let calls = exec.calls.lock().unwrap();
        assert_eq!(calls[0], ["set", "sshd", "banip", "1.2.3.4"]);
        assert_eq!(calls[1], ["set", "sshd", "unbanip", "1.2.3.4"]);
        assert_eq!(calls[2], ["get", "sshd", "banip", "--with-time"]);
    }
}
