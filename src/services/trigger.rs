use crate::config::TriggerConfig;
use crate::error::TransferError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Launched once after the transfer loop settles
#[async_trait]
pub trait DownstreamTrigger: Send + Sync {
    /// Runs the downstream process to completion and returns its exit code
    /// (`None` when it was terminated by a signal).
    async fn fire(&self) -> Result<Option<i32>, TransferError>;
}

/// Runs a configured external command, relaying its output line by line
pub struct ProcessTrigger {
    config: TriggerConfig,
}

impl ProcessTrigger {
    pub fn new(config: TriggerConfig) -> Self {
        Self { config }
    }

    fn build_command(&self) -> Command {
        let mut cmd = if self.config.use_shell {
            let mut line = self.config.program.clone();
            for arg in &self.config.args {
                line.push(' ');
                line.push_str(arg);
            }
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(line);
            cmd
        } else {
            let mut cmd = Command::new(&self.config.program);
            cmd.args(&self.config.args);
            cmd
        };

        cmd.current_dir(&self.config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl DownstreamTrigger for ProcessTrigger {
    async fn fire(&self) -> Result<Option<i32>, TransferError> {
        tracing::info!(
            "🚀 Running downstream process: {} {} (in {:?})",
            self.config.program,
            self.config.args.join(" "),
            self.config.working_dir
        );

        let mut child = self.build_command().spawn().map_err(|e| {
            TransferError::Trigger(format!("failed to spawn {}: {}", self.config.program, e))
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let relay_stdout = async {
            if let Some(out) = stdout {
                relay_lines(out, |line| tracing::info!("Downstream output: {}", line)).await;
            }
        };
        let relay_stderr = async {
            if let Some(err) = stderr {
                relay_lines(err, |line| tracing::warn!("Downstream error: {}", line)).await;
            }
        };

        let (status, _, _) = tokio::join!(child.wait(), relay_stdout, relay_stderr);
        let status = status?;

        tracing::info!("Downstream process exited with code {:?}", status.code());
        Ok(status.code())
    }
}

/// Drains `reader` to EOF, handing each line to `emit`. Lines are decoded
/// lossily; the pipe must stay open until the child exits or its next write
/// fails with a broken pipe.
async fn relay_lines<R, F>(reader: R, emit: F) -> usize
where
    R: AsyncRead + Unpin,
    F: Fn(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut count = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                emit(line.trim_end_matches(['\r', '\n']));
                count += 1;
            }
            Err(e) => {
                tracing::warn!("Failed to read downstream output: {}", e);
                break;
            }
        }
    }
    count
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn shell(line: &str) -> TriggerConfig {
        TriggerConfig {
            program: line.to_string(),
            args: vec![],
            working_dir: PathBuf::from("."),
            use_shell: true,
        }
    }

    #[tokio::test]
    async fn test_exit_code_relayed() {
        let trigger = ProcessTrigger::new(shell("echo building && echo oops >&2 && exit 3"));
        assert_eq!(trigger.fire().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_is_drained() {
        let trigger = ProcessTrigger::new(shell(
            "printf 'bad \\377\\n'; sleep 1; i=0; while [ $i -lt 2000 ]; do echo line $i; i=$((i+1)); done; exit 0",
        ));
        assert_eq!(trigger.fire().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_relay_lines_lossy() {
        let input: &[u8] = b"first\nbad \xff\r\nlast";
        let seen = std::sync::Mutex::new(Vec::new());
        let count = relay_lines(input, |line| seen.lock().unwrap().push(line.to_string())).await;

        assert_eq!(count, 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first".to_string(), "bad \u{FFFD}".to_string(), "last".to_string()]
        );
    }

    #[tokio::test]
    async fn test_success() {
        let trigger = ProcessTrigger::new(shell("true"));
        assert_eq!(trigger.fire().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_working_dir_and_args() {
        let dir = tempfile::tempdir().unwrap();
        let trigger = ProcessTrigger::new(TriggerConfig {
            program: "touch".to_string(),
            args: vec!["marker".to_string()],
            working_dir: dir.path().to_path_buf(),
            use_shell: false,
        });
        assert_eq!(trigger.fire().await.unwrap(), Some(0));
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let trigger = ProcessTrigger::new(TriggerConfig {
            program: "/nonexistent/gradlew".to_string(),
            args: vec![],
            working_dir: PathBuf::from("."),
            use_shell: false,
        });
        assert!(matches!(trigger.fire().await, Err(TransferError::Trigger(_))));
    }
}
