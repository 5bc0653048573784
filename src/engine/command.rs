use anyhow::Context;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// How long a killed child gets to flush what is left in its pipes.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// A single external tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0) && !self.timed_out
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> anyhow::Result<CommandOutput>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> anyhow::Result<CommandOutput> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", invocation.program))?;

        let stdin = child.stdin.take();
        let input = invocation.stdin.clone();
        let feed = tokio::spawn(async move {
            if let (Some(mut pipe), Some(bytes)) = (stdin, input) {
                pipe.write_all(&bytes).await?;
                pipe.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let mut stdout = child.stdout.take().context("child stdout was not captured")?;
        let mut stderr = child.stderr.take().context("child stderr was not captured")?;
        let mut out = Vec::new();
        let mut err = Vec::new();

        let timed_out = match invocation.timeout {
            Some(limit) => {
                let first =
                    timeout(limit, read_streams(&mut stdout, &mut stderr, &mut out, &mut err))
                        .await;
                match first {
                    Ok(res) => {
                        res.context("failed to read child output")?;
                        false
                    }
                    Err(_) => {
                        debug!(
                            command = %invocation.command_line(),
                            limit = ?limit,
                            "command timed out"
                        );
                        // The child may have exited in the meantime.
                        let _ = child.start_kill();
                        let _ = timeout(
                            DRAIN_GRACE,
                            read_streams(&mut stdout, &mut stderr, &mut out, &mut err),
                        )
                        .await;
                        true
                    }
                }
            }
            None => {
                read_streams(&mut stdout, &mut stderr, &mut out, &mut err)
                    .await
                    .context("failed to read child output")?;
                false
            }
        };

        match feed.await {
            Ok(Err(io_err)) => debug!(error = %io_err, "failed to feed child stdin"),
            Err(join_err) => debug!(error = %join_err, "stdin feeder task failed"),
            Ok(Ok(())) => {}
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("failed to wait for {}", invocation.program))?;

        Ok(CommandOutput {
            status: if timed_out { None } else { status.code() },
            stdout: String::from_utf8_lossy(&out).into_owned(),
            stderr: String::from_utf8_lossy(&err).into_owned(),
            timed_out,
        })
    }
}

async fn read_streams<O, E>(
    stdout: &mut O,
    stderr: &mut E,
    out: &mut Vec<u8>,
    err: &mut Vec<u8>,
) -> std::io::Result<()>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let (out_res, err_res) = tokio::join!(stdout.read_to_end(out), stderr.read_to_end(err));
    out_res?;
    err_res?;
    Ok(())
}
