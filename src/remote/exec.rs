//! Remote shell execution inside pod containers

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::AttachParams;
use kube::{Api, Client};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Boxed stdin for a remote command
pub type ExecInput = Box<dyn AsyncRead + Send + Unpin>;

/// Pod and container a command runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl ExecTarget {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }
}

/// What a pod looks like from the copy engine's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    /// Pod phase (Pending, Running, Succeeded, Failed, Unknown)
    pub phase: Option<String>,
    /// Container names in declaration order
    pub containers: Vec<String>,
}

impl PodInfo {
    /// Succeeded and Failed pods have no running containers to exec into
    pub fn is_terminated(&self) -> bool {
        matches!(self.phase.as_deref(), Some("Succeeded") | Some("Failed"))
    }
}

/// Result of a remote command whose stdout was captured
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs commands inside pod containers
///
/// `exec_streamed` blocks until the remote process exits. A command that
/// reports a non-success status fails with [`Error::RemoteExecution`]; stderr
/// is returned on success so callers can inspect it as well.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Look up the phase and containers of a pod
    async fn pod_info(&self, namespace: &str, pod: &str) -> Result<PodInfo>;

    /// Run `command`, feeding `stdin` and streaming stdout into `stdout`.
    /// Returns the captured stderr.
    async fn exec_streamed(
        &self,
        target: &ExecTarget,
        command: &[String],
        stdin: Option<ExecInput>,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Vec<u8>>;

    /// Run `command` and capture both output streams in memory
    async fn exec(&self, target: &ExecTarget, command: &[String], stdin: Option<ExecInput>) -> Result<ExecOutput> {
        let mut stdout = Vec::new();
        let stderr = self.exec_streamed(target, command, stdin, &mut stdout).await?;
        Ok(ExecOutput { stdout, stderr })
    }
}

/// Executor backed by the Kubernetes `pods/exec` subresource
#[derive(Clone)]
pub struct KubeExecutor {
    client: Client,
    timeout: Option<Duration>,
}

impl KubeExecutor {
    /// Create an executor; `timeout` bounds each exec session
    pub fn new(client: Client, timeout: Option<Duration>) -> Self {
        Self { client, timeout }
    }

    async fn run_session(
        &self,
        target: &ExecTarget,
        command: &[String],
        stdin: Option<ExecInput>,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Vec<u8>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let params = AttachParams::default()
            .container(target.container.clone())
            .stdin(stdin.is_some())
            .stdout(true)
            .stderr(true);

        debug!(
            pod = %target.pod,
            namespace = %target.namespace,
            container = %target.container,
            command = ?command,
            "Opening exec session"
        );

        let mut attached = pods
            .exec(&target.pod, command.to_vec(), &params)
            .await
            .map_err(|e| Error::Connection(format!("exec into {}/{}: {}", target.namespace, target.pod, e)))?;

        let status = attached.take_status();
        let remote_stdin = attached.stdin();
        let remote_stdout = attached
            .stdout()
            .ok_or_else(|| Error::remote("exec session has no stdout stream"))?;
        let mut remote_stderr = attached
            .stderr()
            .ok_or_else(|| Error::remote("exec session has no stderr stream"))?;

        let feed = async move {
            if let (Some(mut input), Some(mut remote)) = (stdin, remote_stdin) {
                tokio::io::copy(&mut input, &mut remote).await?;
                remote.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let drain_stdout = drain_into(remote_stdout, stdout);
        let drain_stderr = async {
            let mut buf = Vec::new();
            remote_stderr.read_to_end(&mut buf).await.map(|_| buf)
        };

        let (fed, drained, stderr) = tokio::join!(feed, drain_stdout, drain_stderr);
        let stderr = stderr.map_err(|e| Error::remote(format!("reading stderr: {}", e)))?;

        // a failed command usually also breaks stdin, so report the status first
        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() == Some("Failure") {
                    let message = status.message.unwrap_or_default();
                    return Err(Error::remote(format!(
                        "command {:?} failed in {}/{}: {} {}",
                        command,
                        target.namespace,
                        target.pod,
                        message,
                        String::from_utf8_lossy(&stderr).trim()
                    )));
                }
            }
        }

        fed.map_err(|e| Error::remote(format!("writing stdin: {}", e)))?;
        drained.map_err(Error::Io)?;

        attached
            .join()
            .await
            .map_err(|e| Error::remote(format!("exec session ended abnormally: {}", e)))?;

        if !stderr.is_empty() {
            warn!(
                pod = %target.pod,
                namespace = %target.namespace,
                command = ?command,
                stderr = %String::from_utf8_lossy(&stderr).trim(),
                "Remote command wrote to stderr"
            );
        }

        Ok(stderr)
    }
}

/// Copy a session's stdout into `sink`
///
/// The reader is dropped before returning, also when the sink fails, so the
/// session sees a closed stream instead of stalling on a full buffer.
async fn drain_into<R>(mut remote: R, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let copied = tokio::io::copy(&mut remote, &mut *sink).await;
    drop(remote);
    copied?;
    sink.flush().await
}

#[async_trait]
impl RemoteExecutor for KubeExecutor {
    async fn pod_info(&self, namespace: &str, pod: &str) -> Result<PodInfo> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let found = pods.get(pod).await.map_err(|e| match e {
            kube::Error::Api(api_err) if api_err.code == 404 => {
                Error::Connection(format!("pod {}/{} not found", namespace, pod))
            }
            other => Error::Kube(other),
        })?;

        let containers = found
            .spec
            .as_ref()
            .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default();
        let phase = found.status.and_then(|s| s.phase);

        Ok(PodInfo { phase, containers })
    }

    async fn exec_streamed(
        &self,
        target: &ExecTarget,
        command: &[String],
        stdin: Option<ExecInput>,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Vec<u8>> {
        let session = self.run_session(target, command, stdin, stdout);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, session)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => session.await,
        }
    }
}
