//! Shared test helpers: a scripted pod that understands the handful of
//! commands the operator runs through exec.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};

use async_trait::async_trait;
use influxdb_operator::error::{Error, Result};
use influxdb_operator::remote::{ExecInput, ExecTarget, PodInfo, RemoteExecutor};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::sync::oneshot;

/// In-memory pod filesystem driven by exec commands
#[derive(Default)]
pub struct FakePod {
    pods: HashMap<String, PodInfo>,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    calls: Mutex<Vec<(ExecTarget, Vec<String>)>>,
    backup_files: Vec<(String, Vec<u8>)>,
    failing_program: Option<String>,
    hanging_program: Option<String>,
    cancelled: AtomicBool,
}

impl FakePod {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pod with the given phase and containers
    pub fn with_pod(mut self, namespace: &str, pod: &str, phase: &str, containers: &[&str]) -> Self {
        self.pods.insert(
            format!("{}/{}", namespace, pod),
            PodInfo {
                phase: Some(phase.to_string()),
                containers: containers.iter().map(|c| c.to_string()).collect(),
            },
        );
        self
    }

    /// Place a file in the pod
    pub fn with_file(self, path: &str, content: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        self
    }

    /// Files `influxd backup` writes into its target directory
    pub fn with_backup_output(mut self, files: &[(&str, &[u8])]) -> Self {
        self.backup_files = files
            .iter()
            .map(|(name, content)| (name.to_string(), content.to_vec()))
            .collect();
        self
    }

    /// Make every command whose program is `program` fail
    pub fn failing(mut self, program: &str) -> Self {
        self.failing_program = Some(program.to_string());
        self
    }

    /// Make every command whose program is `program` run until it is dropped,
    /// holding its stdin and stdout open
    pub fn hanging(mut self, program: &str) -> Self {
        self.hanging_program = Some(program.to_string());
        self
    }

    /// Whether a hanging command was dropped before it finished
    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<(ExecTarget, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.calls().into_iter().map(|(_, c)| c).collect()
    }

    /// Archive of every file at or below `path`, named the way GNU tar names them
    fn archive(&self, path: &str) -> Vec<u8> {
        let root = path.trim_end_matches('/');
        let files = self.files.lock().unwrap();
        let mut builder = tar::Builder::new(Vec::new());

        let mut dir_written = false;
        for (file_path, content) in files.iter() {
            let inside = file_path == root || file_path.starts_with(&format!("{}/", root));
            if !inside {
                continue;
            }
            if file_path != root && !dir_written {
                let mut dir = tar::Header::new_gnu();
                dir.set_entry_type(tar::EntryType::Directory);
                dir.set_mode(0o755);
                dir.set_size(0);
                builder
                    .append_data(&mut dir, format!("{}/", root.trim_start_matches('/')), std::io::empty())
                    .unwrap();
                dir_written = true;
            }

            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, file_path.trim_start_matches('/'), Cursor::new(content))
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn extract(&self, dir: &str, archive: &[u8]) -> Result<()> {
        let mut archive = tar::Archive::new(Cursor::new(archive));
        let mut files = self.files.lock().unwrap();
        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.display().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            files.insert(format!("{}/{}", dir.trim_end_matches('/'), name), content);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteExecutor for FakePod {
    async fn pod_info(&self, namespace: &str, pod: &str) -> Result<PodInfo> {
        self.pods
            .get(&format!("{}/{}", namespace, pod))
            .cloned()
            .ok_or_else(|| Error::Connection(format!("pod {}/{} not found", namespace, pod)))
    }

    async fn exec_streamed(
        &self,
        target: &ExecTarget,
        command: &[String],
        stdin: Option<ExecInput>,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .push((target.clone(), command.to_vec()));

        if self.failing_program.is_some() && self.failing_program.as_deref() == command.first().map(String::as_str) {
            return Err(Error::remote(format!("{:?} exited with status 1", command)));
        }

        if self.hanging_program.is_some() && self.hanging_program.as_deref() == command.first().map(String::as_str) {
            let _guard = CancelGuard(&self.cancelled);
            let _stdin = stdin;
            let _stdout = stdout;
            return std::future::pending().await;
        }

        let args: Vec<&str> = command.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["tar", "cf", "-", path] => {
                let archive = self.archive(path);
                stdout.write_all(&archive).await?;
                stdout.flush().await?;
                let found = self
                    .paths()
                    .iter()
                    .any(|p| p.as_str() == *path || p.starts_with(&format!("{}/", path.trim_end_matches('/'))));
                if found {
                    Ok(Vec::new())
                } else {
                    Err(Error::remote(format!(
                        "tar: {}: Cannot stat: No such file or directory",
                        path
                    )))
                }
            }
            ["mkdir", "-p", _] => Ok(Vec::new()),
            ["tar", "-xf", "-", "-C", dir] => {
                let mut input = stdin.ok_or_else(|| Error::remote("tar -xf needs stdin"))?;
                let mut archive = Vec::new();
                input.read_to_end(&mut archive).await?;
                self.extract(dir, &archive)?;
                Ok(Vec::new())
            }
            ["influxd", "backup", .., dir] => {
                let mut files = self.files.lock().unwrap();
                for (name, content) in &self.backup_files {
                    files.insert(format!("{}/{}", dir, name), content.clone());
                }
                Ok(b"backing up metastore\n".to_vec())
            }
            ["influxd", "restore", ..] => Ok(Vec::new()),
            other => Err(Error::remote(format!("unexpected command {:?}", other))),
        }
    }
}

/// Marks a hanging command as cancelled when its future is dropped
struct CancelGuard<'a>(&'a AtomicBool);

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Upload source that reports when the reader holding it is dropped
pub struct TrackedSource {
    inner: Cursor<Vec<u8>>,
    dropped: Option<oneshot::Sender<()>>,
}

/// A source over `body` and a receiver that resolves once it is dropped
pub fn tracked_source(body: Vec<u8>) -> (TrackedSource, oneshot::Receiver<()>) {
    let (tx, rx) = oneshot::channel();
    let source = TrackedSource {
        inner: Cursor::new(body),
        dropped: Some(tx),
    };
    (source, rx)
}

impl AsyncRead for TrackedSource {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        if let Some(tx) = self.dropped.take() {
            let _ = tx.send(());
        }
    }
}
