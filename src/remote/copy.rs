//! Copying files into and out of running pods
//!
//! Both directions run `tar` inside the container over an exec session and
//! pair it with the local codec through an in-memory pipe: the local side
//! runs on the blocking pool while the exec session runs on the caller's task.
//! Both halves are joined before an operation completes.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::{CopyPhase, Error, Result};

use super::exec::{ExecTarget, RemoteExecutor};
use super::file_spec::FileSpec;
use super::tar_stream::{clean_components, spawn_decoder, spawn_encoder};

/// Capacity of the pipe between the codec and the exec session
const PIPE_CAPACITY: usize = 64 * 1024;

/// Namespace used when a file spec does not name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Copies files between local disk and pod containers
#[derive(Clone)]
pub struct PodCopier {
    executor: Arc<dyn RemoteExecutor>,
    default_namespace: String,
}

impl PodCopier {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            executor,
            default_namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// Namespace for specs written as `pod:path`
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    /// The executor used for every exec session
    pub fn executor(&self) -> &Arc<dyn RemoteExecutor> {
        &self.executor
    }

    /// Resolve the pod behind `spec`, refusing pods that already terminated.
    /// Without an explicit container the pod's first container is used.
    pub async fn resolve_target(&self, spec: &FileSpec, container: Option<&str>) -> Result<ExecTarget> {
        let pod = spec
            .pod
            .as_deref()
            .ok_or_else(|| Error::FileSpec(format!("'{}' does not name a pod", spec)))?;
        let namespace = spec.namespace_or(&self.default_namespace);

        let info = self.executor.pod_info(namespace, pod).await?;
        if info.is_terminated() {
            return Err(Error::PodNotRunning {
                pod: format!("{}/{}", namespace, pod),
                phase: info.phase.unwrap_or_default(),
            });
        }

        let container = match container {
            Some(name) => name.to_string(),
            None => info
                .containers
                .first()
                .cloned()
                .ok_or_else(|| Error::remote(format!("pod {}/{} has no containers", namespace, pod)))?,
        };

        Ok(ExecTarget::new(namespace, pod, container))
    }

    /// Copy a file or directory out of a pod into `dest`
    ///
    /// Returns the number of archive entries written locally. A remote path
    /// that does not exist fails with [`Error::NoSuchEntry`].
    pub async fn copy_from_pod(&self, src: &str, dest: &Path, container: Option<&str>) -> Result<usize> {
        let spec = FileSpec::parse(src).map_err(|e| e.in_phase(CopyPhase::Lookup))?;
        let target = self
            .resolve_target(&spec, container)
            .await
            .map_err(|e| e.in_phase(CopyPhase::Lookup))?;

        let command = vec![
            "tar".to_string(),
            "cf".to_string(),
            "-".to_string(),
            spec.path.clone(),
        ];
        let prefix = clean_components(&spec.path).join("/");

        debug!(src = %spec, dest = %dest.display(), "Copying out of pod");

        let (mut writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
        let decoder = spawn_decoder(reader, dest.to_path_buf(), prefix);

        let exec = async {
            let result = self
                .executor
                .exec_streamed(&target, &command, None, &mut writer)
                .await;
            // close our end so the decoder sees end of stream
            let _ = writer.shutdown().await;
            drop(writer);
            result
        };

        let (exec_result, decode_result) = tokio::join!(exec, decoder);
        let decode_result = decode_result
            .map_err(|e| Error::Decoding(format!("decoder task failed: {}", e)))
            .and_then(|r| r);

        let entries = match (exec_result, decode_result) {
            (_, Err(missing @ Error::NoSuchEntry(_))) => {
                return Err(missing.in_phase(CopyPhase::Decode));
            }
            (Err(Error::Io(io)), Err(decode)) => {
                debug!(error = %io, "Exec sink closed by failed decoder");
                return Err(decode.in_phase(CopyPhase::Decode));
            }
            (Err(exec), _) => return Err(exec.in_phase(CopyPhase::Exec)),
            (Ok(_), Err(decode)) => return Err(decode.in_phase(CopyPhase::Decode)),
            (Ok(_), Ok(entries)) => entries,
        };

        info!(src = %spec, dest = %dest.display(), entries = entries, "Copied out of pod");
        Ok(entries)
    }

    /// Copy `size` bytes from `source` into the pod path named by `dest`
    ///
    /// Parent directories are created first. A zero `size` is a successful
    /// no-op. Returns the number of bytes sent.
    pub async fn copy_to_pod<R>(&self, source: R, size: u64, dest: &str, container: Option<&str>) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let spec = FileSpec::parse(dest).map_err(|e| e.in_phase(CopyPhase::Lookup))?;
        if spec.path.ends_with('/') {
            return Err(Error::FileSpec(format!("destination '{}' must name a file", spec))
                .in_phase(CopyPhase::Lookup));
        }
        let target = self
            .resolve_target(&spec, container)
            .await
            .map_err(|e| e.in_phase(CopyPhase::Lookup))?;

        if size == 0 {
            debug!(dest = %spec, "Skipping empty upload");
            return Ok(0);
        }

        let dest_dir = parent_dir(&spec.path);
        if let Some(dir) = &dest_dir {
            let mkdir = vec!["mkdir".to_string(), "-p".to_string(), dir.clone()];
            let output = self
                .executor
                .exec(&target, &mkdir, None)
                .await
                .map_err(|e| e.in_phase(CopyPhase::Mkdir))?;
            if !output.stderr.is_empty() {
                return Err(Error::remote(format!(
                    "mkdir -p {} failed: {}",
                    dir,
                    output.stderr_lossy().trim()
                ))
                .in_phase(CopyPhase::Mkdir));
            }
        }

        let mut command = vec!["tar".to_string(), "-xf".to_string(), "-".to_string()];
        if let Some(dir) = &dest_dir {
            command.push("-C".to_string());
            command.push(dir.clone());
        }

        debug!(dest = %spec, size = size, "Copying into pod");

        let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
        let encoder = spawn_encoder(source, size, spec.path.clone(), writer);

        let exec = async {
            let mut discard = tokio::io::sink();
            self.executor
                .exec_streamed(&target, &command, Some(Box::new(reader)), &mut discard)
                .await
        };

        let (exec_result, encode_result) = tokio::join!(exec, encoder);
        let encode_result = encode_result
            .map_err(|e| Error::Encoding(format!("encoder task failed: {}", e)))
            .and_then(|r| r);

        let written = match (exec_result, encode_result) {
            (Err(exec), Err(Error::Io(io))) if io.kind() == ErrorKind::BrokenPipe => {
                debug!(error = %io, "Encoder pipe closed by failed exec");
                return Err(exec.in_phase(CopyPhase::Exec));
            }
            (_, Err(encode)) => return Err(encode.in_phase(CopyPhase::Encode)),
            (Err(exec), Ok(_)) => return Err(exec.in_phase(CopyPhase::Exec)),
            (Ok(_), Ok(written)) => written,
        };

        info!(dest = %spec, bytes = written, "Copied into pod");
        Ok(written)
    }
}

/// Directory portion of a pod path, `None` for a bare file name
fn parent_dir(path: &str) -> Option<String> {
    let (dir, _) = path.rsplit_once('/')?;
    if dir.is_empty() {
        Some("/".to_string())
    } else {
        Some(dir.to_string())
    }
}
