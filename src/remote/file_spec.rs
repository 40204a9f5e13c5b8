//! `[[namespace/]pod:]path` references

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A file inside a pod, or on local disk when no pod is named
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub namespace: Option<String>,
    pub pod: Option<String>,
    pub path: String,
}

impl FileSpec {
    /// Parse `[[namespace/]pod:]path`
    pub fn parse(arg: &str) -> Result<Self> {
        let Some(idx) = arg.find(':') else {
            return Self::local(arg);
        };

        let (coords, path) = (&arg[..idx], &arg[idx + 1..]);
        if coords.is_empty() {
            return Err(format_error());
        }
        if path.is_empty() {
            return Err(Error::FileSpec("file path can not be empty".to_string()));
        }

        let pieces: Vec<&str> = coords.split('/').collect();
        match pieces.as_slice() {
            [pod] if !pod.is_empty() => Ok(Self {
                namespace: None,
                pod: Some(pod.to_string()),
                path: path.to_string(),
            }),
            [namespace, pod] if !namespace.is_empty() && !pod.is_empty() => Ok(Self {
                namespace: Some(namespace.to_string()),
                pod: Some(pod.to_string()),
                path: path.to_string(),
            }),
            _ => Err(format_error()),
        }
    }

    /// A pure local path
    pub fn local(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::FileSpec("file path can not be empty".to_string()));
        }
        Ok(Self {
            namespace: None,
            pod: None,
            path: path.to_string(),
        })
    }

    /// A path inside a pod
    pub fn in_pod(namespace: &str, pod: &str, path: &str) -> Result<Self> {
        Self::parse(&format!("{}/{}:{}", namespace, pod, path))
    }

    /// Whether the reference names a pod
    pub fn is_remote(&self) -> bool {
        self.pod.is_some()
    }

    /// Namespace, falling back to the caller's default
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }
}

impl FromStr for FileSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.namespace, &self.pod) {
            (Some(ns), Some(pod)) => write!(f, "{}/{}:{}", ns, pod, self.path),
            (None, Some(pod)) => write!(f, "{}:{}", pod, self.path),
            _ => f.write_str(&self.path),
        }
    }
}

fn format_error() -> Error {
    Error::FileSpec(
        "filespec must match the canonical format: [[namespace/]pod:]file/path".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_pod_and_path() {
        let spec = FileSpec::parse("default/influxdb-0:/var/lib/influxdb/backup/20180105111111")
            .unwrap();
        assert_eq!(spec.namespace.as_deref(), Some("default"));
        assert_eq!(spec.pod.as_deref(), Some("influxdb-0"));
        assert_eq!(spec.path, "/var/lib/influxdb/backup/20180105111111");
    }

    #[test]
    fn test_pod_only() {
        let spec = FileSpec::parse("influxdb-0:/data").unwrap();
        assert_eq!(spec.namespace, None);
        assert_eq!(spec.pod.as_deref(), Some("influxdb-0"));
        assert_eq!(spec.namespace_or("monitoring"), "monitoring");
    }

    #[test]
    fn test_local_path() {
        let spec = FileSpec::parse("/tmp/out").unwrap();
        assert!(!spec.is_remote());
        assert_eq!(spec.path, "/tmp/out");
    }

    #[test]
    fn test_path_keeps_later_colons() {
        let spec = FileSpec::parse("ns/pod:/data/a:b").unwrap();
        assert_eq!(spec.path, "/data/a:b");
    }

    #[test]
    fn test_rejects_malformed_specs() {
        for bad in ["", ":/data", "a/b/c:/data", "ns/:/data", "/pod:/data", "pod:"] {
            assert!(FileSpec::parse(bad).is_err(), "'{}' should be rejected", bad);
        }
    }

    #[test]
    fn test_display_round_trips() {
        for raw in ["ns/pod:/data", "pod:/data/x", "/local/file"] {
            let spec = FileSpec::parse(raw).unwrap();
            assert_eq!(spec.to_string(), raw);
            assert_eq!(FileSpec::parse(&spec.to_string()).unwrap(), spec);
        }
    }
}
