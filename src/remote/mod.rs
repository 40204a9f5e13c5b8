//! Running commands in pods and copying files in and out of them

pub mod copy;
pub mod exec;
pub mod file_spec;
pub mod tar_stream;

pub use copy::PodCopier;
pub use exec::{ExecInput, ExecOutput, ExecTarget, KubeExecutor, PodInfo, RemoteExecutor};
pub use file_spec::FileSpec;
