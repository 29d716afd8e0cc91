//! Reconstruction toolchain provisioning.
//!
//! Downloads, verifies and unpacks the toolchain release, locates its
//! batch executable, and optionally installs host packages.

mod archive;
mod errors;
mod fetch;
mod provisioner;
mod system_deps;

pub use archive::{sha256_file, verify_sha256, ArchiveKind};
pub use errors::ProvisioningError;
pub use fetch::{ArchiveFetcher, HttpFetcher};
pub use provisioner::{ProvisionProgress, ProvisioningResult, Toolchain, ToolchainProvisioner};
pub use system_deps::{DependencyStatus, SystemDependencies};
