//! Host package dependencies (frame tool and display libraries).
//!
//! Installation is opt-in and best-effort: the outcome is reported as a
//! [`DependencyStatus`] and never aborts a job.

use std::process::Command;

use crate::config::ProvisioningSettings;
use crate::process;

/// Outcome of a dependency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyStatus {
    /// The probe program ran successfully.
    Present,
    /// The probe failed and installation is disabled.
    Missing { probe: String },
    /// The install command ran and the probe now succeeds.
    Installed,
    /// The install command failed or the probe still fails.
    InstallFailed { exit_code: i32, message: String },
}

impl DependencyStatus {
    /// Whether the probe program is usable.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, DependencyStatus::Present | DependencyStatus::Installed)
    }
}

/// Checks for and optionally installs host packages.
#[derive(Debug, Clone)]
pub struct SystemDependencies {
    settings: ProvisioningSettings,
}

impl SystemDependencies {
    pub fn new(settings: ProvisioningSettings) -> Self {
        Self { settings }
    }

    /// Run `<probe> -version` and report whether it succeeded.
    pub fn probe(&self) -> bool {
        let mut cmd = Command::new(&self.settings.probe_program);
        cmd.arg("-version");
        matches!(process::run_streaming(&mut cmd, |_, _| {}), Ok(out) if out.success())
    }

    /// Probe, then install when enabled and the probe failed.
    ///
    /// `on_line` receives the install command's output.
    pub fn ensure<F>(&self, mut on_line: F) -> DependencyStatus
    where
        F: FnMut(&str, bool),
    {
        if self.probe() {
            tracing::debug!("'{}' is available", self.settings.probe_program);
            return DependencyStatus::Present;
        }

        if !self.settings.install_system_deps {
            tracing::warn!(
                "'{}' not found and system dependency installation is disabled",
                self.settings.probe_program
            );
            return DependencyStatus::Missing {
                probe: self.settings.probe_program.clone(),
            };
        }

        let Some((program, prefix_args)) = self.settings.install_command.split_first() else {
            return DependencyStatus::InstallFailed {
                exit_code: 1,
                message: "install command is empty".to_string(),
            };
        };

        let mut cmd = Command::new(program);
        cmd.args(prefix_args).args(&self.settings.packages);
        tracing::info!(
            "Installing system packages: {}",
            self.settings.packages.join(" ")
        );

        let exit_code = match process::run_streaming(&mut cmd, &mut on_line) {
            Ok(output) => output.exit_code,
            Err(e) => {
                return DependencyStatus::InstallFailed {
                    exit_code: process::EXIT_SPAWN_FAILED,
                    message: format!("failed to start '{}': {}", program, e),
                };
            }
        };

        if exit_code != 0 {
            return DependencyStatus::InstallFailed {
                exit_code,
                message: format!("'{}' exited with code {}", program, exit_code),
            };
        }

        if self.probe() {
            DependencyStatus::Installed
        } else {
            DependencyStatus::InstallFailed {
                exit_code: 1,
                message: format!(
                    "'{}' still unavailable after install",
                    self.settings.probe_program
                ),
            }
        }
    }

    /// Full install command line, for logging.
    pub fn install_command_line(&self) -> String {
        let mut parts = self.settings.install_command.clone();
        parts.extend(self.settings.packages.iter().cloned());
        match parts.split_first() {
            Some((program, args)) => process::display_command(program, args),
            None => String::new(),
        }
    }
}
