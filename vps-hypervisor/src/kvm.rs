//! libvirt/KVM driver built on `virsh`, `virt-install` and `qemu-img`.
//!
//! Every command is spawned as a program plus an argument vector. VM names are
//! validated before they reach any argument, so user-controlled fields can
//! never be interpreted by a shell or parsed as options.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};
use vps_core::command_stream::{is_tool_installed, run_command};
use vps_core::validation::{validate_positive, validate_vm_name};

use crate::{DomainState, Hypervisor, HypervisorError, Result, VmSpecs};

const DEFAULT_IMAGE_DIR: &str = "/var/lib/libvirt/images";
const DEFAULT_OS_VARIANT: &str = "ubuntu20.04";
const DEFAULT_NETWORK: &str = "default";
const REQUIRED_TOOLS: [&str; 3] = ["virsh", "virt-install", "qemu-img"];

#[derive(Debug, Clone)]
pub struct KvmConfig {
    /// Directory holding one `<vm_name>.qcow2` disk per domain
    pub image_dir: PathBuf,
    /// Optional libvirt connection URI (e.g. `qemu:///system`)
    pub libvirt_uri: Option<String>,
    pub os_variant: String,
    pub network: String,
    /// Upper bound for each external command; the child is killed when exceeded
    pub command_timeout: Option<Duration>,
}

impl Default for KvmConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            libvirt_uri: None,
            os_variant: DEFAULT_OS_VARIANT.to_string(),
            network: DEFAULT_NETWORK.to_string(),
            command_timeout: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KvmHypervisor {
    config: KvmConfig,
}

impl KvmHypervisor {
    pub fn new(config: KvmConfig) -> Result<Self> {
        for tool in REQUIRED_TOOLS {
            if !is_tool_installed(tool) {
                return Err(HypervisorError::DependencyNotFound(tool.to_string()));
            }
        }
        Self::without_preflight(config)
    }

    /// Build the driver without checking that the libvirt tools are installed.
    pub fn without_preflight(config: KvmConfig) -> Result<Self> {
        // virt-install splits --disk values on ','
        if config.image_dir.to_string_lossy().contains(',') {
            return Err(HypervisorError::InvalidRequest(format!(
                "Image directory must not contain ',': {}",
                config.image_dir.display()
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &KvmConfig {
        &self.config
    }

    pub fn disk_path(&self, vm_name: &str) -> PathBuf {
        self.config.image_dir.join(format!("{}.qcow2", vm_name))
    }

    fn virsh_args(&self, subcommand: &str, vm_name: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(uri) = &self.config.libvirt_uri {
            args.push("-c".to_string());
            args.push(uri.clone());
        }
        args.push(subcommand.to_string());
        args.push(vm_name.to_string());
        args
    }

    fn qemu_img_args(&self, disk: &Path, specs: &VmSpecs) -> Vec<String> {
        vec![
            "create".to_string(),
            "-f".to_string(),
            "qcow2".to_string(),
            disk.to_string_lossy().into_owned(),
            format!("{}G", specs.disk_gib),
        ]
    }

    fn virt_install_args(&self, vm_name: &str, disk: &Path, specs: &VmSpecs) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(uri) = &self.config.libvirt_uri {
            args.push("--connect".to_string());
            args.push(uri.clone());
        }
        args.extend([
            "--name".to_string(),
            vm_name.to_string(),
            "--memory".to_string(),
            (u64::from(specs.ram_gib) * 1024).to_string(),
            "--vcpus".to_string(),
            specs.vcpu.to_string(),
            "--disk".to_string(),
            format!("path={}", disk.display()),
            "--os-variant".to_string(),
            self.config.os_variant.clone(),
            "--network".to_string(),
            format!("network={}", self.config.network),
            "--graphics".to_string(),
            "none".to_string(),
            "--noautoconsole".to_string(),
            "--import".to_string(),
        ]);
        args
    }

    fn run(&self, program: &str, args: &[String]) -> Result<String> {
        Ok(run_command(program, args, self.config.command_timeout)?)
    }

    fn virsh(&self, subcommand: &str, vm_name: &str) -> Result<String> {
        validate_vm_name(vm_name)?;
        self.run("virsh", &self.virsh_args(subcommand, vm_name))
    }
}

fn validate_specs(specs: &VmSpecs) -> Result<()> {
    validate_positive("ram", u64::from(specs.ram_gib))?;
    validate_positive("cpu", u64::from(specs.vcpu))?;
    validate_positive("disk", u64::from(specs.disk_gib))?;
    Ok(())
}

impl Hypervisor for KvmHypervisor {
    fn name(&self) -> &'static str {
        "kvm"
    }

    fn create(&self, vm_name: &str, specs: &VmSpecs) -> Result<String> {
        validate_vm_name(vm_name)?;
        validate_specs(specs)?;

        let disk = self.disk_path(vm_name);
        self.run("qemu-img", &self.qemu_img_args(&disk, specs))?;

        match self.run("virt-install", &self.virt_install_args(vm_name, &disk, specs)) {
            Ok(output) => {
                info!(vm_name, %specs, "domain created");
                Ok(output)
            }
            Err(e) => {
                // No domain exists, so the fresh disk is the only thing to clean up
                if let Err(cleanup) = std::fs::remove_file(&disk) {
                    warn!(
                        vm_name,
                        disk = %disk.display(),
                        "failed to remove disk after failed create: {}",
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }

    fn start(&self, vm_name: &str) -> Result<String> {
        self.virsh("start", vm_name)
    }

    fn stop(&self, vm_name: &str) -> Result<String> {
        self.virsh("destroy", vm_name)
    }

    fn undefine(&self, vm_name: &str) -> Result<String> {
        self.virsh("undefine", vm_name)
    }

    fn remove_storage(&self, vm_name: &str) -> Result<String> {
        validate_vm_name(vm_name)?;
        let disk = self.disk_path(vm_name);
        match std::fs::remove_file(&disk) {
            Ok(()) => Ok(format!("removed {}", disk.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(format!("{} already absent", disk.display()))
            }
            Err(e) => Err(HypervisorError::Command(format!(
                "failed to remove {}: {}",
                disk.display(),
                e
            ))),
        }
    }

    fn domain_state(&self, vm_name: &str) -> Result<DomainState> {
        let output = self.virsh("domstate", vm_name)?;
        Ok(DomainState::parse(&output))
    }
}
