//! Entry points the node agent calls per VM.
//!
//! A [`ResourceController`] carries the node configuration, the hypervisor
//! backend and the kernel interface. It holds no per-VM state: every call
//! takes a fresh process snapshot. Calls for different VMs may run
//! concurrently; calls for the same VM must be serialized by the caller.

use std::fmt;

use virtres_common::config::ControllerConfig;
use virtres_common::error::Result;
use virtres_common::quantity::Quantity;
use virtres_common::types::{IsolationResult, RenderedDomain, VmSpec};
use virtres_core::cgroup::{CgroupManager, FsCgroupManager};
use virtres_core::kernel::{KernelOps, LinuxKernel};
use virtres_core::process::ProcFs;

use crate::backend::HypervisorBackend;
use crate::isolation::IsolationDetector;
use crate::overhead::{self, OverheadReport};
use crate::{housekeeping, memlock, pit, realtime};

/// Host interfaces one adjustment step works against.
#[derive(Clone, Copy)]
pub struct Host<'a> {
    /// Process filesystem to read from.
    pub procfs: &'a ProcFs,
    /// Kernel calls to issue.
    pub kernel: &'a dyn KernelOps,
    /// Hypervisor the VM runs on.
    pub backend: &'a HypervisorBackend,
}

/// Per-node resource controller.
pub struct ResourceController {
    config: ControllerConfig,
    backend: &'static HypervisorBackend,
    procfs: ProcFs,
    kernel: Box<dyn KernelOps>,
}

impl fmt::Debug for ResourceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceController")
            .field("config", &self.config)
            .field("backend", &self.backend.kind)
            .field("procfs", &self.procfs)
            .finish_non_exhaustive()
    }
}

impl ResourceController {
    /// Creates a controller issuing real system calls.
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_kernel(config, Box::new(LinuxKernel))
    }

    /// Creates a controller issuing kernel calls through `kernel`.
    #[must_use]
    pub fn with_kernel(config: ControllerConfig, kernel: Box<dyn KernelOps>) -> Self {
        let backend = HypervisorBackend::for_kind(config.hypervisor);
        let procfs = ProcFs::new(&config.proc_root);
        tracing::debug!(
            hypervisor = %config.hypervisor,
            arch = %config.cpu_arch,
            proc_root = %config.proc_root.display(),
            "resource controller ready"
        );
        Self {
            config,
            backend,
            procfs,
            kernel,
        }
    }

    /// Node configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Hypervisor backend in use.
    #[must_use]
    pub const fn backend(&self) -> &'static HypervisorBackend {
        self.backend
    }

    /// Process filesystem in use.
    #[must_use]
    pub const fn procfs(&self) -> &ProcFs {
        &self.procfs
    }

    fn host(&self) -> Host<'_> {
        Host {
            procfs: &self.procfs,
            kernel: self.kernel.as_ref(),
            backend: self.backend,
        }
    }

    /// Host memory `vm` needs beyond guest RAM.
    #[must_use]
    pub fn memory_overhead(&self, vm: &VmSpec) -> Quantity {
        overhead::memory_overhead(
            vm,
            self.backend,
            &self.config.cpu_arch,
            self.config.overhead_ratio(),
        )
    }

    /// Itemized form of [`Self::memory_overhead`].
    #[must_use]
    pub fn overhead_report(&self, vm: &VmSpec) -> OverheadReport {
        overhead::overhead_report(
            vm,
            self.backend,
            &self.config.cpu_arch,
            self.config.overhead_ratio(),
        )
    }

    /// Raises the memlock limit of `vm`'s hypervisor process if the VM pins
    /// guest memory.
    ///
    /// # Errors
    ///
    /// Returns an error if isolation lookup, the process scan or the
    /// kernel call fails. A pre-fork manager that is not up yet is not an
    /// error.
    pub fn adjust_resources(&self, vm: &VmSpec, detector: &dyn IsolationDetector) -> Result<()> {
        if !memlock::needs_memlock(vm) {
            tracing::debug!(vm = %vm.name, "memlock limit not needed");
            return Ok(());
        }
        self.adjust_memlock(vm, detector)
    }

    /// Raises the memlock limit of `vm`'s hypervisor process
    /// unconditionally. Hot-plug and migration paths call this after the
    /// VM's memory or devices change.
    ///
    /// # Errors
    ///
    /// See [`Self::adjust_resources`].
    pub fn adjust_memlock(&self, vm: &VmSpec, detector: &dyn IsolationDetector) -> Result<()> {
        let isolation = detector.detect(vm)?;
        memlock::adjust_memlock(&self.host(), &self.config, vm, &isolation)
    }

    /// Cgroup manager for the VM's own cgroup, found through the
    /// launcher's cgroup record.
    ///
    /// # Errors
    ///
    /// Returns an error if the launcher's cgroup record cannot be read.
    pub fn cgroup_manager(&self, isolation: &IsolationResult) -> Result<FsCgroupManager> {
        FsCgroupManager::for_process(&self.procfs, isolation.pid, &self.config.cgroup_root)
    }

    /// Applies the thread-level adjustments for `vm`, in order: the
    /// housekeeping cgroup, realtime vCPU scheduling, then PIT alignment.
    /// Each step checks its own gate.
    ///
    /// # Errors
    ///
    /// Returns the first error; later steps do not run.
    pub fn handle_housekeeping(
        &self,
        vm: &VmSpec,
        detector: &dyn IsolationDetector,
        cgroups: &dyn CgroupManager,
        domain: Option<&RenderedDomain>,
    ) -> Result<()> {
        if housekeeping::should_configure(vm) {
            housekeeping::configure_housekeeping(&self.procfs, self.backend, cgroups, vm, domain)?;
        }

        let schedule = realtime::should_schedule(vm);
        let align = pit::should_align(vm);
        if !schedule && !align {
            return Ok(());
        }

        let isolation = detector.detect(vm)?;
        let snapshot = self.procfs.snapshot()?;
        let host = self.host();
        if schedule {
            tracing::info!(vm = %vm.name, "configuring vCPUs for realtime workloads");
            realtime::schedule_vcpus(&host, &snapshot, vm, &isolation)?;
        }
        if align {
            pit::align_pit_thread(&host, &snapshot, vm, &isolation)?;
        }
        Ok(())
    }
}
