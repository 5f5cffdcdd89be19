//! # virtres-core
//!
//! Low-level Linux primitives for the virtres resource controller.
//!
//! This crate provides safe abstractions over:
//! - **CPU masks**: the realtime vCPU mask and cpuset list grammars.
//! - **Processes**: procfs snapshots and hypervisor process lookup.
//! - **Kernel calls**: `prlimit(2)`, `sched_setscheduler(2)` and CPU
//!   affinity, behind the [`kernel::KernelOps`] trait.
//! - **Cgroups**: v1 and v2 cpuset child groups and thread migration.
//!
//! All unsafe system calls are encapsulated in [`kernel`] with
//! `// SAFETY:` documentation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod cpumask;
pub mod cpuset;
#[allow(unsafe_code)]
pub mod kernel;
pub mod process;
