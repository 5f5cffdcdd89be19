//! Fakes shared by the unit tests of this crate.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

use tempfile::TempDir;
use virtres_common::error::{Result, VirtResError};
use virtres_core::kernel::{CpuAffinity, KernelOps};
use virtres_core::process::ProcFs;

/// A kernel call the code under test asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelCall {
    Memlock { pid: i32, bytes: u64 },
    Fifo { tid: i32, priority: i32 },
    SetAffinity { tid: i32, cpus: Vec<usize> },
}

/// [`KernelOps`] that records every request instead of performing it.
#[derive(Debug, Default)]
pub struct RecordingKernel {
    calls: RefCell<Vec<KernelCall>>,
    affinities: BTreeMap<i32, CpuAffinity>,
    failing: Option<i32>,
}

impl RecordingKernel {
    pub fn with_affinity(mut self, tid: i32, cpus: &[usize]) -> Self {
        let _ = self.affinities.insert(tid, cpus.iter().copied().collect());
        self
    }

    /// Every call targeting `id` fails with `EPERM`.
    pub fn failing_for(mut self, id: i32) -> Self {
        self.failing = Some(id);
        self
    }

    pub fn calls(&self) -> Vec<KernelCall> {
        self.calls.borrow().clone()
    }

    fn record(&self, op: &'static str, id: i32, call: KernelCall) -> Result<()> {
        if self.failing == Some(id) {
            return Err(VirtResError::Syscall {
                op,
                pid: id,
                value: format!("{call:?}"),
                source: std::io::ErrorKind::PermissionDenied.into(),
            });
        }
        self.calls.borrow_mut().push(call);
        Ok(())
    }
}

impl KernelOps for RecordingKernel {
    fn set_memlock_limit(&self, pid: i32, bytes: u64) -> Result<()> {
        self.record("prlimit", pid, KernelCall::Memlock { pid, bytes })
    }

    fn set_fifo_priority(&self, tid: i32, priority: i32) -> Result<()> {
        self.record("sched_setscheduler", tid, KernelCall::Fifo { tid, priority })
    }

    fn affinity(&self, tid: i32) -> Result<CpuAffinity> {
        self.affinities
            .get(&tid)
            .cloned()
            .ok_or_else(|| VirtResError::Syscall {
                op: "sched_getaffinity",
                pid: tid,
                value: "current mask".into(),
                source: std::io::ErrorKind::NotFound.into(),
            })
    }

    fn set_affinity(&self, tid: i32, affinity: &CpuAffinity) -> Result<()> {
        let cpus = affinity.cpus().collect();
        self.record("sched_setaffinity", tid, KernelCall::SetAffinity { tid, cpus })
    }
}

/// A directory tree shaped like `/proc`.
#[derive(Debug)]
pub struct FakeProc {
    dir: TempDir,
}

impl FakeProc {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn procfs(&self) -> ProcFs {
        ProcFs::new(self.dir.path())
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.dir.path().join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, content).expect("write");
    }

    pub fn process(&self, pid: i32, parent_pid: i32, comm: &str) -> &Self {
        self.write(&format!("{pid}/stat"), &stat_line(pid, parent_pid, comm));
        self.write(&format!("{pid}/task/{pid}/stat"), &stat_line(pid, parent_pid, comm));
        self
    }

    /// Adds a thread to `pid`. The kernel resolves `/proc/<tid>` without
    /// listing it; a tempdir cannot hide it, so the top-level entry names
    /// the owning process as parent to keep it out of the isolated root's
    /// children.
    pub fn thread(&self, pid: i32, tid: i32, comm: &str) -> &Self {
        self.write(&format!("{pid}/task/{tid}/stat"), &stat_line(tid, pid, comm));
        self.write(&format!("{tid}/stat"), &stat_line(tid, pid, comm));
        self
    }

    pub fn nspid(&self, pid: i32, nspid: &str) -> &Self {
        self.write(&format!("{pid}/status"), &status_text(pid, "worker", nspid));
        self
    }
}

/// A full `stat` record as a current kernel writes it.
pub fn stat_line(pid: i32, ppid: i32, comm: &str) -> String {
    format!(
        "{pid} ({comm}) S {ppid} {pid} {pid} 0 -1 4194560 100 0 0 0 10 5 0 0 20 0 1 0 \
         1000 1000000 100 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 \
         0 0 0 0 0 0 0 0\n"
    )
}

/// A full `status` record carrying the given `NSpid` ids.
pub fn status_text(pid: i32, name: &str, nspid: &str) -> String {
    format!(
        "Name:\t{name}\nUmask:\t0022\nState:\tS (sleeping)\nTgid:\t{pid}\nNgid:\t0\n\
         Pid:\t{pid}\nPPid:\t1\nTracerPid:\t0\nUid:\t107\t107\t107\t107\n\
         Gid:\t107\t107\t107\t107\nFDSize:\t64\nGroups:\t107\nNStgid:\t{nspid}\n\
         NSpid:\t{nspid}\nNSpgid:\t{nspid}\nNSsid:\t{nspid}\nThreads:\t1\n\
         SigQ:\t0/63413\nSigPnd:\t0000000000000000\nShdPnd:\t0000000000000000\n\
         SigBlk:\t0000000000000000\nSigIgn:\t0000000000001000\n\
         SigCgt:\t0000000100000000\nCapInh:\t0000000000000000\n\
         CapPrm:\t0000000000000000\nCapEff:\t0000000000000000\n\
         CapBnd:\t000001ffffffffff\nCapAmb:\t0000000000000000\nNoNewPrivs:\t0\n\
         Seccomp:\t0\nCpus_allowed:\tff\nCpus_allowed_list:\t0-7\n\
         Mems_allowed:\t00000000,00000001\nMems_allowed_list:\t0\n\
         voluntary_ctxt_switches:\t10\nnonvoluntary_ctxt_switches:\t1\n"
    )
}
