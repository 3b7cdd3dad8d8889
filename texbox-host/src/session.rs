//! Per-compile host state
//!
//! A [`Session`] is the data of one wasmtime `Store`: the virtual filesystem,
//! the suspension controller and the handles of the guest it drives. It is
//! built fresh for every compile and dropped with the store afterwards.

use crate::config::HostConfig;
use crate::memory::ControlBlock;
use crate::metrics::FontMetrics;
use crate::runtime::EntryPoints;
use crate::suspend::SuspensionController;
use crate::vfs::Vfs;
use std::sync::Arc;
use wasmtime::Memory;

/// Guest objects the host calls back into
#[derive(Clone)]
pub(crate) struct GuestHandles {
    pub memory: Memory,
    pub entry: EntryPoints,
}

pub struct Session {
    pub(crate) vfs: Vfs,
    pub(crate) suspension: SuspensionController,
    control: ControlBlock,
    guest: Option<GuestHandles>,
}

impl Session {
    /// Fresh state: empty filesystem, terminal script loaded, nothing attached
    pub fn new(config: &HostConfig, metrics: Arc<dyn FontMetrics>, echo: bool) -> Self {
        Self {
            vfs: Vfs::new(config.terminal_input(), metrics, echo),
            suspension: SuspensionController::new(),
            control: ControlBlock::from_config(config),
            guest: None,
        }
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    pub fn vfs_mut(&mut self) -> &mut Vfs {
        &mut self.vfs
    }

    pub fn suspension(&self) -> &SuspensionController {
        &self.suspension
    }

    pub fn control_block(&self) -> ControlBlock {
        self.control
    }

    pub(crate) fn attach(&mut self, memory: Memory, entry: EntryPoints) {
        self.guest = Some(GuestHandles { memory, entry });
    }

    pub(crate) fn guest(&self) -> anyhow::Result<GuestHandles> {
        self.guest
            .clone()
            .ok_or_else(|| anyhow::anyhow!("guest called the host before instantiation finished"))
    }
}
