//! Suspension controller
//!
//! The engine performs blocking file I/O, but assets arrive asynchronously.
//! When an open misses, the guest is asked to unwind its own stack (using its
//! exported asyncify routines), the host fetches the file, and the guest is
//! rewound to the exact call that missed.
//!
//! ```text
//!            VFS miss: write control words,
//!            call asyncify_start_unwind
//!   Running ─────────────────────────────► Unwinding
//!      ▲                                      │ main() returns,
//!      │ guest re-enters the open import,     │ asyncify_stop_unwind
//!      │ asyncify_stop_rewind                 ▼
//!      └──────────────────────────────────  Sleeping
//!         fetch done: asyncify_start_rewind,
//!         main() re-invoked
//! ```
//!
//! The controller never inspects guest stack contents. Only one fetch can be
//! outstanding: the guest blocks on the open that missed.

use crate::error::SuspendError;
use crate::memory::GuestMemory;
use crate::session::Session;
use std::future::Future;
use wasmtime::{Caller, Store};

/// Where control currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendState {
    /// Guest executing normally
    Running,

    /// Guest is exiting its call stack after a miss
    Unwinding,

    /// Host owns control; the guest stack is frozen in the continuation buffer
    Sleeping,
}

impl SuspendState {
    fn label(self) -> &'static str {
        match self {
            SuspendState::Running => "running",
            SuspendState::Unwinding => "unwinding",
            SuspendState::Sleeping => "sleeping",
        }
    }
}

/// Suspension bookkeeping for one guest instance
#[derive(Debug)]
pub struct SuspensionController {
    state: SuspendState,
    depth: i32,
    pending: Option<String>,
    suspensions: u32,
}

impl Default for SuspensionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SuspensionController {
    pub fn new() -> Self {
        Self {
            state: SuspendState::Running,
            depth: 0,
            pending: None,
            suspensions: 0,
        }
    }

    pub fn state(&self) -> SuspendState {
        self.state
    }

    /// Re-entrancy depth; 0 or 1 in practice
    pub fn depth(&self) -> i32 {
        self.depth
    }

    /// Number of suspensions so far in this session
    pub fn suspensions(&self) -> u32 {
        self.suspensions
    }

    /// Name awaiting fetch, if any
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Running with nothing outstanding
    pub fn is_idle(&self) -> bool {
        self.state == SuspendState::Running && self.depth == 0
    }

    fn invalid(&self, operation: &'static str) -> SuspendError {
        SuspendError {
            operation,
            state: self.state.label(),
        }
    }

    /// Running → Unwinding: record the file to fetch
    pub fn begin_unwind(&mut self, name: String) -> Result<(), SuspendError> {
        if self.state != SuspendState::Running {
            return Err(self.invalid("begin unwind"));
        }
        self.state = SuspendState::Unwinding;
        self.pending = Some(name);
        self.depth += 1;
        self.suspensions += 1;
        Ok(())
    }

    /// Unwinding → Sleeping: hand the pending name to the host
    pub fn sleep(&mut self) -> Result<String, SuspendError> {
        if self.state != SuspendState::Unwinding {
            return Err(self.invalid("sleep"));
        }
        let name = self.pending.take().ok_or_else(|| self.invalid("sleep"))?;
        self.state = SuspendState::Sleeping;
        Ok(name)
    }

    /// Sleeping → Running: the rewound guest is back at the call that missed
    pub fn wake(&mut self) -> Result<(), SuspendError> {
        if self.state != SuspendState::Sleeping {
            return Err(self.invalid("wake"));
        }
        self.state = SuspendState::Running;
        self.depth -= 1;
        Ok(())
    }
}

/// Pause the guest after a miss on `name`
///
/// Called from inside a host import; the import then returns a sentinel and
/// the guest unwinds back out of `main`.
pub(crate) fn suspend(caller: &mut Caller<'_, Session>, name: String) -> anyhow::Result<()> {
    let guest = caller.data().guest()?;
    let control = caller.data().control_block();

    let (bytes, session) = guest.memory.data_and_store_mut(&mut *caller);
    control.prepare(&mut GuestMemory::new(bytes))?;
    session.suspension.begin_unwind(name)?;
    tracing::debug!(
        name = session.suspension.pending().unwrap_or_default(),
        "Suspending guest for fetch"
    );

    guest
        .entry
        .start_unwind
        .call(&mut *caller, control.address())?;
    Ok(())
}

/// Finish a rewind if the guest is re-entering after a fetch
///
/// Returns true when this call is the resumed one.
pub(crate) fn resume_if_sleeping(caller: &mut Caller<'_, Session>) -> anyhow::Result<bool> {
    if caller.data().suspension.state() != SuspendState::Sleeping {
        return Ok(false);
    }
    let guest = caller.data().guest()?;
    guest.entry.stop_rewind.call(&mut *caller, ())?;
    caller.data_mut().suspension.wake()?;
    Ok(true)
}

/// Run the guest's main entry point until it returns without a pending fetch
///
/// `fetch` resolves a missing file; `None` leaves the name absent so the
/// resumed open reports "not found".
pub(crate) async fn run_to_completion<F, Fut>(
    store: &mut Store<Session>,
    mut fetch: F,
) -> anyhow::Result<()>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Option<Vec<u8>>>,
{
    let guest = store.data().guest()?;
    let control = store.data().control_block();

    guest.entry.main.call(&mut *store, ())?;

    loop {
        match store.data().suspension.state() {
            SuspendState::Running => return Ok(()),
            SuspendState::Unwinding => {
                guest.entry.stop_unwind.call(&mut *store, ())?;
                let name = store.data_mut().suspension.sleep()?;

                match fetch(name.clone()).await {
                    Some(content) => {
                        tracing::debug!(name = %name, bytes = content.len(), "Fetched file");
                        store.data_mut().vfs.insert(name, content);
                    }
                    None => tracing::debug!(name = %name, "File unavailable"),
                }

                guest.entry.start_rewind.call(&mut *store, control.address())?;
                guest.entry.main.call(&mut *store, ())?;
            }
            SuspendState::Sleeping => {
                anyhow::bail!("guest returned from rewind without re-entering the suspended call")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut controller = SuspensionController::new();
        assert!(controller.is_idle());

        controller.begin_unwind("pgfcore.code.tex".to_string()).unwrap();
        assert_eq!(controller.state(), SuspendState::Unwinding);
        assert_eq!(controller.depth(), 1);

        let name = controller.sleep().unwrap();
        assert_eq!(name, "pgfcore.code.tex");
        assert_eq!(controller.state(), SuspendState::Sleeping);
        assert!(controller.pending().is_none());

        controller.wake().unwrap();
        assert!(controller.is_idle());
        assert_eq!(controller.suspensions(), 1);
    }

    #[test]
    fn test_rejects_nested_suspension() {
        let mut controller = SuspensionController::new();
        controller.begin_unwind("a.tex".to_string()).unwrap();

        let err = controller.begin_unwind("b.tex".to_string()).unwrap_err();
        assert_eq!(err.state, "unwinding");
        assert_eq!(controller.depth(), 1);
    }

    #[test]
    fn test_rejects_out_of_order_transitions() {
        let mut controller = SuspensionController::new();
        assert!(controller.sleep().is_err());
        assert!(controller.wake().is_err());

        controller.begin_unwind("a.tex".to_string()).unwrap();
        assert!(controller.wake().is_err());
    }
}
