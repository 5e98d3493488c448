use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    None,
    Restoring,
    Alive,
    Lost,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

/// One lifetime span between context creation and loss. Resource objects
/// hold an `Arc` to the generation that created them; invalidating the
/// generation invalidates all of them at once.
#[derive(Debug)]
pub struct Generation {
    id: u64,
    valid: AtomicBool,
}

impl Generation {
    fn new(id: u64, valid: bool) -> Self {
        Self {
            id,
            valid: AtomicBool::new(valid),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

/// Context lifecycle: `None -> Restoring -> Alive`, and
/// `Alive | Restoring -> Lost -> Restoring -> ...`.
pub struct Lifecycle {
    state: LifecycleState,
    generation: Arc<Generation>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::None,
            generation: Arc::new(Generation::new(0, false)),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn generation(&self) -> &Arc<Generation> {
        &self.generation
    }

    pub fn is_lost(&self) -> bool {
        self.state == LifecycleState::Lost
    }

    /// Start (or restart) acquiring a context. Opens a new generation.
    pub fn begin(&mut self) -> Result<Arc<Generation>, LifecycleError> {
        match self.state {
            LifecycleState::None | LifecycleState::Lost => {
                let id = self.generation.id + 1;
                self.generation = Arc::new(Generation::new(id, true));
                self.state = LifecycleState::Restoring;
                info!(generation = id, "context restoring");
                Ok(self.generation.clone())
            }
            from => Err(LifecycleError::InvalidTransition {
                from,
                to: LifecycleState::Restoring,
            }),
        }
    }

    /// The first dispatch cycle on the new context has completed.
    pub fn mark_alive(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Restoring => {
                self.state = LifecycleState::Alive;
                info!(generation = self.generation.id, "context alive");
                Ok(())
            }
            from => Err(LifecycleError::InvalidTransition {
                from,
                to: LifecycleState::Alive,
            }),
        }
    }

    /// Enter `Lost`, invalidating every object of the current generation.
    pub fn lose(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Alive | LifecycleState::Restoring => {
                self.generation.invalidate();
                self.state = LifecycleState::Lost;
                info!(generation = self.generation.id, "context lost");
                Ok(())
            }
            from => Err(LifecycleError::InvalidTransition {
                from,
                to: LifecycleState::Lost,
            }),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
