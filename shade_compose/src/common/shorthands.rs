use std::{cell::Cell, num::NonZeroU64};

thread_local!(static NEXT_ID: Cell<NonZeroU64> = const { Cell::new(NonZeroU64::MIN) });

/// returns a number that was never returned before on this thread.
/// Shader object graphs are confined to the thread that created them,
/// so a thread local counter is enough to tell objects apart.
pub(crate) fn next_thread_unique_id() -> NonZeroU64 { NEXT_ID.with(|id| id.increment_by(1)) }

pub trait CellNonZeroU64Ext {
    fn increment_by(&self, amount: u64) -> NonZeroU64;
}

impl CellNonZeroU64Ext for Cell<NonZeroU64> {
    /// returns the current value and stores the incremented one
    fn increment_by(&self, amount: u64) -> NonZeroU64 {
        let current = self.get();
        self.set(current.saturating_add(amount));
        current
    }
}

/// the kind of a shader object never changes after construction, typed
/// handles use this to get at their node data.
macro_rules! unwrap_variant {
    ($value: expr, $pattern: pat => $unwrapped_value: expr) => {
        match $value {
            $pattern => $unwrapped_value,
            _ => panic!("pattern '{}' doesn't match in unwrap_variant", stringify!($pattern)),
        }
    };
}
