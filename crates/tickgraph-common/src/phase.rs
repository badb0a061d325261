use std::fmt;

/// The seven totally ordered scheduling phases within a single tick.
///
/// Declaration order is significant: `Phase`'s derived `Ord` is the firing
/// order used by the scheduler, and `ALL` must stay in sync with it.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Conditional arming of the tick.
    Trigger = 0,
    /// State-writing events that must precede port propagation.
    Update = 1,
    /// Propagation of signals/data across port bindings.
    PortUpdate = 2,
    /// Pipeline flushes (speculative state cleanup).
    Flush = 3,
    /// Telemetry/collection hooks.
    Collection = 4,
    /// Normal model logic.
    Tick = 5,
    /// Finalizers that must see the settled tick state.
    PostTick = 6,
}

impl Phase {
    pub const COUNT: usize = 7;

    pub const ALL: [Phase; Phase::COUNT] = [
        Phase::Trigger,
        Phase::Update,
        Phase::PortUpdate,
        Phase::Flush,
        Phase::Collection,
        Phase::Tick,
        Phase::PostTick,
    ];

    #[inline]
    pub fn as_index(self) -> usize {
        self as u8 as usize
    }

    #[inline]
    pub fn from_index(idx: usize) -> Option<Phase> {
        Phase::ALL.get(idx).copied()
    }

    /// The phase that follows this one within the same tick, if any.
    pub fn next(self) -> Option<Phase> {
        Phase::from_index(self.as_index() + 1)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Trigger => "Trigger",
            Phase::Update => "Update",
            Phase::PortUpdate => "PortUpdate",
            Phase::Flush => "Flush",
            Phase::Collection => "Collection",
            Phase::Tick => "Tick",
            Phase::PostTick => "PostTick",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_declaration() {
        for w in Phase::ALL.windows(2) {
            assert!(w[0] < w[1], "{:?} should precede {:?}", w[0], w[1]);
        }
    }

    #[test]
    fn next_chains_through_all_phases() {
        let mut p = Phase::Trigger;
        let mut count = 1;
        while let Some(n) = p.next() {
            p = n;
            count += 1;
        }
        assert_eq!(p, Phase::PostTick);
        assert_eq!(count, Phase::COUNT);
    }
}
