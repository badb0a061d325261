//! Hierarchical, ratio-based clocks that map model-level cycles to
//! scheduler ticks.

use std::cell::Cell as StdCell;
use std::rc::Rc;

use tickgraph_common::Tick;

struct ClockInner {
    name: String,
    parent: Option<Clock>,
    ratio_num: u32,
    ratio_den: u32,
    active: StdCell<bool>,
}

/// A clock node. Cheap to clone: clones share the same identity.
#[derive(Clone)]
pub struct Clock {
    inner: Rc<ClockInner>,
}

impl Clock {
    /// The root clock: one cycle per scheduler tick.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(ClockInner {
                name: name.into(),
                parent: None,
                ratio_num: 1,
                ratio_den: 1,
                active: StdCell::new(true),
            }),
        }
    }

    /// A child clock ticking at `ratio_num / ratio_den` relative to
    /// `parent`. `ratio_den` must be nonzero.
    pub fn child(parent: &Clock, name: impl Into<String>, ratio_num: u32, ratio_den: u32) -> Self {
        assert!(ratio_den > 0, "clock ratio denominator must be nonzero");
        assert!(ratio_num > 0, "clock ratio numerator must be nonzero");
        Self {
            inner: Rc::new(ClockInner {
                name: name.into(),
                parent: Some(parent.clone()),
                ratio_num,
                ratio_den,
                active: StdCell::new(true),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&Clock> {
        self.inner.parent.as_ref()
    }

    /// This clock's ratio relative to its immediate parent (1/1 for the
    /// root clock).
    pub fn ratio(&self) -> (u32, u32) {
        (self.inner.ratio_num, self.inner.ratio_den)
    }

    /// The cumulative ratio relative to the scheduler's root tick.
    pub fn ratio_to_root(&self) -> (u64, u64) {
        let (mut num, mut den) = (self.inner.ratio_num as u64, self.inner.ratio_den as u64);
        let mut cur = self.inner.parent.clone();
        while let Some(c) = cur {
            num *= c.inner.ratio_num as u64;
            den *= c.inner.ratio_den as u64;
            cur = c.inner.parent.clone();
        }
        (num, den)
    }

    /// Translate an absolute scheduler tick into this clock's local cycle
    /// count: `tick * ratio_num / ratio_den`, floor-rounded.
    pub fn cycle_at(&self, tick: Tick) -> u64 {
        let (num, den) = self.ratio_to_root();
        (tick.0 * num) / den
    }

    /// The next scheduler tick at or after `tick` that lands exactly on one
    /// of this clock's edges. Used by sync ports to make a cross-clock send
    /// visible no earlier than the destination clock's next actual edge —
    /// the deterministic rounding rule the port layer needs at non-integer
    /// clock ratios.
    pub fn next_edge_at_or_after(&self, tick: Tick) -> Tick {
        let (num, den) = self.ratio_to_root();
        if num == 0 {
            return tick;
        }
        // Smallest root tick t >= tick.0 such that (t * num) % den == 0,
        // i.e. t is a multiple of den/gcd(num,den).
        let g = gcd(num, den);
        let period = den / g;
        let rem = tick.0 % period;
        let next = if rem == 0 {
            tick.0
        } else {
            tick.0 + (period - rem)
        };
        Tick(next)
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Mark this clock inactive. Scheduling against a Scheduleable owned
    /// by an inactive clock fails with `ClockInactive`.
    pub fn deactivate(&self) {
        self.inner.active.set(false);
    }
}

impl PartialEq for Clock {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Clock {}

/// Convert a delay expressed in `clock`'s own cycles into a whole number of
/// scheduler root ticks, rounding up so a requested delay never resolves to
/// an earlier root tick than the caller asked for.
pub(crate) fn cycles_to_root_ticks(clock: &Clock, cycles: u64) -> u64 {
    let (num, den) = clock.ratio_to_root();
    if num == 0 {
        return 0;
    }
    // cycles * den / num, rounded up.
    let numerator = cycles.saturating_mul(den);
    numerator.div_ceil(num)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    if a == 0 {
        1
    } else {
        a
    }
}
