use std::cell::Cell;
use std::rc::Rc;

use crate::{OneShotEvent, Phase, Scheduler, SchedulerConfig};

/// Build a two-Scheduleable chain (`a precedes b`), run it for one tick,
/// and return the order the two handlers fired in.
///
/// This helper is intended for documentation examples to avoid repetitive
/// setup.
///
/// # Example
///
/// ```rust
/// # use tickgraph::doc_examples::run_chain;
/// let order = run_chain()?;
/// assert_eq!(order, vec!["a", "b"]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn run_chain() -> Result<Vec<&'static str>, Box<dyn std::error::Error>> {
    let mut scheduler = Scheduler::new(SchedulerConfig::default())?;
    let a = scheduler.new_vertex("a")?;
    let b = scheduler.new_vertex("b")?;
    scheduler.link(a, b, "a-before-b")?;
    scheduler.finalize()?;

    let order = Rc::new(Cell::new(Vec::new()));
    let order_a = order.clone();
    let order_b = order.clone();
    let clock = scheduler.root_clock().clone();

    let ev_b = OneShotEvent::new("b", clock.clone(), Phase::Tick, 0, b, move || {
        let mut v = order_b.take();
        v.push("b");
        order_b.set(v);
        Ok(())
    });
    let ev_a = OneShotEvent::new("a", clock, Phase::Tick, 0, a, move || {
        let mut v = order_a.take();
        v.push("a");
        order_a.set(v);
        Ok(())
    });

    ev_b.schedule(&mut scheduler, Some(0))?;
    ev_a.schedule(&mut scheduler, Some(0))?;
    scheduler.run(1)?;

    Ok(order.take())
}
