//! Minimal two-stage producer/consumer pipeline.
//!
//! Exercises the public API end to end: a producer Scheduleable precedes a
//! consumer Scheduleable in the DAG, the scheduler sorts and assigns
//! group-ids, and `run` drains ten ticks of traffic. This is intentionally
//! tiny — the illustrative CPU core model this kernel was built to support
//! (fetch/decode/rename/LSU/ROB) is out of scope and lives entirely outside
//! this crate.

use std::cell::RefCell;
use std::rc::Rc;

use tickgraph_common::Phase;
use tickgraph_core::config::SchedulerConfig;
use tickgraph_core::port::{InPort, OutPort};
use tickgraph_core::scheduler::Scheduler;

fn main() {
    let mut scheduler = Scheduler::new(SchedulerConfig::default()).expect("scheduler");
    let clock = scheduler.root_clock().clone();

    let totals: Rc<RefCell<u64>> = Rc::new(RefCell::new(0));
    let totals_in = totals.clone();
    let consumer = InPort::new(&mut scheduler, "consumer", clock, Phase::Tick, 0, move |v: u64| {
        *totals_in.borrow_mut() += v;
        println!("consumed {v}, running total {}", totals_in.borrow());
        Ok(())
    })
    .expect("in port");

    let mut producer = OutPort::new(&mut scheduler, "producer").expect("out port");
    producer.bind(&mut scheduler, &consumer).expect("bind");

    scheduler.finalize().expect("finalize");

    for cycle in 0..10u64 {
        producer.send(&mut scheduler, cycle).expect("send");
        scheduler.run(1).expect("run");
    }

    println!("final total: {}", totals.borrow());
}
