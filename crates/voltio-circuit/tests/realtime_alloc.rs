//! Allocation accounting on the per-sample path.
//!
//! `prepare` sizes every buffer the solver needs; after that,
//! `process_sample` must never touch the heap, no matter how many
//! Newton iterations a nonlinear circuit takes.

#![allow(unsafe_code)]

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

use voltio_circuit::{DiodeModel, Part, Simulator, GROUND};

static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);

struct CountingAlloc;

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

#[test]
fn process_sample_does_not_allocate() {
    let mut sim = Simulator::new();
    let src = sim
        .add_part(Part::VoltageSource {
            plus: 1,
            minus: GROUND,
            volts: 0.0,
        })
        .unwrap();
    sim.add_part(Part::Resistor {
        a: 1,
        b: 2,
        ohms: 1_000.0,
    })
    .unwrap();
    sim.add_part(Part::DiodePair {
        a: 2,
        b: GROUND,
        model: DiodeModel::silicon(),
    })
    .unwrap();
    sim.prepare(48_000.0).unwrap();

    // Drive into conduction once so the run below iterates for real.
    sim.set_source_voltage(src, 0.8);
    let warmup = sim.process_sample();
    assert!(warmup.iterations > 1, "clipper should need Newton steps");

    let before = ALLOCATIONS.load(Ordering::Relaxed);
    for i in 0..64_u32 {
        sim.set_source_voltage(src, f64::from(i % 7) * 0.3 - 0.9);
        let _ = sim.process_sample();
    }
    let after = ALLOCATIONS.load(Ordering::Relaxed);
    assert_eq!(after, before, "per-sample path touched the heap");
}
