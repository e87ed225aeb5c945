//! End-to-end scenarios for the arena and both collection disciplines.

use burrow_gc::{Collector, FREE_NODE_SIZE, HEADER_SIZE, HEAP_SIZE};

const INITIAL_FREE: usize = HEAP_SIZE - FREE_NODE_SIZE;

/// Parse the free-block sizes back out of the debug dump.
fn free_blocks(gc: &mut Collector) -> Vec<usize> {
    gc.dump()
        .trim_end()
        .split("->")
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .trim_start_matches("Free(")
                .trim_end_matches(')')
                .parse()
                .unwrap()
        })
        .collect()
}

/// Assert the arena accounting identity: free bytes plus live header+payload
/// bytes plus per-block node overhead always equals the full capacity.
fn assert_accounted(gc: &mut Collector, live_payload_sizes: &[usize]) {
    let blocks = free_blocks(gc);
    let free: usize = blocks.iter().sum();
    let live: usize = live_payload_sizes
        .iter()
        .map(|size| size + HEADER_SIZE)
        .sum();
    assert_eq!(free + live + blocks.len() * FREE_NODE_SIZE, HEAP_SIZE);
}

#[test]
fn test_initial_available_memory() {
    let mut gc = Collector::new();
    assert_eq!(gc.available_memory(), INITIAL_FREE);
    assert_accounted(&mut gc, &[]);
}

#[test]
fn test_two_allocations_concrete_scenario() {
    let mut gc = Collector::new();
    let a = gc.allocate(100).unwrap();
    let b = gc.allocate(100).unwrap();
    gc.add_nested_reference(a, b).unwrap();
    gc.add_nested_reference(b, a).unwrap();

    assert_eq!(
        gc.available_memory(),
        HEAP_SIZE - FREE_NODE_SIZE - 2 * (100 + HEADER_SIZE)
    );
    assert_accounted(&mut gc, &[100, 100]);
}

#[test]
fn test_cycle_survives_reference_counting() {
    let mut gc = Collector::new();
    let a = gc.allocate(100).unwrap();
    let b = gc.allocate(100).unwrap();
    gc.add_nested_reference(a, b).unwrap();
    gc.add_nested_reference(b, a).unwrap();
    gc.delete_reference(a);
    gc.delete_reference(b);

    // Both members still carry a mutual count of one, so nothing goes.
    let freed = gc.rc_collect();
    assert!(freed.is_empty());
    assert_eq!(
        gc.available_memory(),
        HEAP_SIZE - FREE_NODE_SIZE - 2 * (100 + HEADER_SIZE)
    );
}

#[test]
fn test_mark_sweep_reclaims_cycle() {
    let mut gc = Collector::new();
    let a = gc.allocate(100).unwrap();
    let b = gc.allocate(100).unwrap();
    gc.add_nested_reference(a, b).unwrap();
    gc.add_nested_reference(b, a).unwrap();
    gc.delete_reference(a);
    gc.delete_reference(b);

    gc.rc_collect();
    let mut freed = gc.ms_collect();
    freed.sort_unstable();
    let mut expected = vec![a, b];
    expected.sort_unstable();

    assert_eq!(freed, expected);
    assert_eq!(gc.available_memory(), INITIAL_FREE);
    assert_accounted(&mut gc, &[]);
}

#[test]
fn test_mark_sweep_is_idempotent_on_clean_heap() {
    let mut gc = Collector::new();
    let before = gc.available_memory();
    assert!(gc.ms_collect().is_empty());
    assert_eq!(gc.available_memory(), before);

    // Same after a full collect-everything pass.
    let ptr = gc.allocate(100).unwrap();
    gc.delete_reference(ptr);
    gc.ms_collect();
    let clean = gc.available_memory();
    assert!(gc.ms_collect().is_empty());
    assert_eq!(gc.available_memory(), clean);
}

#[test]
fn test_exhaustion_then_full_reclamation() {
    let mut gc = Collector::new();
    let block_size = 32;

    let mut ptrs = Vec::new();
    loop {
        match gc.allocate(block_size) {
            Ok(ptr) => ptrs.push(ptr),
            Err(_) => break,
        }
    }
    assert!(!ptrs.is_empty());
    assert!(gc.available_memory() < block_size);

    // Chain each allocation to the next, then drop every root.
    for pair in ptrs.windows(2) {
        gc.add_nested_reference(pair[0], pair[1]).unwrap();
    }
    for &ptr in &ptrs {
        gc.delete_reference(ptr);
    }

    let freed = gc.ms_collect();
    assert_eq!(freed.len(), ptrs.len());
    assert_eq!(gc.available_memory(), INITIAL_FREE);

    // The whole arena is one block again; the biggest possible payload
    // must fit in it.
    let big = gc.allocate(INITIAL_FREE - HEADER_SIZE).unwrap();
    assert_ne!(big, 0);

    gc.delete_reference(big);
    gc.ms_collect();
    assert_eq!(gc.available_memory(), INITIAL_FREE);
}

#[test]
fn test_accounting_holds_across_interleaved_operations() {
    let mut gc = Collector::new();
    let a = gc.allocate(40).unwrap();
    let b = gc.allocate(200).unwrap();
    let c = gc.allocate(9).unwrap();
    assert_accounted(&mut gc, &[40, 200, 9]);

    gc.delete_reference(b);
    gc.rc_collect();
    assert_accounted(&mut gc, &[40, 9]);

    let d = gc.allocate(100).unwrap();
    assert_accounted(&mut gc, &[40, 9, 100]);

    gc.delete_reference(a);
    gc.delete_reference(c);
    gc.delete_reference(d);
    gc.ms_collect();
    assert_accounted(&mut gc, &[]);
}

#[test]
fn test_freed_lists_feed_external_name_tables() {
    // The shell layers a name table over the core and prunes it with the
    // freed-address lists; simulate that contract here.
    let mut gc = Collector::new();
    let mut names = vec![("a", gc.allocate(50).unwrap()), ("b", gc.allocate(50).unwrap())];

    gc.delete_reference(names[0].1);
    let freed = gc.rc_collect();
    names.retain(|(_, addr)| !freed.contains(addr));

    assert_eq!(names.len(), 1);
    assert_eq!(names[0].0, "b");
}
