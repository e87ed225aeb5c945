//! Demo command - the scripted two-object cycle against both collectors.
//!
//! Reference counting cannot see past the mutual counts of a cycle, so the
//! first pass frees nothing; the conservative mark/sweep pass that follows
//! reclaims both objects.

use anyhow::Result;
use burrow_gc::Collector;

pub fn run() -> Result<()> {
    let mut gc = Collector::new();

    println!("available memory: {} bytes", gc.available_memory());

    let a = gc.allocate(100)?;
    let b = gc.allocate(100)?;
    println!("allocated a at {a:#x} and b at {b:#x} (100 bytes each)");
    println!("available memory: {} bytes", gc.available_memory());

    gc.add_nested_reference(a, b)?;
    gc.add_nested_reference(b, a)?;
    gc.delete_reference(a);
    gc.delete_reference(b);
    println!("cross-linked a and b into a cycle and dropped both roots");

    let freed = gc.rc_collect();
    println!(
        "rc_collect freed {} object(s); available memory: {} bytes",
        freed.len(),
        gc.available_memory()
    );

    let freed = gc.ms_collect();
    println!(
        "ms_collect freed {} object(s); available memory: {} bytes",
        freed.len(),
        gc.available_memory()
    );

    Ok(())
}
