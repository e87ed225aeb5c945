//! # Burrow GC
//!
//! A fixed-capacity memory arena paired with two reclamation algorithms:
//! reference counting and conservative mark/sweep.
//!
//! ## Design
//!
//! - **Arena**: a single 4096-byte region with an address-ordered,
//!   first-fit free list and full block coalescing
//! - **Conservative scanning**: payloads are plain byte spans; any
//!   pointer-width word that matches a live allocation address is followed
//!   as a reference
//! - **Two disciplines**: reference counting never follows embedded
//!   references when it frees, so mutually referencing cycles survive it by
//!   design; mark/sweep reclaims anything unreachable from the root set,
//!   cycles included
//!
//! Collection only runs when explicitly invoked — nothing triggers on
//! allocation pressure. Everything is single-threaded and synchronous; the
//! types hold raw region pointers and are deliberately not `Send`.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod collector;
pub mod error;
pub mod heap;
pub mod object;

pub use collector::Collector;
pub use error::GcError;
pub use heap::{HEAP_SIZE, Heap};
pub use object::{AllocHeader, FREE_NODE_SIZE, FreeBlock, HEADER_SIZE, WORD_SIZE};
