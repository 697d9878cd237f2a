// Allocation tracking for the queue hot path.
//
// dhat only allows one profiler at a time, so these tests are serialized.
//
// cargo test --test allocation_tracking -- --nocapture

use microkernel::Bus::Queue::SpscQueue;
use microkernel::Core::Arena;
use microkernel::Message;
use std::sync::Arc;

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[test]
#[serial_test::serial]
fn push_pop_do_not_allocate() {
    let _profiler = dhat::Profiler::builder().testing().build();

    let capacity = 1024;
    let arena = Arc::new(Arena::for_queues(capacity, 1).unwrap());
    let q: SpscQueue = arena.alloc_queue(capacity).unwrap();
    let msg = Message::with_payload(3, b"steady state").unwrap();

    let before = dhat::HeapStats::get();
    for _ in 0..10 {
        for _ in 0..capacity {
            assert!(unsafe { q.push(&msg) });
        }
        while let Some(out) = unsafe { q.pop() } {
            assert_eq!(out.payload(), b"steady state");
        }
    }
    let after = dhat::HeapStats::get();

    println!(
        "blocks before: {}, after: {}",
        before.total_blocks, after.total_blocks
    );
    dhat::assert_eq!(after.total_blocks, before.total_blocks);
    dhat::assert_eq!(after.total_bytes, before.total_bytes);
}
