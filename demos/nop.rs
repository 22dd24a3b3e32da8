/*
 * This example just does 1 million NOPs,
 * stressing the rill library and io_uring,
 * without triggering any device IO.
 */

use rill::Op;

fn main() -> rill::Result<()> {
    // start the ring
    let mut config = rill::Config::default();
    config.print_profile_on_drop = true;
    let mut ring = config.start()?;

    let total = 1024 * 1024;
    let mut reaped = 0;

    let pre = std::time::Instant::now();

    for i in 0..total {
        // probe first (an unpushed Sqe returns its slot on drop) so the
        // borrow of `ring` ends before the queue-full path reborrows it
        if ring.get_sqe().is_none() {
            // queue full: hand the batch over and make
            // room in the completion queue
            ring.submit_and_wait(1)?;
            let ready = ring.cq_ready();
            ring.cq_advance(ready);
            reaped += ready;
        }
        let sqe = ring.get_sqe().expect("submission queue drained");
        unsafe { sqe.prep(Op::Nop).user_data(i).push() };
    }

    ring.submit()?;

    while reaped < total as u32 {
        ring.wait_cqe()?;
        let ready = ring.cq_ready();
        ring.cq_advance(ready);
        reaped += ready;
    }

    let post_complete = std::time::Instant::now();

    dbg!(post_complete - pre, ring.metrics());

    Ok(())
}
