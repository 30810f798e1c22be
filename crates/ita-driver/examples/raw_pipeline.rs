//! Raw register programming on the simulated engine
//!
//! Drives the queue primitives by hand with pre-packed words, the way
//! bare-metal firmware does, then prints what the engine executed.

use ita_driver::chip::fields::{pack_flags, pack_layer, pack_tiles};
use ita_driver::{DriverConfig, JobQueue, Result, SimulatedEngine};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("ita_driver=debug")
        .init();

    let config = DriverConfig::default();
    let base = config.window.base();
    let mut queue = JobQueue::new(SimulatedEngine::new(3), &config);

    queue.registers().soft_reset()?;
    for ctx in 0..3_u32 {
        let off = base + ctx * 0x100;
        queue.acquire_slot()?;
        let regs = queue.registers();
        regs.write_requant(0x6867_6665, 0x6A69, 0xD6D5_D4D3, 0xD8D7, 0x0403_0201, 0x0605)?;
        regs.write_job(
            off,
            off + 0x1000,
            off + 0x2000,
            off + 0x3000,
            off + 0x4000,
            pack_tiles(1, 1, 1),
            pack_layer(0, 0),
            pack_flags(u32::from(ctx == 0), u32::from(ctx < 2), 0, 0, 0),
        )?;
        queue.trigger()?;
    }
    queue.wait_idle()?;

    let engine = queue.into_inner();
    for (i, snap) in engine.completed().iter().enumerate() {
        println!(
            "context {i}: input={:#x} flags={:#07b}",
            snap.addresses()[0],
            snap.flags()
        );
    }
    println!("max in flight: {}", engine.max_in_flight());
    Ok(())
}
