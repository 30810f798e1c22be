//! End-to-end queue tests against the simulated engine
//!
//! Runs the reference three-context workload and checks what the engine
//! actually executed against what was programmed.

use ita_driver::prelude::*;
use ita_driver::{BoundedPoll, ContextSnapshot, PollPolicy, WaitCondition};

const BASE: u32 = 0x1000_0000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> DriverConfig {
    DriverConfig::default().with_timeout(std::time::Duration::from_secs(5))
}

/// Context `n` of the reference workload.
fn reference_job(n: u32) -> Job {
    let n8 = u8::try_from(n).unwrap();
    let lanes = |start: u8| -> [u8; 6] {
        std::array::from_fn(|i| start + n8 * 10 + u8::try_from(i).unwrap())
    };
    let flags = match n {
        0 => JobFlags::from_bools(true, true, false, false, false),
        1 => JobFlags::from_bools(false, true, false, false, false),
        _ => JobFlags::empty(),
    };
    Job::new(
        EngineConfig {
            addresses: JobAddresses {
                input: BASE,
                weight: BASE + 0x1000,
                weight_next: BASE + 0x2000,
                bias: BASE + 0x3000,
                output: BASE + 0x4000,
            }
            .offset_by(n * 0x100),
            tiles: TileShape::new(1, 1, 1).unwrap(),
            layer: LayerSelect::new(Layer::Attention, Activation::Identity),
            flags,
        },
        RequantParams::from_lanes(lanes(101), lanes(211), lanes(1)),
    )
}

fn reference_jobs() -> Vec<Job> {
    (0..3).map(reference_job).collect()
}

#[test]
fn reference_workload_runs_in_order() {
    init_tracing();
    let config = config();
    let mut queue = JobQueue::new(SimulatedEngine::new(4), &config);
    let jobs = reference_jobs();

    let report = queue.configure_and_run(&jobs).unwrap();
    assert_eq!(report.contexts, 3);

    let engine = queue.into_inner();
    let expected: Vec<ContextSnapshot> = jobs
        .iter()
        .map(|j| ContextSnapshot::expected(j, &config.window))
        .collect();
    assert_eq!(engine.committed(), &expected[..]);
    assert_eq!(engine.completed(), &expected[..]);
    assert!(engine.max_in_flight() <= 2);
    assert!(!engine.is_busy());
}

#[test]
fn reference_workload_register_words() {
    let config = config();
    let mut queue = JobQueue::new(SimulatedEngine::new(2), &config);
    queue.configure_and_run(&reference_jobs()).unwrap();
    let engine = queue.into_inner();
    let done = engine.completed();

    assert_eq!(done[0].addresses(), [0x0, 0x1000, 0x2000, 0x3000, 0x4000]);
    assert_eq!(done[2].addresses()[0], 0x200);
    assert_eq!(done[0].flags(), 0b00011);
    assert_eq!(done[1].flags(), 0b00010);
    assert_eq!(done[2].flags(), 0);
    assert_eq!(done[1].tiles(), 0x111);
    assert_eq!(done[1].layer(), 0);

    let rq = done[1].requant().lanes();
    assert_eq!(rq.mult, [111, 112, 113, 114, 115, 116]);
    assert_eq!(rq.shift, [221, 222, 223, 224, 225, 226]);
    assert_eq!(rq.add, [11, 12, 13, 14, 15, 16]);
    assert_eq!(done[2].requant().lanes().add, [21, 22, 23, 24, 25, 26]);
}

#[test]
fn running_context_is_isolated_from_later_writes() {
    let config = config();
    let jobs = reference_jobs();
    let mut queue = JobQueue::new(SimulatedEngine::new(50), &config);

    queue.registers().soft_reset().unwrap();
    queue.acquire_slot().unwrap();
    queue.registers().program(&jobs[0]).unwrap();
    queue.commit().unwrap();
    queue.registers().program(&jobs[1]).unwrap();
    queue.trigger().unwrap();

    // The freed slot comes from context 0 retiring; context 1 is now running.
    queue.acquire_slot().unwrap();
    assert_eq!(queue.backend().completed().len(), 1);
    assert!(queue.backend().is_busy());

    queue.registers().program(&jobs[2]).unwrap();
    assert!(queue.backend().is_busy());
    assert_eq!(queue.backend().completed().len(), 1);
    queue.trigger().unwrap();
    queue.wait_idle().unwrap();

    let engine = queue.into_inner();
    for (done, job) in engine.completed().iter().zip(&jobs) {
        assert_eq!(*done, ContextSnapshot::expected(job, &config.window));
    }
    assert_eq!(engine.completed().len(), 3);
}

#[test]
fn sleep_policy_times_out_on_stalled_engine() {
    let config = DriverConfig::default().with_poll(PollPolicy::Sleep {
        interval: std::time::Duration::from_millis(1),
        timeout: std::time::Duration::from_millis(20),
    });
    let mut queue = JobQueue::new(SimulatedEngine::new(1).stalled(), &config);
    let err = queue.configure_and_run(&reference_jobs()).unwrap_err();
    assert!(matches!(
        err,
        ItaError::EngineTimeout {
            condition: WaitCondition::FreeSlot,
            ..
        }
    ));

    // Unstall and let the queue drain under the same policy.
    queue.registers().inner_mut().set_stalled(false);
    queue.wait_idle().unwrap();
    assert_eq!(queue.backend().completed().len(), 2);
}

#[test]
fn pipeline_never_overflows_queue() {
    let config = config();
    for latency in [1, 2, 3, 7, 20] {
        for n in 0..8 {
            let jobs: Vec<Job> = (0..n).map(|i| reference_job(i % 3)).collect();
            let mut queue = JobQueue::new(SimulatedEngine::new(latency), &config);
            let report = queue.configure_and_run(&jobs).unwrap();
            let engine = queue.into_inner();
            assert_eq!(report.contexts, jobs.len());
            assert_eq!(engine.completed().len(), jobs.len());
            assert!(engine.max_in_flight() <= 2, "latency {latency}, {n} jobs");
        }
    }
}

#[test]
fn control_writes_follow_pipeline_shape() {
    let mut queue = JobQueue::new(SimulatedEngine::new(3), &config());
    queue.configure_and_run(&reference_jobs()).unwrap();
    let engine = queue.into_inner();

    let sequence: Vec<(Reg, u32)> = engine
        .writes()
        .iter()
        .copied()
        .filter(|(r, _)| matches!(r, Reg::CtrlTrigger | Reg::SoftReset))
        .collect();
    assert_eq!(
        sequence,
        [
            (Reg::SoftReset, 0),
            (Reg::CtrlTrigger, 1),
            (Reg::CtrlTrigger, 0),
            (Reg::CtrlTrigger, 0),
        ]
    );
    assert_eq!(engine.settle_cycles(), 10);
}

#[test]
fn every_context_writes_flags_last() {
    let mut queue = JobQueue::new(SimulatedEngine::new(3), &config());
    queue.configure_and_run(&reference_jobs()).unwrap();
    let engine = queue.into_inner();

    let context_writes: Vec<Reg> = engine
        .writes()
        .iter()
        .map(|(r, _)| *r)
        .filter(|r| r.context_index().is_some())
        .collect();
    for chunk in context_writes.chunks(14) {
        assert_eq!(chunk[6], Reg::AddrInput);
        assert_eq!(chunk[11], Reg::TileShape);
        assert_eq!(chunk[12], Reg::LayerSelect);
        assert_eq!(chunk[13], Reg::Flags);
    }
}

#[test]
fn acquire_right_after_reset_needs_one_poll() {
    // Fill both slots on a slow engine, then hand it to a one-poll budget.
    let mut queue = JobQueue::new(SimulatedEngine::new(1_000), &config());
    queue.registers().program(&reference_job(0)).unwrap();
    queue.commit().unwrap();
    queue.registers().program(&reference_job(1)).unwrap();
    queue.trigger().unwrap();
    assert_eq!(queue.free_slots().unwrap(), 0);

    let mut queue = JobQueue::with_wait(queue.into_inner(), &config(), BoundedPoll::polls(1));
    queue.registers().soft_reset().unwrap();
    queue.acquire_slot().unwrap();
    assert!(!queue.is_busy().unwrap());
}

#[test]
fn stalled_engine_reports_idle_timeout() {
    let mut queue = JobQueue::with_wait(
        SimulatedEngine::new(1).stalled(),
        &config(),
        BoundedPoll::polls(20),
    );
    let err = queue.configure_and_run(&reference_jobs()[..2]).unwrap_err();
    match err {
        ItaError::EngineTimeout {
            condition, polls, ..
        } => {
            assert_eq!(condition, WaitCondition::Idle);
            assert_eq!(polls, 20);
        }
        other => panic!("expected timeout, got {other}"),
    }
}

#[test]
fn out_of_window_job_rejected_before_any_context_write() {
    let mut job = reference_job(0);
    job.config.addresses.output = BASE + 0x2_0000;
    let mut queue = JobQueue::new(SimulatedEngine::new(1), &config());
    let err = queue.configure_and_run(&[job]).unwrap_err();
    assert!(matches!(
        err,
        ItaError::AddressOutOfWindow {
            register: Reg::AddrOutput,
            ..
        }
    ));
    assert!(queue
        .backend()
        .writes()
        .iter()
        .all(|(r, _)| r.context_index().is_none()));
}

#[test]
fn raw_writes_wrap_addresses_below_window() {
    let mut queue = JobQueue::new(SimulatedEngine::new(1), &config());
    let regs = queue.registers();
    regs.write_job(BASE - 0x100, BASE, BASE, BASE, BASE, 0x111, 0, 0)
        .unwrap();
    assert_eq!(regs.inner().register(Reg::AddrInput), Some(0xFFFF_FF00));
}

#[test]
fn keep_config_reset_reuses_registers() {
    let mut queue = JobQueue::new(SimulatedEngine::new(2), &config());
    queue.configure_and_run(&reference_jobs()[..1]).unwrap();

    queue.registers().soft_reset_keep_config().unwrap();
    queue.acquire_slot().unwrap();
    queue.trigger().unwrap();
    queue.wait_idle().unwrap();

    // The retained context runs again without being reprogrammed.
    let engine = queue.into_inner();
    assert_eq!(engine.committed().len(), 2);
    assert_eq!(engine.completed()[1], engine.completed()[0]);
    assert_eq!(engine.register(Reg::Flags), Some(0b00011));
}

#[test]
fn boxed_backend_drives_queue() {
    let config = config();
    let regs = open_backend(BackendSelection::Software, &config).unwrap();
    let mut queue = JobQueue::new(regs, &config);
    let report = queue.configure_and_run(&reference_jobs()).unwrap();
    assert_eq!(report.contexts, 3);
    assert!(!queue.is_busy().unwrap());
}
