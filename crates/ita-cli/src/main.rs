//! `ita`: command-line interface for the ITA accelerator driver.
//!
//! ```text
//! USAGE:
//!   ita regs                          Print the register map
//!   ita pack tiles <seq> <emb> <proj> Packed TILE_SHAPE word
//!   ita pack layer <layer> [act]      Packed LAYER_SELECT word
//!   ita pack flags [--weight-preload ...]
//!   ita run [--backend software|mmio] Run the reference pipeline
//! ```
//!
//! Driver settings come from `ITA_*` environment variables; `run` flags
//! override them.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ita_chip::{Activation, JobFlags, Layer, LayerSelect, MemoryWindow, Reg, TileShape};
use ita_driver::{
    parse_number, ContextSnapshot, DriverConfig, EngineConfig, Job, JobAddresses, JobQueue,
    MmioRegisters, PollPolicy, RegisterFile, RequantParams, SimulatedEngine,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ita", about = "ITA accelerator job-queue CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print every register with its block and offset.
    Regs,
    /// Print a packed control word.
    Pack {
        #[command(subcommand)]
        word: PackCmd,
    },
    /// Run the reference pipeline and check what the engine executed.
    Run {
        /// Register backend.
        #[arg(long, value_enum, default_value_t = BackendArg::Software)]
        backend: BackendArg,
        /// Number of contexts to queue.
        #[arg(long, default_value_t = 3)]
        contexts: u32,
        /// Simulated job latency, in status polls.
        #[arg(long)]
        latency: Option<u32>,
        /// Per-wait timeout in milliseconds (0 waits forever).
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Memory window base address (decimal or 0x hex).
        #[arg(long)]
        window_base: Option<String>,
    },
}

#[derive(Subcommand)]
enum PackCmd {
    /// TILE_SHAPE from tile counts.
    Tiles { seq: u32, emb: u32, proj: u32 },
    /// LAYER_SELECT from layer and activation.
    Layer {
        #[arg(value_enum)]
        layer: LayerArg,
        #[arg(value_enum, default_value_t = ActivationArg::Identity)]
        activation: ActivationArg,
    },
    /// FLAGS from individual switches.
    Flags {
        #[arg(long)]
        weight_preload: bool,
        #[arg(long)]
        weight_nextload: bool,
        #[arg(long)]
        bias_disable: bool,
        #[arg(long)]
        bias_direction: bool,
        #[arg(long)]
        output_disable: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Software,
    Mmio,
}

#[derive(Clone, Copy, ValueEnum)]
enum LayerArg {
    Attention,
    Feedforward,
    Linear,
}

impl From<LayerArg> for Layer {
    fn from(arg: LayerArg) -> Self {
        match arg {
            LayerArg::Attention => Self::Attention,
            LayerArg::Feedforward => Self::Feedforward,
            LayerArg::Linear => Self::Linear,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ActivationArg {
    Identity,
    Gelu,
    Relu,
}

impl From<ActivationArg> for Activation {
    fn from(arg: ActivationArg) -> Self {
        match arg {
            ActivationArg::Identity => Self::Identity,
            ActivationArg::Gelu => Self::Gelu,
            ActivationArg::Relu => Self::Relu,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Regs => cmd_regs(),
        Cmd::Pack { word } => cmd_pack(word)?,
        Cmd::Run {
            backend,
            contexts,
            latency,
            timeout_ms,
            window_base,
        } => {
            let mut config = DriverConfig::from_env()?;
            if let Some(latency) = latency {
                config = config.with_simulated_latency(latency);
            }
            if let Some(ms) = timeout_ms {
                config = if ms == 0 {
                    config.with_poll(PollPolicy::Busy)
                } else {
                    config.with_timeout(Duration::from_millis(ms))
                };
            }
            if let Some(base) = window_base {
                let base = u32::try_from(parse_number("--window-base", &base)?)
                    .context("--window-base must fit in 32 bits")?;
                let size = config.window.size();
                config = config.with_window(MemoryWindow::new(base, size));
            }
            cmd_run(backend, contexts, &config)?;
        }
    }

    Ok(())
}

fn cmd_regs() {
    println!("{:<16} {:<7} {:>6}", "Register", "Block", "Offset");
    for reg in Reg::ALL {
        println!("{:<16} {:<7} {:#06x}", reg.name(), format!("{:?}", reg.block()), reg.offset());
    }
}

fn cmd_pack(word: PackCmd) -> Result<()> {
    let value = match word {
        PackCmd::Tiles { seq, emb, proj } => TileShape::new(seq, emb, proj)?.word(),
        PackCmd::Layer { layer, activation } => {
            LayerSelect::new(layer.into(), activation.into()).word()
        }
        PackCmd::Flags {
            weight_preload,
            weight_nextload,
            bias_disable,
            bias_direction,
            output_disable,
        } => JobFlags::from_bools(
            weight_preload,
            weight_nextload,
            bias_disable,
            bias_direction,
            output_disable,
        )
        .word(),
    };
    println!("{value:#010x}");
    Ok(())
}

/// Context `n` of the reference workload: addresses step by 0x100 and
/// requant lanes by 10 per context.
fn reference_job(config: &DriverConfig, n: u32) -> Result<Job> {
    let window = &config.window;
    let step = u8::try_from(n % 3).context("context index")? * 10;
    let lanes = |start: u8| -> [u8; 6] {
        let mut out = [0; 6];
        for (lane, v) in (0u8..).zip(out.iter_mut()) {
            *v = start + step + lane;
        }
        out
    };
    let flags = match n {
        0 => JobFlags::WEIGHT_PRELOAD | JobFlags::WEIGHT_NEXTLOAD,
        1 => JobFlags::WEIGHT_NEXTLOAD,
        _ => JobFlags::empty(),
    };
    Ok(Job::new(
        EngineConfig {
            addresses: JobAddresses {
                input: window.absolute(0),
                weight: window.absolute(0x1000),
                weight_next: window.absolute(0x2000),
                bias: window.absolute(0x3000),
                output: window.absolute(0x4000),
            }
            .offset_by(n.wrapping_mul(0x100)),
            tiles: TileShape::new(1, 1, 1)?,
            layer: LayerSelect::new(Layer::Attention, Activation::Identity),
            flags,
        },
        RequantParams::from_lanes(lanes(101), lanes(211), lanes(1)),
    ))
}

fn cmd_run(backend: BackendArg, contexts: u32, config: &DriverConfig) -> Result<()> {
    tracing::debug!("Run config: {config:?}");
    let jobs = (0..contexts)
        .map(|n| reference_job(config, n))
        .collect::<Result<Vec<_>>>()?;

    match backend {
        BackendArg::Software => {
            let engine = run(SimulatedEngine::from_config(config), config, &jobs)?;
            let mismatches = check_completed(&engine, &jobs, &config.window, print_snapshot);
            if engine.completed().len() != jobs.len() {
                bail!(
                    "{} of {} contexts completed",
                    engine.completed().len(),
                    jobs.len()
                );
            }
            if mismatches > 0 {
                bail!("{mismatches} context(s) differ from what was programmed");
            }
            println!("max in flight: {}", engine.max_in_flight());
        }
        BackendArg::Mmio => {
            run(MmioRegisters::open(config)?, config, &jobs)?;
        }
    }
    Ok(())
}

/// Compare what the engine executed with what was programmed, reporting
/// each context. Returns the number of mismatching contexts.
fn check_completed(
    engine: &SimulatedEngine,
    jobs: &[Job],
    window: &MemoryWindow,
    mut report: impl FnMut(usize, &ContextSnapshot, bool),
) -> usize {
    let mut mismatches = 0;
    for (i, (job, done)) in jobs.iter().zip(engine.completed()).enumerate() {
        let expected = ContextSnapshot::expected(job, window);
        let ok = *done == expected;
        if !ok {
            tracing::warn!("Context {i} executed {done:?}, programmed {expected:?}");
            mismatches += 1;
        }
        report(i, done, ok);
    }
    mismatches
}

fn run<R: RegisterFile>(regs: R, config: &DriverConfig, jobs: &[Job]) -> Result<R> {
    let mut queue = JobQueue::new(regs, config);
    let report = queue.configure_and_run(jobs)?;
    println!(
        "{} backend: {} context(s) in {:?}, {} polls, {} slot waits",
        queue.backend().backend_type(),
        report.contexts,
        report.elapsed,
        report.polls,
        report.slot_waits
    );
    Ok(queue.into_inner())
}

fn print_snapshot(index: usize, snap: &ContextSnapshot, ok: bool) {
    let [input, weight, weight_next, bias, output] = snap.addresses();
    let rq = snap.requant();
    println!(
        "[{index}] {} in={input:#x} w={weight:#x} wn={weight_next:#x} b={bias:#x} out={output:#x}",
        if ok { "ok  " } else { "DIFF" }
    );
    println!(
        "     tiles={:#x} layer={:#x} flags={:#07b}",
        snap.tiles(),
        snap.layer(),
        snap.flags()
    );
    println!(
        "     eps={:#010x}/{:#06x} shift={:#010x}/{:#06x} add={:#010x}/{:#06x}",
        rq.eps1, rq.eps2, rq.shift1, rq.shift2, rq.add1, rq.add2
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn software_run(config: &DriverConfig, contexts: u32) -> (SimulatedEngine, Vec<Job>) {
        let jobs: Vec<Job> = (0..contexts)
            .map(|n| reference_job(config, n).unwrap())
            .collect();
        let mut queue = JobQueue::new(SimulatedEngine::from_config(config), config);
        queue.configure_and_run(&jobs).unwrap();
        (queue.into_inner(), jobs)
    }

    #[test]
    fn reference_run_matches_programmed_contexts() {
        let config = DriverConfig::default().with_simulated_latency(3);
        let (engine, jobs) = software_run(&config, 3);
        let mut seen = Vec::new();
        let mismatches = check_completed(&engine, &jobs, &config.window, |i, _, ok| {
            seen.push((i, ok));
        });
        assert_eq!(mismatches, 0);
        assert_eq!(seen, [(0, true), (1, true), (2, true)]);
    }

    #[test]
    fn differing_context_is_counted() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let config = DriverConfig::default();
        let (engine, mut jobs) = software_run(&config, 2);
        jobs[1].config.flags = JobFlags::OUTPUT_DISABLE;
        let mut flagged = Vec::new();
        let mismatches = check_completed(&engine, &jobs, &config.window, |i, _, ok| {
            if !ok {
                flagged.push(i);
            }
        });
        assert_eq!(mismatches, 1);
        assert_eq!(flagged, [1]);
    }
}
