use std::process;

use anyhow::{Context, bail};

use tourney::{Coordinator, RunReport, TournamentConfig, VersionInfo, is_supported_count};

#[derive(Debug, PartialEq, Eq)]
struct Args {
    participants: usize,
    iterations: usize,
    report: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run(Args),
    Help,
    Version,
}

const USAGE: &str = "\
Usage: tournament <participants> [--iterations <n>] [--report]

Arguments:
  <participants>      Number of participants: 2, 4, 8 or 16

Options:
  --iterations <n>    Critical sections per participant [default: 1]
  --report            Print a JSON run report to stdout
  --version           Print version information";

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let args = match parse_args(&args) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            println!("{USAGE}");
            return;
        }
        Ok(Command::Version) => {
            println!("{}", VersionInfo::new());
            return;
        }
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!();
            eprintln!("{USAGE}");
            process::exit(1);
        }
    };

    tourney::logging::init_tracing();

    if let Err(e) = run(args).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut participants: Option<usize> = None;
    let mut iterations = 1;
    let mut report = false;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--iterations" => {
                i += 1;
                let value = args.get(i).ok_or("--iterations requires a value")?;
                iterations = value
                    .parse()
                    .map_err(|_| format!("invalid iteration count: {value}"))?;
                if iterations == 0 {
                    return Err("--iterations must be at least 1".to_string());
                }
            }
            "--report" => report = true,
            "--version" | "-V" => return Ok(Command::Version),
            "--help" | "-h" => return Ok(Command::Help),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => {
                if participants.is_some() {
                    return Err(format!("unexpected argument: {arg}"));
                }
                let count = arg
                    .parse()
                    .map_err(|_| format!("invalid participant count: {arg}"))?;
                if !is_supported_count(count) {
                    return Err(format!(
                        "invalid participant count {count}: must be one of 2, 4, 8 or 16"
                    ));
                }
                participants = Some(count);
            }
        }
        i += 1;
    }

    let participants = participants.ok_or("missing required argument: <participants>")?;
    Ok(Command::Run(Args {
        participants,
        iterations,
        report,
    }))
}

fn announce(index: usize, _iteration: usize) {
    let thread = std::thread::current();
    let name = thread.name().unwrap_or("coordinator");
    println!("Participant {index} ({name}) is in the critical section");
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = TournamentConfig::new(args.participants).with_iterations(args.iterations);
    let arena = std::sync::Arc::clone(&config.arena);

    let coordinator = Coordinator::build(config, announce).context("tournament build failed")?;
    let report = RunReport::starting(coordinator.tree(), args.iterations);

    let (mut coordinator, own) = tokio::task::spawn_blocking(move || {
        let mut coordinator = coordinator;
        let own = coordinator.run_own();
        (coordinator, own)
    })
    .await
    .context("coordinator task failed")?;

    // Spawned participants are collected even when participant 0 failed.
    let joined = coordinator.wait_for_participants().await;
    if let tourney::ParticipantOutcome::Failed { reason } = &own.outcome {
        bail!("participant 0 failed: {reason}");
    }
    let mut outcomes = joined.context("participant failed")?;

    println!("Cleaning up tournament lock structure...");
    coordinator
        .destroy()
        .context("tournament destroy failed")?;

    if args.report {
        outcomes.push(own);
        let report = report.completed(outcomes, arena.contended_spins());
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
