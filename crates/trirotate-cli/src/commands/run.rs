use tracing::info;
use trirotate::workflows::rotate::{self, RunObserver};

use crate::cli::RunArgs;
use crate::config::PartialRunConfig;
use crate::error::Result;
use crate::utils::progress::ActivationProgress;

pub fn run(args: RunArgs) -> Result<()> {
    let partial = match &args.config {
        Some(path) => PartialRunConfig::from_file(path)?,
        None => PartialRunConfig::default(),
    };
    let (config, options) = partial.merge_with_cli(&args)?;
    info!(
        side_length = config.side_length,
        set_center = config.set_center,
        seed = config.seed,
        "starting rotation run"
    );

    let progress = ActivationProgress::new(options.max_activations);
    let observer = RunObserver::with_callback(progress.callback());

    let report = rotate::run(&config, &options, &observer)?;

    if report.terminated {
        println!(
            "✓ Terminated after {} activations ({} particles, seed {}).",
            report.activations,
            report.system.len(),
            config.seed
        );
    } else {
        println!(
            "Stopped after {} activations without terminating (seed {}).",
            report.activations, config.seed
        );
    }

    let mut counts: Vec<_> = report.state_counts.iter().collect();
    counts.sort_by_key(|(state, _)| **state);
    println!("Final states:");
    for (state, count) in counts {
        println!("  {state:<12} {count}");
    }

    if args.inspect {
        for i in 0..report.system.len() {
            println!("--- particle {i} ---");
            print!("{}", report.system.at(i).inspection_text());
        }
    }

    Ok(())
}
