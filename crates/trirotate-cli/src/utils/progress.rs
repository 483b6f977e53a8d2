//! Terminal progress for a rotation run, driven by the workflow's
//! [`RunEvent`] milestones.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use trirotate::workflows::rotate::{RunCallback, RunEvent};

/// A single bar counting activations: bounded when the run carries an
/// activation cap, a plain spinner otherwise. Epoch milestones advance it,
/// and the bar clears itself once the scheduler stops so the summary prints
/// on a clean line.
pub struct ActivationProgress {
    bar: ProgressBar,
}

impl ActivationProgress {
    pub fn new(max_activations: Option<u64>) -> Self {
        let bar = match max_activations {
            Some(cap) => {
                let bar = ProgressBar::new(cap);
                bar.set_style(
                    ProgressStyle::with_template("[{bar:40}] {pos}/{len} activations {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.green} {pos} activations {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        };
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        Self { bar }
    }

    /// The callback handed to the run workflow.
    pub fn callback(&self) -> RunCallback<'static> {
        let bar = self.bar.clone();
        Box::new(move |event: &RunEvent| match *event {
            RunEvent::TriangleBuilt { particles } => {
                bar.set_message(format!("({particles} particles)"));
            }
            RunEvent::EpochCompleted { epoch, activations } => {
                bar.set_position(activations);
                bar.set_message(format!("(epoch {epoch})"));
            }
            RunEvent::RunStopped { activations, .. } => {
                bar.set_position(activations);
                bar.finish_and_clear();
            }
        })
    }
}
