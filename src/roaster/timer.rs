//! Roast timer: one tick per second of monotonic time while a roast is active.

use super::{LoopContext, stop_requested};
use super::shared::SharedState;
use roastero_shared::{Phase, RoastConfig};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// What a single tick did, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Idle,
    Counted,
    SectionAdvanced(usize),
    PhaseChanged(Phase),
}

impl SharedState {
    /// Apply one second of roast time.
    pub(crate) fn tick(&mut self, roast: &RoastConfig) -> TickOutcome {
        let phase = self.state.phase;
        if !phase.is_active() {
            return TickOutcome::Idle;
        }
        self.state.total_time = self.state.total_time.saturating_add(1);
        self.state.section_time = self.state.section_time.saturating_sub(1);
        if self.state.section_time > 0 {
            return TickOutcome::Counted;
        }

        let next = match self.sequencer.as_mut() {
            Some(seq) => {
                if seq.advance() {
                    seq.current_step().cloned().map(|step| (step, seq.current_index()))
                } else {
                    None
                }
            }
            None => None,
        };

        match (phase, next) {
            (Phase::Roasting, Some((step, index))) if !step.is_cooling() => {
                self.apply_step(&step, index);
                TickOutcome::SectionAdvanced(index)
            }
            (Phase::Roasting, next) => {
                self.enter_cooling(next, roast);
                TickOutcome::PhaseChanged(Phase::Cooling)
            }
            (Phase::Cooling, Some((step, index))) => {
                self.apply_step(&step, index);
                TickOutcome::SectionAdvanced(index)
            }
            (_, _) => {
                self.finish_roast();
                TickOutcome::PhaseChanged(Phase::Idle)
            }
        }
    }

    /// Apply every whole second owed since the roast clock started, so a late
    /// wake-up catches up instead of drifting.
    pub(crate) fn catch_up(&mut self, now: Instant, roast: &RoastConfig) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        while let Some(clock) = self.clock.as_mut() {
            let due = now.saturating_duration_since(clock.started_at).as_secs();
            if clock.ticks >= due {
                break;
            }
            clock.ticks += 1;
            outcomes.push(self.tick(roast));
        }
        outcomes
    }

    pub(crate) fn next_tick_deadline(&self) -> Option<Instant> {
        self.clock.map(|clock| clock.started_at + Duration::from_secs(clock.ticks + 1))
    }
}

pub(crate) async fn run(ctx: LoopContext) {
    let LoopContext { shared, config, mut stop, timer_wake, .. } = ctx;
    tracing::debug!("Timer loop started");
    loop {
        let deadline = shared.lock().await.next_tick_deadline();
        tokio::select! {
            _ = stop_requested(&mut stop) => break,
            _ = timer_wake.notified() => continue,
            _ = wait_for(deadline) => {}
        }

        let (outcomes, total_time) = {
            let mut shared = shared.lock().await;
            let outcomes = shared.catch_up(Instant::now(), &config.roast);
            (outcomes, shared.state.total_time)
        };
        if outcomes.len() > 1 {
            tracing::debug!("Timer caught up {} ticks", outcomes.len());
        }
        for outcome in outcomes {
            match outcome {
                TickOutcome::SectionAdvanced(index) => {
                    tracing::info!("Advanced to section {} at {}s", index + 1, total_time);
                }
                TickOutcome::PhaseChanged(phase) => {
                    tracing::info!("Roast phase -> {} at {}s", phase, total_time);
                }
                TickOutcome::Idle | TickOutcome::Counted => {}
            }
        }
    }
    tracing::debug!("Timer loop stopped");
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
