use crate::error::RuntimeError;
use crate::phases::{self, PhaseMask};
use crate::runtime::Runtime;
use std::time::Duration;

/// What a call to `FramePacer::tick` actually did, so a host loop can decide
/// whether to sleep, poll the network again, or keep draining catch-up
/// ticks (spec.md §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Number of fixed-Δt update steps run this call (0 if starved or
    /// already caught up).
    pub updates_run: u32,
    /// Whether `maxConsecutiveUpdates` was hit, meaning the accumulator
    /// still holds unprocessed time (spec.md §4.9 "Starvation").
    pub capped: bool,
    /// Whether the draw/display/end-frame groups ran this call.
    pub drew: bool,
}

/// Fixed-Δt accumulator driving a `Runtime` through bursts of non-draw steps
/// followed by one draw step per call, mirroring `t51core::world::World`'s
/// separation between `process_systems` (fixed tick) and presentation.
/// Grounded on `t51server`'s main loop and `gamerunner`'s frame driver,
/// neither of which trusts wall-clock delta directly — both accumulate.
pub struct FramePacer {
    dt: Duration,
    accumulator: Duration,
    max_consecutive_updates: u32,
}

impl FramePacer {
    pub fn new(dt: Duration, max_consecutive_updates: u32) -> FramePacer {
        FramePacer {
            dt,
            accumulator: Duration::ZERO,
            max_consecutive_updates,
        }
    }

    pub fn dt(&self) -> Duration {
        self.dt
    }

    /// Feed wall-clock elapsed time in, then drain as many fixed-Δt
    /// non-draw steps as the accumulator allows (capped), and finally run
    /// exactly one draw+display+end-frame step (spec.md §4.9).
    pub fn tick(
        &mut self,
        runtime: &mut Runtime,
        elapsed: Duration,
    ) -> Result<TickOutcome, RuntimeError> {
        self.accumulator += elapsed;

        let mut updates_run = 0;
        while self.accumulator >= self.dt {
            if updates_run >= self.max_consecutive_updates {
                break;
            }
            run_masked_step(runtime, phases::NON_DRAW_MASK)?;
            self.accumulator -= self.dt;
            updates_run += 1;
        }
        let capped = self.accumulator >= self.dt;

        // spec.md §4.9 step 3: "If at least one update ran, run one draw
        // step." A call that starved for lack of elapsed time produces
        // nothing new to present.
        let drew = updates_run > 0;
        if drew {
            run_masked_step(runtime, phases::DRAW_MASK)?;
            run_masked_step(runtime, phases::DISPLAY_MASK)?;
            run_masked_step(runtime, phases::END_FRAME_MASK)?;
        }

        Ok(TickOutcome {
            updates_run,
            capped,
            drew,
        })
    }
}

/// Drive `runtime` through every phase in `mask` as one step, via the
/// cursor-based `start_step`/`advance_step` contract.
fn run_masked_step(runtime: &mut Runtime, mask: PhaseMask) -> Result<(), RuntimeError> {
    runtime.start_step();
    loop {
        if runtime.advance_step(mask)? {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ActiveObject, EventContext, Ownership};
    use crate::phases::{Phase, PhaseMask};
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counter {
        mask: PhaseMask,
        count: Rc<Cell<u32>>,
    }

    impl ActiveObject for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn phases(&self) -> PhaseMask {
            self.mask
        }

        fn on_event(
            &mut self,
            _ctx: &mut EventContext,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.count.set(self.count.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn accumulator_runs_one_update_per_whole_dt_elapsed() {
        let count = Rc::new(Cell::new(0));
        let mut rt = Runtime::new();
        rt.add_object(
            Box::new(Counter {
                mask: Phase::Update1.bit(),
                count: count.clone(),
            }),
            0,
            Ownership::Owned,
        );

        let mut pacer = FramePacer::new(Duration::from_millis(16), 10);
        let outcome = pacer
            .tick(&mut rt, Duration::from_millis(50))
            .expect("tick");

        assert_eq!(outcome.updates_run, 3);
        assert!(!outcome.capped);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn starvation_caps_at_max_consecutive_updates_and_keeps_remainder() {
        let count = Rc::new(Cell::new(0));
        let mut rt = Runtime::new();
        rt.add_object(
            Box::new(Counter {
                mask: Phase::Update1.bit(),
                count: count.clone(),
            }),
            0,
            Ownership::Owned,
        );

        let mut pacer = FramePacer::new(Duration::from_millis(10), 2);
        let outcome = pacer
            .tick(&mut rt, Duration::from_millis(1000))
            .expect("tick");

        assert_eq!(outcome.updates_run, 2);
        assert!(outcome.capped);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn draw_group_is_skipped_when_no_update_ran() {
        let count = Rc::new(Cell::new(0));
        let mut rt = Runtime::new();
        rt.add_object(
            Box::new(Counter {
                mask: Phase::Draw1.bit(),
                count: count.clone(),
            }),
            0,
            Ownership::Owned,
        );

        let mut pacer = FramePacer::new(Duration::from_millis(16), 10);
        let outcome = pacer.tick(&mut rt, Duration::ZERO).expect("tick");

        assert_eq!(outcome.updates_run, 0);
        assert!(!outcome.drew);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn draw_group_runs_once_an_update_ran() {
        let count = Rc::new(Cell::new(0));
        let mut rt = Runtime::new();
        rt.add_object(
            Box::new(Counter {
                mask: Phase::Draw1.bit(),
                count: count.clone(),
            }),
            0,
            Ownership::Owned,
        );

        let mut pacer = FramePacer::new(Duration::from_millis(16), 10);
        let outcome = pacer
            .tick(&mut rt, Duration::from_millis(16))
            .expect("tick");

        assert_eq!(outcome.updates_run, 1);
        assert!(outcome.drew);
        assert_eq!(count.get(), 1);
    }
}
