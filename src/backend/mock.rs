//! Recording backend for driver tests.

use std::cell::{Cell, RefCell};

use thiserror::Error;

use super::{FftBackend, FftPlan, LaunchParameters, PlanConfiguration};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MockError {
    #[error("out of device memory")]
    OutOfMemory,
    #[error("engine error code {0}")]
    Code(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Allocate(u64),
    Free(u64),
    BuildPlan(PlanConfiguration),
    Execute { plan: usize, iterations: u64 },
    DestroyPlan(usize),
}

pub struct MockBuffer {
    size: u64,
}

pub struct MockPlan {
    id: usize,
    axis_uploads: Vec<u64>,
}

impl FftPlan for MockPlan {
    fn axis_uploads(&self) -> &[u64] {
        &self.axis_uploads
    }
}

#[derive(Default)]
pub struct MockBackend {
    pub events: RefCell<Vec<Event>>,
    /// Per-iteration times handed out by successive executions, cycled.
    pub timings: Vec<f64>,
    pub axis_uploads: Vec<u64>,
    pub fail_allocation_at: Option<usize>,
    pub fail_build_at: Option<(usize, i32)>,
    pub fail_execute_at: Option<(usize, i32)>,
    allocations: Cell<usize>,
    builds: Cell<usize>,
    executions: Cell<usize>,
}

impl MockBackend {
    pub fn with_timings(timings: Vec<f64>) -> Self {
        Self {
            timings,
            axis_uploads: vec![1, 1, 1],
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| matches(*e)).count()
    }

    fn next(counter: &Cell<usize>) -> usize {
        let n = counter.get();
        counter.set(n + 1);
        n
    }
}

impl FftBackend for MockBackend {
    type Buffer = MockBuffer;
    type Plan = MockPlan;
    type Error = MockError;

    fn allocate(&self, size: u64) -> Result<MockBuffer, MockError> {
        let n = Self::next(&self.allocations);
        if self.fail_allocation_at == Some(n) {
            return Err(MockError::OutOfMemory);
        }
        self.events.borrow_mut().push(Event::Allocate(size));
        Ok(MockBuffer { size })
    }

    fn free(&self, buffer: MockBuffer) {
        self.events.borrow_mut().push(Event::Free(buffer.size));
    }

    fn build_plan(
        &self,
        config: &PlanConfiguration,
        buffer: &MockBuffer,
    ) -> Result<MockPlan, MockError> {
        assert_eq!(buffer.size, config.buffer_size);
        let id = Self::next(&self.builds);
        if let Some((at, code)) = self.fail_build_at {
            if at == id {
                return Err(MockError::Code(code));
            }
        }
        self.events
            .borrow_mut()
            .push(Event::BuildPlan(config.clone()));
        Ok(MockPlan {
            id,
            axis_uploads: self.axis_uploads.clone(),
        })
    }

    fn execute(
        &self,
        plan: &mut MockPlan,
        _launch: &LaunchParameters,
        iterations: u64,
    ) -> Result<f64, MockError> {
        let n = Self::next(&self.executions);
        if let Some((at, code)) = self.fail_execute_at {
            if at == n {
                return Err(MockError::Code(code));
            }
        }
        self.events.borrow_mut().push(Event::Execute {
            plan: plan.id,
            iterations,
        });
        Ok(self.timings[n % self.timings.len()])
    }

    fn destroy_plan(&self, plan: MockPlan) {
        self.events.borrow_mut().push(Event::DestroyPlan(plan.id));
    }
}
