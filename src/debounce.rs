use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use crate::runtime::Runtime;

/// Collapses bursts of triggers into one action after a quiet period.
///
/// Each [`Debouncer::call`] supersedes any timer still waiting, so only the
/// last trigger of a burst runs. [`Debouncer::cancel`] drops the waiting one.
pub struct Debouncer<R> {
    runtime: R,
    delay: Duration,
    generation: Rc<Cell<u64>>,
}

impl<R: Clone> Clone for Debouncer<R> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            delay: self.delay,
            generation: Rc::clone(&self.generation),
        }
    }
}

impl<R: Runtime> Debouncer<R> {
    pub fn new(runtime: R, delay: Duration) -> Self {
        Self {
            runtime,
            delay,
            generation: Rc::new(Cell::new(0)),
        }
    }

    pub fn call<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let ticket = self.generation.get() + 1;
        self.generation.set(ticket);

        let generation = Rc::clone(&self.generation);
        let timer = self.runtime.sleep(self.delay);
        self.runtime.spawn(async move {
            timer.await;
            if generation.get() == ticket {
                action().await;
            }
        });
    }

    pub fn cancel(&self) {
        self.generation.set(self.generation.get() + 1);
    }
}
