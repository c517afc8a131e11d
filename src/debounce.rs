/// Per-window coalescing of reconciliation triggers
use crate::tab_data::WindowId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(150);

/// Which windows a pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKey {
    All,
    Window(WindowId),
}

impl WindowKey {
    pub fn from_window(window: Option<WindowId>) -> WindowKey {
        window.map_or(WindowKey::All, WindowKey::Window)
    }

    pub fn window(self) -> Option<WindowId> {
        match self {
            WindowKey::All => None,
            WindowKey::Window(id) => Some(id),
        }
    }
}

/// Delayed one-shot task execution
pub trait Scheduler {
    type Handle;

    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> Self::Handle;

    /// Cancel a task that has not started yet; a no-op for tasks already run
    fn cancel(&self, handle: Self::Handle);
}

struct Pending<H> {
    generation: u64,
    handle: H,
}

struct DebounceState<H> {
    next_generation: u64,
    pending: HashMap<WindowKey, Pending<H>>,
}

/// Runs at most one task per key per quiet period.
///
/// A trigger for a key with a pending task cancels that task and schedules
/// the new one. Tasks that already started are never interrupted.
pub struct Debouncer<S: Scheduler> {
    scheduler: S,
    delay: Duration,
    state: Rc<RefCell<DebounceState<S::Handle>>>,
}

impl<S> Debouncer<S>
where
    S: Scheduler,
    S::Handle: 'static,
{
    pub fn new(scheduler: S, delay: Duration) -> Debouncer<S> {
        Debouncer {
            scheduler,
            delay,
            state: Rc::new(RefCell::new(DebounceState {
                next_generation: 0,
                pending: HashMap::new(),
            })),
        }
    }

    pub fn trigger(&self, key: WindowKey, task: impl FnOnce() + 'static) {
        let (previous, generation) = {
            let mut state = self.state.borrow_mut();
            state.next_generation += 1;
            (state.pending.remove(&key), state.next_generation)
        };

        if let Some(previous) = previous {
            log::debug!("Rescheduling pending pass for {:?}", key);
            self.scheduler.cancel(previous.handle);
        }

        let state = Rc::clone(&self.state);
        let handle = self.scheduler.schedule(
            self.delay,
            Box::new(move || {
                // A cancelled timer that fires anyway must not run a superseded task
                let current = {
                    let mut state = state.borrow_mut();
                    match state.pending.get(&key) {
                        Some(pending) if pending.generation == generation => {
                            state.pending.remove(&key);
                            true
                        }
                        _ => false,
                    }
                };
                if current {
                    task();
                }
            }),
        );

        self.state
            .borrow_mut()
            .pending
            .insert(key, Pending { generation, handle });
    }

    pub fn is_pending(&self, key: WindowKey) -> bool {
        self.state.borrow().pending.contains_key(&key)
    }

    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn cancel_all(&self) {
        let drained: Vec<Pending<S::Handle>> = self.state.borrow_mut().pending.drain().map(|(_, p)| p).collect();
        for pending in drained {
            self.scheduler.cancel(pending.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualScheduler;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<WindowKey>>>, impl Fn(WindowKey) -> Box<dyn FnOnce()>) {
        let runs = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&runs);
        let make = move |key: WindowKey| {
            let sink = Rc::clone(&sink);
            Box::new(move || sink.borrow_mut().push(key)) as Box<dyn FnOnce()>
        };
        (runs, make)
    }

    #[test]
    fn test_burst_coalesces_into_one_run() {
        let scheduler = ManualScheduler::new();
        let debouncer = Debouncer::new(scheduler.clone(), DEBOUNCE_DELAY);
        let (runs, task) = recorder();
        let key = WindowKey::Window(1);

        for _ in 0..5 {
            debouncer.trigger(key, task(key));
            scheduler.advance(Duration::from_millis(50));
        }
        assert!(runs.borrow().is_empty());
        assert!(debouncer.is_pending(key));

        scheduler.advance(Duration::from_millis(150));

        assert_eq!(*runs.borrow(), vec![key]);
        assert!(!debouncer.is_pending(key));
        assert_eq!(scheduler.live_tasks(), 0);
    }

    #[test]
    fn test_windows_debounce_independently() {
        let scheduler = ManualScheduler::new();
        let debouncer = Debouncer::new(scheduler.clone(), DEBOUNCE_DELAY);
        let (runs, task) = recorder();

        debouncer.trigger(WindowKey::Window(1), task(WindowKey::Window(1)));
        scheduler.advance(Duration::from_millis(100));
        debouncer.trigger(WindowKey::Window(2), task(WindowKey::Window(2)));
        assert_eq!(debouncer.pending_count(), 2);

        scheduler.advance(Duration::from_millis(60));
        assert_eq!(*runs.borrow(), vec![WindowKey::Window(1)]);

        scheduler.advance(Duration::from_millis(100));
        assert_eq!(*runs.borrow(), vec![WindowKey::Window(1), WindowKey::Window(2)]);
    }

    #[test]
    fn test_trigger_after_quiet_period_runs_again() {
        let scheduler = ManualScheduler::new();
        let debouncer = Debouncer::new(scheduler.clone(), DEBOUNCE_DELAY);
        let (runs, task) = recorder();

        debouncer.trigger(WindowKey::All, task(WindowKey::All));
        scheduler.advance(Duration::from_millis(200));
        debouncer.trigger(WindowKey::All, task(WindowKey::All));
        scheduler.advance(Duration::from_millis(200));

        assert_eq!(runs.borrow().len(), 2);
    }

    #[test]
    fn test_cancel_all_drops_pending_tasks() {
        let scheduler = ManualScheduler::new();
        let debouncer = Debouncer::new(scheduler.clone(), DEBOUNCE_DELAY);
        let (runs, task) = recorder();

        debouncer.trigger(WindowKey::Window(3), task(WindowKey::Window(3)));
        debouncer.cancel_all();
        scheduler.advance(Duration::from_secs(1));

        assert!(runs.borrow().is_empty());
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[test]
    fn test_window_key_conversion() {
        assert_eq!(WindowKey::from_window(None), WindowKey::All);
        assert_eq!(WindowKey::from_window(Some(4)).window(), Some(4));
        assert_eq!(WindowKey::All.window(), None);
    }
}
