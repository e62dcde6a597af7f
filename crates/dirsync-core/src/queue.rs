use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

struct QueueState<T> {
    backlog: VecDeque<T>,
    running: usize,
    max_concurrency: usize,
}

struct QueueInner<T> {
    state: Mutex<QueueState<T>>,
    run: Box<dyn Fn(T) + Send + Sync>,
}

/// Bounded-concurrency FIFO executor. Submitted items wait in an
/// unbounded backlog; at most `max_concurrency` run at once, each on
/// its own worker thread. A finishing slot immediately pulls the next
/// queued item, so a burst of completions starts an equal burst of new
/// items. Lowering the limit never cancels in-flight work.
pub struct TaskQueue<T: Send + 'static> {
    inner: Arc<QueueInner<T>>,
}

impl<T: Send + 'static> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> TaskQueue<T> {
    pub fn new(max_concurrency: usize, run: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    backlog: VecDeque::new(),
                    running: 0,
                    max_concurrency: max_concurrency.max(1),
                }),
                run: Box::new(run),
            }),
        }
    }

    pub fn submit(&self, item: T) {
        {
            let mut state = self.inner.state.lock().expect("queue state poisoned");
            state.backlog.push_back(item);
        }
        Self::pump(&self.inner);
    }

    /// Takes effect on the next scheduling decision, never retroactively.
    pub fn set_max_concurrency(&self, max_concurrency: usize) {
        {
            let mut state = self.inner.state.lock().expect("queue state poisoned");
            state.max_concurrency = max_concurrency.max(1);
        }
        Self::pump(&self.inner);
    }

    pub fn running(&self) -> usize {
        self.inner.state.lock().expect("queue state poisoned").running
    }

    pub fn backlog_len(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("queue state poisoned")
            .backlog
            .len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock().expect("queue state poisoned");
        state.running == 0 && state.backlog.is_empty()
    }

    fn pump(inner: &Arc<QueueInner<T>>) {
        loop {
            let item = {
                let mut state = inner.state.lock().expect("queue state poisoned");
                if state.running >= state.max_concurrency {
                    return;
                }
                let Some(item) = state.backlog.pop_front() else {
                    return;
                };
                state.running += 1;
                item
            };

            let worker = Arc::clone(inner);
            thread::spawn(move || {
                (worker.run)(item);
                {
                    let mut state = worker.state.lock().expect("queue state poisoned");
                    state.running -= 1;
                }
                Self::pump(&worker);
            });
        }
    }
}
