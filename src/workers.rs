//! Wake-up signal for background worker groups
//!
//! The renderer broadcasts "new frame, work available" to worker groups such as the
//! instanced-object updaters and the terrain quadtree updaters. Broadcasting never
//! waits on the workers: they pick the work up on their own schedule and publish results
//! for a later frame.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct SignalState {
    generation: u64,
    closed: bool,
}

#[derive(Debug, Default)]
struct SignalInner {
    state: Mutex<SignalState>,
    condvar: Condvar,
}

/// Fire-and-forget broadcast to every listener of a worker group.
///
/// Clone is cheap (Arc-wrapped); every clone signals the same group.
#[derive(Debug, Clone, Default)]
pub struct WorkerSignal {
    inner: Arc<SignalInner>,
}

/// Why [`WorkerListener::wait`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// At least one broadcast happened since the listener last woke.
    Work,
    /// The signal was closed, the worker should exit.
    Closed,
}

impl WorkerSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every waiting worker. Never blocks on the workers themselves.
    pub fn notify_all(&self) {
        {
            let mut state = self.inner.state.lock();
            state.generation += 1;
        }
        self.inner.condvar.notify_all();
    }

    /// Number of broadcasts issued so far.
    pub fn broadcasts(&self) -> u64 {
        self.inner.state.lock().generation
    }

    /// Tell every listener to exit.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.condvar.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// A listener that sees broadcasts issued after this call.
    pub fn listener(&self) -> WorkerListener {
        WorkerListener {
            seen: self.broadcasts(),
            signal: self.clone(),
        }
    }
}

/// Worker-side end of a [`WorkerSignal`].
#[derive(Debug)]
pub struct WorkerListener {
    signal: WorkerSignal,
    seen: u64,
}

impl WorkerListener {
    /// Block until a broadcast newer than the last one seen, or until the signal closes.
    ///
    /// Several broadcasts between two waits collapse into one wake-up.
    pub fn wait(&mut self) -> Wake {
        let inner = &self.signal.inner;
        let mut state = inner.state.lock();
        loop {
            if state.closed {
                return Wake::Closed;
            }
            if state.generation > self.seen {
                self.seen = state.generation;
                return Wake::Work;
            }
            inner.condvar.wait(&mut state);
        }
    }

    /// Non-blocking check for pending work.
    pub fn try_wait(&mut self) -> Option<Wake> {
        let state = self.signal.inner.state.lock();
        if state.closed {
            Some(Wake::Closed)
        } else if state.generation > self.seen {
            self.seen = state.generation;
            Some(Wake::Work)
        } else {
            None
        }
    }
}

/// Spawn a named worker thread that runs `job` once per wake-up until the signal closes.
pub fn spawn_worker<F>(
    name: &str,
    signal: &WorkerSignal,
    mut job: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnMut() + Send + 'static,
{
    let mut listener = signal.listener();
    let name = name.to_string();
    std::thread::Builder::new().name(name.clone()).spawn(move || {
        log::debug!("worker {name} started");
        while listener.wait() == Wake::Work {
            job();
        }
        log::debug!("worker {name} stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[test]
    fn test_broadcast_counts() {
        let signal = WorkerSignal::new();
        assert_eq!(signal.broadcasts(), 0);
        signal.notify_all();
        signal.clone().notify_all();
        assert_eq!(signal.broadcasts(), 2);
    }

    #[test]
    fn test_listener_collapses_broadcasts() {
        let signal = WorkerSignal::new();
        let mut listener = signal.listener();
        assert_eq!(listener.try_wait(), None);

        signal.notify_all();
        signal.notify_all();
        assert_eq!(listener.try_wait(), Some(Wake::Work));
        assert_eq!(listener.try_wait(), None);
    }

    #[test]
    fn test_listener_ignores_earlier_broadcasts() {
        let signal = WorkerSignal::new();
        signal.notify_all();
        let mut listener = signal.listener();
        assert_eq!(listener.try_wait(), None);
    }

    #[test]
    fn test_close_releases_listener() {
        let signal = WorkerSignal::new();
        let mut listener = signal.listener();
        signal.close();
        assert_eq!(listener.wait(), Wake::Closed);
        assert!(signal.is_closed());
    }

    #[test]
    fn test_worker_runs_on_broadcast() {
        let signal = WorkerSignal::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_worker("test-worker", &signal, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        signal.notify_all();
        let deadline = Instant::now() + Duration::from_secs(5);
        while runs.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        signal.close();
        handle.join().unwrap();

        assert!(runs.load(Ordering::SeqCst) >= 1);
    }
}
