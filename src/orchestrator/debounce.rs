use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Coalesces input events within a quiescence window
///
/// Every new input replaces the pending one and restarts the window; a value
/// becomes ready once the window has elapsed without further input.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn push(&mut self, value: T, at: Instant) {
        self.pending = Some((value, at));
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// When the pending value becomes ready, if there is one
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at + self.window)
    }

    /// Takes the pending value if its window has elapsed at `now`
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline() {
            Some(deadline) if deadline <= now => self.pending.take().map(|(value, _)| value),
            _ => None,
        }
    }
}

/// Applies the debounce policy to a timestamped input sequence
///
/// Returns the values that would be emitted, in order. Timestamps must be
/// non-decreasing.
pub fn coalesce<T, I>(window: Duration, inputs: I) -> Vec<T>
where
    I: IntoIterator<Item = (Instant, T)>,
{
    let mut debouncer = Debouncer::new(window);
    let mut emitted = Vec::new();

    for (at, value) in inputs {
        if let Some(ready) = debouncer.poll(at) {
            emitted.push(ready);
        }
        debouncer.push(value, at);
    }

    if let Some(deadline) = debouncer.deadline() {
        if let Some(ready) = debouncer.poll(deadline) {
            emitted.push(ready);
        }
    }

    emitted
}

/// Message for the debounce worker
#[derive(Debug)]
pub(crate) enum DebounceInput<T> {
    Value(T),
    Cancel,
}

/// Runs a debouncer on the runtime clock
///
/// `on_ready` is invoked with each emitted value; returning `false` stops the
/// worker. The worker also stops once every sender is dropped.
pub(crate) fn spawn_debounce_worker<T, F>(
    window: Duration,
    mut input_rx: mpsc::UnboundedReceiver<DebounceInput<T>>,
    mut on_ready: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: FnMut(T) -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let mut debouncer = Debouncer::new(window);

        loop {
            let deadline = debouncer.deadline();

            tokio::select! {
                biased;

                msg = input_rx.recv() => match msg {
                    Some(DebounceInput::Value(value)) => debouncer.push(value, Instant::now()),
                    Some(DebounceInput::Cancel) => debouncer.cancel(),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(value) = debouncer.poll(Instant::now()) {
                        if !on_ready(value) {
                            break;
                        }
                    }
                }
            }
        }

        tracing::debug!("Debounce worker stopped");
    })
}
