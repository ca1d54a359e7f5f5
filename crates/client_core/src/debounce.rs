use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

/// Emits the latest pushed value once `quiet` has elapsed without another
/// push. A value equal to the last emitted one is swallowed.
pub struct Debouncer<T> {
    input: mpsc::UnboundedSender<T>,
    task: JoinHandle<()>,
}

impl<T> Debouncer<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn spawn(quiet: Duration, initial: T) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (input, input_rx) = mpsc::unbounded_channel();
        let (output, output_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_debounce(quiet, initial, input_rx, output));
        (Self { input, task }, output_rx)
    }

    pub fn push(&self, value: T) {
        let _ = self.input.send(value);
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_debounce<T>(
    quiet: Duration,
    mut last_emitted: T,
    mut input: mpsc::UnboundedReceiver<T>,
    output: mpsc::UnboundedSender<T>,
) where
    T: Clone + PartialEq,
{
    while let Some(mut latest) = input.recv().await {
        loop {
            tokio::select! {
                next = input.recv() => match next {
                    Some(value) => latest = value,
                    None => return,
                },
                _ = tokio::time::sleep(quiet) => break,
            }
        }
        if latest == last_emitted {
            continue;
        }
        last_emitted = latest.clone();
        if output.send(latest).is_err() {
            return;
        }
    }
}

pub struct SearchDebouncer {
    inner: Debouncer<String>,
}

impl SearchDebouncer {
    pub fn spawn(quiet: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (inner, committed) = Debouncer::spawn(quiet, String::new());
        (Self { inner }, committed)
    }

    pub fn input(&self, raw: &str) {
        let term = raw.trim();
        debug!(term, "search: keystroke");
        self.inner.push(term.to_string());
    }

    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/debounce_tests.rs"]
mod tests;
