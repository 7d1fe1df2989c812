//! Aggregate progress estimation for a batch of downloads.
//!
//! Sizes trickle in as transfers start, so the budget is handed out incrementally: every
//! update allocates a share of the *remaining* budget to each task whose size has become
//! known, proportional to that size, while tasks that are still pending reserve a guessed
//! size. Allocations are never revised, so reported progress never moves backwards.

/// Size assumed for a download whose length the transport did not report.
pub const GUESSED_SIZE: u64 = 2 * 1024 * 1024;

/// Units of the aggregate progress value.
pub const TOTAL: u64 = 10_000;

/// Per task bookkeeping, mutated by workers under the shared lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskState {
    /// Size declared by the coordinate.
    pub declared_size: Option<u64>,
    /// Size reported by the transport.
    pub detected_size: Option<u64>,
    /// Bytes received so far.
    pub transferred: u64,
    /// A worker has claimed the task.
    pub started: bool,
    /// The worker is done with the task, successfully or not.
    pub completed: bool,
    /// The task failed.
    pub failed: bool,
    allocated: Option<u64>,
}

/// Turns task states into a single monotonic progress value.
#[derive(Debug)]
pub struct Estimator {
    total: u64,
    remaining: u64,
    reported: u64,
}

impl TaskState {
    /// A pending task with an optional declared size.
    pub fn new(declared_size: Option<u64>) -> Self {
        TaskState {
            declared_size,
            ..Default::default()
        }
    }

    /// The best known size, detected first.
    pub fn known_size(&self) -> Option<u64> {
        self.detected_size.or(self.declared_size)
    }

    /// Size used for budget allocation, `None` while the task is pending with no known size.
    fn estimated_size(&self) -> Option<u64> {
        match self.known_size() {
            Some(size) => Some(size),
            None if self.completed && self.transferred > 0 => Some(self.transferred),
            None if self.completed || self.transferred > 0 => Some(GUESSED_SIZE),
            None => None,
        }
    }

    fn progress(&self) -> u64 {
        let Some(allocated) = self.allocated.filter(|_| self.started) else {
            return 0;
        };
        if self.completed {
            return allocated;
        }
        let size = self.known_size().unwrap_or(GUESSED_SIZE);
        if size == 0 {
            return 0;
        }
        scale(allocated, self.transferred.min(size), size)
    }
}

impl Estimator {
    /// An estimator distributing `total` units.
    pub fn new(total: u64) -> Self {
        Estimator {
            total,
            remaining: total,
            reported: 0,
        }
    }

    /// The full budget.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Allocates budget to newly sized tasks and returns the progress to report.
    ///
    /// The result stays below the total until [`Estimator::finish`] and never decreases.
    pub fn update(&mut self, tasks: &mut [TaskState]) -> u64 {
        let sizes: Vec<Option<u64>> = tasks
            .iter()
            .map(|t| if t.allocated.is_some() { None } else { t.estimated_size() })
            .collect();
        let estimated_total: u64 = tasks
            .iter()
            .filter(|t| t.allocated.is_none())
            .map(|t| t.estimated_size().unwrap_or(GUESSED_SIZE))
            .sum();

        if estimated_total > 0 {
            let budget = self.remaining;
            for (task, size) in tasks.iter_mut().zip(sizes) {
                if let Some(size) = size {
                    let share = scale(budget, size, estimated_total).min(self.remaining);
                    self.remaining -= share;
                    task.allocated = Some(share);
                }
            }
        }

        let completed: u64 = tasks.iter().map(TaskState::progress).sum();
        self.reported = self
            .reported
            .max(completed.min(self.total.saturating_sub(1)));
        self.reported
    }

    /// Marks the whole budget as consumed.
    pub fn finish(&mut self) -> u64 {
        self.reported = self.total;
        self.reported
    }
}

/// `value * num / den`, rounded down.
fn scale(value: u64, num: u64, den: u64) -> u64 {
    (value as u128 * num as u128 / den as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(detected: Option<u64>, transferred: u64) -> TaskState {
        TaskState {
            detected_size: detected,
            transferred,
            started: true,
            ..Default::default()
        }
    }

    #[test]
    fn proportional_allocation() {
        let mut tasks = vec![running(Some(300), 0), running(Some(100), 0)];
        let mut est = Estimator::new(1000);
        assert_eq!(est.update(&mut tasks), 0);
        assert_eq!(tasks[0].allocated, Some(750));
        assert_eq!(tasks[1].allocated, Some(250));

        tasks[0].transferred = 150;
        tasks[1].transferred = 100;
        tasks[1].completed = true;
        assert_eq!(est.update(&mut tasks), 375 + 250);
    }

    #[test]
    fn pending_tasks_reserve_a_guess() {
        let mut tasks = vec![running(Some(GUESSED_SIZE), 0), TaskState::new(None)];
        let mut est = Estimator::new(1000);
        est.update(&mut tasks);
        assert_eq!(tasks[0].allocated, Some(500));
        assert_eq!(tasks[1].allocated, None, "no share before a size is known");

        // the late task only competes for what is left
        tasks[1] = running(Some(3 * GUESSED_SIZE), 0);
        est.update(&mut tasks);
        assert_eq!(tasks[0].allocated, Some(500));
        assert_eq!(tasks[1].allocated, Some(500));
    }

    #[test]
    fn unsized_transfer_uses_guess() {
        let mut tasks = vec![running(None, GUESSED_SIZE / 2)];
        let mut est = Estimator::new(1000);
        assert_eq!(est.update(&mut tasks), 500);
    }

    #[test]
    fn monotonic_and_capped() {
        let mut tasks = vec![running(Some(10), 10)];
        let mut est = Estimator::new(100);
        assert_eq!(est.update(&mut tasks), 99, "never complete before finish");
        tasks[0].transferred = 0;
        assert_eq!(est.update(&mut tasks), 99, "never moves backwards");
        assert_eq!(est.finish(), 100);
    }

    #[test]
    fn declared_size_counts_as_known() {
        let task = TaskState::new(Some(42));
        assert_eq!(task.known_size(), Some(42));
        let mut tasks = vec![task];
        let mut est = Estimator::new(10);
        est.update(&mut tasks);
        assert_eq!(tasks[0].allocated, Some(10));
        assert_eq!(est.update(&mut tasks), 0, "unstarted tasks contribute nothing");
    }
}
