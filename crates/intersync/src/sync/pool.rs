//! Bounded worker pool that runs one dependency level at a time.
//!
//! Workers pull jobs from a bounded channel and push results back; the
//! call returns once every job of the batch has reported, which makes each
//! level a barrier for the next.

use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error};

pub struct LevelPool {
    worker_count: usize,
}

impl LevelPool {
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        Self { worker_count }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Runs `job` over every item with at most `worker_count` in flight.
    ///
    /// Results come back in item order. An item whose worker panicked yields
    /// `None`.
    pub fn run<T, R, F>(&self, items: Vec<T>, job: F) -> Vec<Option<R>>
    where
        T: Send,
        R: Send,
        F: Fn(usize, T) -> R + Sync,
    {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }
        let worker_count = self.worker_count.min(total);
        let (job_sender, job_receiver) = bounded::<(usize, T)>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<(usize, R)>(worker_count * 2);

        let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
        thread::scope(|scope| {
            let job = &job;
            let workers: Vec<_> = (0..worker_count)
                .map(|worker_id| {
                    let job_rx = job_receiver.clone();
                    let result_tx = result_sender.clone();
                    scope.spawn(move || run_worker(worker_id, job_rx, result_tx, job))
                })
                .collect();
            drop(job_receiver);
            drop(result_sender);

            // Feeding from a separate thread keeps a full result channel from
            // blocking submission.
            scope.spawn(move || {
                for entry in items.into_iter().enumerate() {
                    if job_sender.send(entry).is_err() {
                        break;
                    }
                }
            });

            for (index, result) in result_receiver.iter() {
                results[index] = Some(result);
            }

            for (i, worker) in workers.into_iter().enumerate() {
                if let Err(e) = worker.join() {
                    error!("Worker {} panicked: {:?}", i, e);
                } else {
                    debug!("Worker {} finished", i);
                }
            }
        });
        results
    }
}

fn run_worker<T, R, F>(
    worker_id: usize,
    job_receiver: Receiver<(usize, T)>,
    result_sender: Sender<(usize, R)>,
    job: &F,
) where
    F: Fn(usize, T) -> R,
{
    debug!("Worker {} started", worker_id);
    for (index, item) in job_receiver.iter() {
        let result = job(worker_id, item);
        if result_sender.send((index, result)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_results_in_item_order() {
        let pool = LevelPool::new(3);
        let results = pool.run((0..20).collect(), |_, n: u32| n * 2);
        let expected: Vec<Option<u32>> = (0..20).map(|n| Some(n * 2)).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_bounded_concurrency() {
        let pool = LevelPool::new(2);
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        pool.run((0..8).collect::<Vec<u32>>(), |_, _| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_panicking_job_yields_none() {
        let pool = LevelPool::new(1);
        let results = pool.run(vec![1, 2, 3], |_, n: u32| {
            if n == 2 {
                panic!("boom");
            }
            n
        });
        assert_eq!(results[0], Some(1));
        assert_eq!(results[1], None);
    }

    #[test]
    fn test_empty_batch() {
        let pool = LevelPool::new(4);
        assert!(pool.run(Vec::<u32>::new(), |_, n| n).is_empty());
    }

    #[test]
    #[should_panic(expected = "worker_count must be > 0")]
    fn test_zero_workers_rejected() {
        LevelPool::new(0);
    }
}
