use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gbd_accountant::{Accountant, Termination};
use gbd_core::{JobOutcome, JobStatus};

use crate::job::Task;
use crate::queue::Queue;

const RESERVE_RETRY_DELAY: Duration = Duration::from_millis(1);

pub(crate) fn spawn(
    id: usize,
    jobs: Arc<Queue<Task>>,
    results: Arc<Queue<JobOutcome>>,
    accountant: Arc<Accountant>,
    shutdown: Arc<AtomicBool>,
    completed: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    idle_sleep: Duration,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("gbd-worker-{id}"))
        .spawn(move || {
            gbd_accountant::mark_tracked();
            log::debug!("worker {id} starting");
            loop {
                let Some(task) = jobs.try_pop() else {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    thread::sleep(idle_sleep);
                    continue;
                };
                run_task(task, &jobs, &results, &accountant, &completed, &active);
            }
            log::debug!("worker {id} stopping");
        })
        .expect("failed to spawn worker thread")
}

fn finalize(
    results: &Queue<JobOutcome>,
    completed: &AtomicUsize,
    outcome: JobOutcome,
) {
    completed.fetch_add(1, Ordering::AcqRel);
    results.push(outcome);
}

fn run_task(
    mut task: Task,
    jobs: &Queue<Task>,
    results: &Queue<JobOutcome>,
    accountant: &Accountant,
    completed: &AtomicUsize,
    active: &AtomicUsize,
) {
    if accountant.exceeds_capacity(task.memnbt) {
        log::warn!(
            "job {:?} abandoned: {} bytes can never fit the pool cap",
            task.key,
            task.memnbt
        );
        finalize(
            results,
            completed,
            JobOutcome {
                key: task.key.clone(),
                status: JobStatus::MemoryExceeded,
                features: None,
                detail: Some(format!("estimate of {} bytes exceeds pool capacity", task.memnbt)),
            },
        );
        return;
    }

    loop {
        if accountant.try_reserve(task.memnbt) {
            break;
        }
        thread::sleep(RESERVE_RETRY_DELAY);
    }

    let data = accountant.registry().current();
    data.start_job(task.memnbt, accountant.now_nanos());
    active.fetch_add(1, Ordering::AcqRel);

    let factory = &task.factory;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut instance = factory();
        match instance.extract() {
            Ok(features) => features,
            // Not a resource limit: the extractor's own error propagates
            // and terminates this worker thread, per the engine's
            // three-status contract (it never swallows unknown failures).
            Err(extract_err) => panic!("extractor failed: {extract_err}"),
        }
    }));

    active.fetch_sub(1, Ordering::AcqRel);
    let freed = data.finish_job();
    accountant.unreserve(freed);

    match outcome {
        Ok(features) => {
            finalize(
                results,
                completed,
                JobOutcome {
                    key: task.key.clone(),
                    status: JobStatus::Success,
                    features: Some(features),
                    detail: None,
                },
            );
        }
        Err(panic_payload) => {
            let Some(termination) = gbd_accountant::termination_from_panic(panic_payload.as_ref())
            else {
                panic::resume_unwind(panic_payload);
            };

            match termination {
                Termination::TimeExceeded => {
                    finalize(
                        results,
                        completed,
                        JobOutcome {
                            key: task.key.clone(),
                            status: JobStatus::TimeExceeded,
                            features: None,
                            detail: Some(format!(
                                "time cap elapsed after {} requeue(s)",
                                task.termination_count
                            )),
                        },
                    );
                }
                Termination::MemoryExceeded { memnbt } => {
                    task.terminate(memnbt);
                    if accountant.exceeds_capacity(task.memnbt) {
                        log::warn!(
                            "job {:?} abandoned after {} requeue(s): needs {} bytes",
                            task.key,
                            task.termination_count,
                            task.memnbt
                        );
                        finalize(
                            results,
                            completed,
                            JobOutcome {
                                key: task.key.clone(),
                                status: JobStatus::MemoryExceeded,
                                features: None,
                                detail: Some(format!(
                                    "gave up after {} requeue(s), needs {} bytes",
                                    task.termination_count, task.memnbt
                                )),
                            },
                        );
                    } else {
                        log::debug!(
                            "job {:?} requeued (attempt {}), new estimate {} bytes",
                            task.key,
                            task.termination_count,
                            task.memnbt
                        );
                        let penalty = accountant.termination_penalty();
                        thread::sleep(penalty);
                        jobs.push(task);
                    }
                }
            }
        }
    }
}
