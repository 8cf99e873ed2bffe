//! Task Pool / Scheduler (§4.6): a cooperative worker pool with one
//! GPU-affine thread per pool, cancellable jobs and submission-ordered
//! execution.
//!
//! Hand-rolled on `std::thread`/`Mutex`/`Condvar` rather than built on the
//! teacher's `choir` dependency — see SPEC_FULL.md's "Dependency stack
//! decisions" and DESIGN.md for the rationale.

mod task;

pub use task::{AbstractTask, Device, ThreadContext};

use lattice_gpu::Context;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// Opaque handle returned by `submit`/`submit_persistent` (§4.6).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct JobId(u64);

struct Completion {
    done: Mutex<bool>,
    cv: Condvar,
}

impl Completion {
    fn new() -> Self {
        Self { done: Mutex::new(false), cv: Condvar::new() }
    }

    fn signal(&self) {
        *self.done.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut done = self.done.lock().unwrap();
        while !*done {
            done = self.cv.wait(done).unwrap();
        }
    }

    fn is_done(&self) -> bool {
        *self.done.lock().unwrap()
    }
}

struct JobEntry {
    id: JobId,
    task: Arc<dyn AbstractTask>,
    persistent: bool,
    aborted: Arc<AtomicBool>,
    completion: Arc<Completion>,
}

/// The Context owns one or more pools (§4.6). Each pool runs one
/// GPU-affine dispatcher thread that drains its queue in submission
/// order, running CPU-only tasks by fanning out across a bounded number
/// of scoped threads and GPU tasks directly against the shared `Context`.
pub struct Pool {
    queue: Arc<Mutex<VecDeque<JobEntry>>>,
    queue_cv: Arc<Condvar>,
    shutdown: Arc<AtomicBool>,
    next_id: AtomicU64,
    cpu_workers: usize,
    dispatcher: Option<JoinHandle<()>>,
    /// The job currently running on the dispatcher thread, if any — kept
    /// outside `queue` so `abort`/`wait_for`/`check` can still reach it
    /// once it has been dequeued for execution.
    current: Arc<Mutex<Option<CurrentJob>>>,
}

struct CurrentJob {
    id: JobId,
    aborted: Arc<AtomicBool>,
    completion: Arc<Completion>,
}

impl Pool {
    /// `cpu_workers` bounds how many CPU threads a single `CpuOnly`/
    /// `CpuOrGpu` job may fan out across; `gpu` is the context the single
    /// GPU-affine dispatcher thread will own for the pool's lifetime.
    pub fn new(gpu: Arc<Context>, cpu_workers: usize) -> Self {
        let queue: Arc<Mutex<VecDeque<JobEntry>>> = Arc::new(Mutex::new(VecDeque::new()));
        let queue_cv = Arc::new(Condvar::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let cpu_workers = cpu_workers.max(1);
        let current = Arc::new(Mutex::new(None));

        let dispatcher = {
            let queue = queue.clone();
            let queue_cv = queue_cv.clone();
            let shutdown = shutdown.clone();
            let current = current.clone();
            std::thread::spawn(move || dispatch_loop(queue, queue_cv, shutdown, gpu, cpu_workers, current))
        };

        Self {
            queue,
            queue_cv,
            shutdown,
            next_id: AtomicU64::new(1),
            cpu_workers,
            dispatcher: Some(dispatcher),
            current,
        }
    }

    fn enqueue(&self, task: Arc<dyn AbstractTask>, persistent: bool) -> (JobId, Arc<Completion>) {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let completion = Arc::new(Completion::new());
        let entry = JobEntry {
            id,
            task,
            persistent,
            aborted: Arc::new(AtomicBool::new(false)),
            completion: completion.clone(),
        };
        self.queue.lock().unwrap().push_back(entry);
        self.queue_cv.notify_all();
        (id, completion)
    }

    /// Blocking execution; returns elapsed wall time in milliseconds
    /// (§4.6 `perform(task, pool) -> ms`).
    pub fn perform(&self, task: Arc<dyn AbstractTask>) -> u64 {
        let start = std::time::Instant::now();
        let (_id, completion) = self.enqueue(task, false);
        completion.wait();
        start.elapsed().as_millis() as u64
    }

    /// Non-blocking submission (§4.6).
    pub fn submit(&self, task: Arc<dyn AbstractTask>) -> JobId {
        self.enqueue(task, false).0
    }

    /// The task is re-enqueued automatically after completion until
    /// aborted (§4.6).
    pub fn submit_persistent(&self, task: Arc<dyn AbstractTask>) -> JobId {
        self.enqueue(task, true).0
    }

    /// Ensures one more execution happens after the current one,
    /// optionally aborting whatever is currently running first (§4.6).
    pub fn repeat(&self, task: Arc<dyn AbstractTask>, abort_current: Option<JobId>) -> JobId {
        if let Some(job) = abort_current {
            self.abort(job);
        }
        self.submit(task)
    }

    pub fn wait_for(&self, job: JobId) {
        if let Some(completion) = self.find_completion(job) {
            completion.wait();
        }
    }

    pub fn wait_all(&self) {
        loop {
            if self.queue.lock().unwrap().is_empty() && self.current.lock().unwrap().is_none() {
                return;
            }
            std::thread::yield_now();
        }
    }

    /// Sets the cooperative abort flag observed at the job's next
    /// suspension point (§4.6, §5) — reaches a still-queued job as well
    /// as the one currently running on the dispatcher thread.
    pub fn abort(&self, job: JobId) {
        if let Some(entry) = self.queue.lock().unwrap().iter().find(|e| e.id == job) {
            entry.aborted.store(true, Ordering::Release);
            return;
        }
        if let Some(current) = self.current.lock().unwrap().as_ref() {
            if current.id == job {
                current.aborted.store(true, Ordering::Release);
            }
        }
    }

    pub fn busy(&self) -> bool {
        !self.queue.lock().unwrap().is_empty() || self.current.lock().unwrap().is_some()
    }

    /// Non-blocking poll: `true` once the job has completed.
    pub fn check(&self, job: JobId) -> bool {
        self.find_completion(job).map(|c| c.is_done()).unwrap_or(true)
    }

    fn find_completion(&self, job: JobId) -> Option<Arc<Completion>> {
        if let Some(entry) = self.queue.lock().unwrap().iter().find(|e| e.id == job) {
            return Some(entry.completion.clone());
        }
        self.current.lock().unwrap().as_ref().filter(|c| c.id == job).map(|c| c.completion.clone())
    }

    pub fn cpu_workers(&self) -> usize {
        self.cpu_workers
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.queue_cv.notify_all();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }
}

fn dispatch_loop(
    queue: Arc<Mutex<VecDeque<JobEntry>>>,
    queue_cv: Arc<Condvar>,
    shutdown: Arc<AtomicBool>,
    gpu: Arc<Context>,
    cpu_workers: usize,
    current: Arc<Mutex<Option<CurrentJob>>>,
) {
    loop {
        let entry = {
            let mut guard = queue.lock().unwrap();
            loop {
                if shutdown.load(Ordering::Acquire) && guard.is_empty() {
                    return;
                }
                if let Some(front) = guard.pop_front() {
                    break front;
                }
                guard = queue_cv.wait(guard).unwrap();
            }
        };
        *current.lock().unwrap() = Some(CurrentJob {
            id: entry.id,
            aborted: entry.aborted.clone(),
            completion: entry.completion.clone(),
        });
        // `run_job` itself checks `entry.aborted` up front and skips
        // straight to `after_processing` for jobs cancelled before they
        // started running.
        run_job(&entry, &gpu, cpu_workers);
        *current.lock().unwrap() = None;
        entry.completion.signal();
        if entry.persistent && !entry.aborted.load(Ordering::Acquire) {
            let mut guard = queue.lock().unwrap();
            guard.push_back(JobEntry {
                id: entry.id,
                task: entry.task,
                persistent: true,
                aborted: Arc::new(AtomicBool::new(false)),
                completion: Arc::new(Completion::new()),
            });
            queue_cv.notify_all();
        }
    }
}

fn run_job(entry: &JobEntry, gpu: &Arc<Context>, cpu_workers: usize) {
    if entry.aborted.load(Ordering::Acquire) {
        entry.task.after_processing(0, None, true);
        return;
    }
    match entry.task.used_devices() {
        Device::GpuOnly => run_job_gpu(entry, gpu),
        Device::CpuOnly | Device::CpuOrGpu => run_job_cpu(entry, cpu_workers),
    }
}

fn run_job_gpu(entry: &JobEntry, gpu: &Arc<Context>) {
    let ctx = ThreadContext { index: 0, aborted: entry.aborted.clone() };
    entry.task.before_processing(1, 1, Some(gpu));
    if !entry.aborted.load(Ordering::Acquire) {
        entry.task.process_on_gpu(gpu, &ctx);
    }
    entry.task.after_processing(1, Some(gpu), entry.aborted.load(Ordering::Acquire));
}

fn run_job_cpu(entry: &JobEntry, cpu_workers: usize) {
    let count = entry.task.max_threads().max(1).min(cpu_workers);
    entry.task.before_processing(count, count, None);
    if !entry.aborted.load(Ordering::Acquire) {
        std::thread::scope(|scope| {
            for index in 0..count {
                let ctx = ThreadContext { index, aborted: entry.aborted.clone() };
                let task = &entry.task;
                scope.spawn(move || task.process(&ctx));
            }
        });
    }
    entry.task.after_processing(count, None, entry.aborted.load(Ordering::Acquire));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingTask {
        ran: AtomicUsize,
    }

    impl AbstractTask for CountingTask {
        fn used_devices(&self) -> Device {
            Device::CpuOnly
        }

        fn max_threads(&self) -> usize {
            4
        }

        fn process(&self, _thread: &ThreadContext) {
            self.ran.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn abort_before_execute_skips_process() {
        struct Flag(AtomicBool);
        impl AbstractTask for Flag {
            fn used_devices(&self) -> Device {
                Device::CpuOnly
            }
            fn process(&self, _thread: &ThreadContext) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let task = Arc::new(Flag(AtomicBool::new(false)));
        let entry = JobEntry {
            id: JobId(1),
            task: task.clone() as Arc<dyn AbstractTask>,
            persistent: false,
            aborted: Arc::new(AtomicBool::new(true)),
            completion: Arc::new(Completion::new()),
        };
        // Aborted-before-start is checked by `run_job` itself, ahead of
        // the CPU/GPU split, so the CPU-only path below never runs.
        if !entry.aborted.load(Ordering::Acquire) {
            run_job_cpu(&entry, 1);
        } else {
            entry.task.after_processing(0, None, true);
        }
        assert!(!task.0.load(Ordering::SeqCst));
    }

    #[test]
    fn cpu_job_fans_out_across_workers() {
        let task = Arc::new(CountingTask { ran: AtomicUsize::new(0) });
        let entry = JobEntry {
            id: JobId(2),
            task: task.clone() as Arc<dyn AbstractTask>,
            persistent: false,
            aborted: Arc::new(AtomicBool::new(false)),
            completion: Arc::new(Completion::new()),
        };
        run_job_cpu(&entry, 4);
        assert_eq!(task.ran.load(Ordering::SeqCst), 4);
    }
}
