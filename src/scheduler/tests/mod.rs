use super::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Job {
    Fast,
    Slow,
}

/// Records when each job starts (as an offset from `origin`) and simulates work
struct Recorder {
    origin: Instant,
    log: Vec<(Job, Duration)>,
    fast_cost: Duration,
    slow_cost: Duration,
    stop_after: usize,
    fail_on_call: Option<usize>,
    stop: CancellationToken,
}

impl Recorder {
    fn new(stop: &CancellationToken, stop_after: usize) -> Self {
        Self {
            origin: Instant::now(),
            log: Vec::new(),
            fast_cost: Duration::ZERO,
            slow_cost: Duration::ZERO,
            stop_after,
            fail_on_call: None,
            stop: stop.clone(),
        }
    }

    fn starts(&self, job: Job) -> Vec<Duration> {
        self.log
            .iter()
            .filter(|(j, _)| *j == job)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl TaskHandler<Job> for Recorder {
    async fn run_task(&mut self, job: &Job) -> Result<()> {
        self.log.push((*job, self.origin.elapsed()));
        let call = self.log.len();

        let cost = match job {
            Job::Fast => self.fast_cost,
            Job::Slow => self.slow_cost,
        };
        if !cost.is_zero() {
            tokio::time::sleep(cost).await;
        }

        if call >= self.stop_after {
            self.stop.cancel();
        }
        if self.fail_on_call == Some(call) {
            return Err(Error::Other(format!("job {job:?} failed")));
        }
        Ok(())
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn two_tasks() -> Vec<Task<Job>> {
    vec![
        Task::new("fast", Job::Fast, secs(1)),
        Task::new("slow", Job::Slow, secs(60)),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_queue_pops_earliest_deadline_first() {
    let mut queue = TaskQueue::new();
    let mut late = Task::new("late", Job::Slow, secs(1));
    late.next_run_at = Instant::now() + secs(30);
    let mut early = Task::new("early", Job::Fast, secs(1));
    early.next_run_at = Instant::now() + secs(5);

    queue.insert(late);
    queue.insert(early);

    assert_eq!(queue.len(), 2);
    assert_eq!(queue.peek_min().unwrap().name(), "early");
    // peek does not remove
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.pop_min().unwrap().name(), "early");
    assert_eq!(queue.pop_min().unwrap().name(), "late");
    assert!(queue.pop_min().is_none());
    assert!(queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_queue_ties_pop_in_insertion_order() {
    let at = Instant::now() + secs(10);
    let mut queue = TaskQueue::new();
    for name in ["a", "b", "c"] {
        let mut task = Task::new(name, Job::Fast, secs(1));
        task.next_run_at = at;
        queue.insert(task);
    }

    let order: Vec<_> = queue.ordered().iter().map(|t| t.name().to_string()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);

    let popped: Vec<_> = std::iter::from_fn(|| queue.pop_min())
        .map(|t| t.name().to_string())
        .collect();
    assert_eq!(popped, vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_new_tasks_are_due_immediately() {
    let before = Instant::now();
    let task = Task::new("drain", Job::Fast, secs(1));
    assert!(task.next_run_at() <= Instant::now());
    assert!(task.next_run_at() >= before);
    assert_eq!(task.runs(), 0);
    assert_eq!(task.interval(), secs(1));
    assert_eq!(*task.kind(), Job::Fast);
}

#[test]
fn test_scheduler_rejects_empty_task_set() {
    assert!(Scheduler::<Job>::new(vec![]).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_tasks_never_run_early() {
    let stop = CancellationToken::new();
    let mut scheduler = Scheduler::new(two_tasks()).unwrap();
    let mut recorder = Recorder::new(&stop, 130);

    scheduler.run_forever(&mut recorder, &stop).await.unwrap();

    let fast = recorder.starts(Job::Fast);
    let slow = recorder.starts(Job::Slow);
    assert!(fast.len() > 100);
    assert_eq!(slow[..2], [secs(0), secs(60)]);

    for gap in fast.windows(2).map(|w| w[1] - w[0]) {
        assert!(gap >= secs(1), "fast task ran after only {gap:?}");
    }
    for gap in slow.windows(2).map(|w| w[1] - w[0]) {
        assert!(gap >= secs(60), "slow task ran after only {gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_interval_counts_from_completion_without_catch_up() {
    let stop = CancellationToken::new();
    let mut scheduler =
        Scheduler::new(vec![Task::new("slow", Job::Slow, secs(10))]).unwrap();
    let mut recorder = Recorder::new(&stop, 3);
    // Each run takes longer than the interval
    recorder.slow_cost = secs(25);

    scheduler.run_forever(&mut recorder, &stop).await.unwrap();

    // 0 -> done at 25, next at 35 -> done at 60, next at 70
    assert_eq!(recorder.starts(Job::Slow), vec![secs(0), secs(35), secs(70)]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_task_delays_the_others() {
    let stop = CancellationToken::new();
    let mut scheduler = Scheduler::new(two_tasks()).unwrap();
    let mut recorder = Recorder::new(&stop, 3);
    recorder.slow_cost = secs(5);

    scheduler.run_forever(&mut recorder, &stop).await.unwrap();

    // fast@0, slow@0 (busy until 5), fast was due at 1 but only runs at 5
    assert_eq!(
        recorder.log,
        vec![
            (Job::Fast, secs(0)),
            (Job::Slow, secs(0)),
            (Job::Fast, secs(5)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failure_propagates_and_state_survives() {
    let stop = CancellationToken::new();
    let mut scheduler = Scheduler::new(two_tasks()).unwrap();
    let mut recorder = Recorder::new(&stop, usize::MAX);
    // Second call is the slow task's first run
    recorder.fail_on_call = Some(2);

    let err = scheduler.run_forever(&mut recorder, &stop).await.unwrap_err();
    assert!(err.to_string().contains("Slow"));

    // The failed task was still rescheduled from its completion time
    let snapshot = scheduler.snapshot();
    assert_eq!(snapshot.len(), 2);
    let slow = snapshot.iter().find(|t| t.name == "slow").unwrap();
    assert_eq!(slow.runs, 1);
    assert_eq!(slow.next_run_at, recorder.origin + secs(60));

    // Running again resumes with the same task state
    recorder.fail_on_call = None;
    recorder.stop_after = recorder.log.len() + 1;
    scheduler.run_forever(&mut recorder, &stop).await.unwrap();
    assert_eq!(recorder.log.last(), Some(&(Job::Fast, secs(1))));
}

#[tokio::test(start_paused = true)]
async fn test_stop_interrupts_wait() {
    let stop = CancellationToken::new();
    let mut scheduler =
        Scheduler::new(vec![Task::new("hourly", Job::Slow, secs(3600))]).unwrap();
    let mut recorder = Recorder::new(&stop, usize::MAX);

    let canceller = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(secs(10)).await;
        canceller.cancel();
    });

    scheduler.run_forever(&mut recorder, &stop).await.unwrap();

    assert_eq!(recorder.starts(Job::Slow), vec![secs(0)]);
    assert_eq!(recorder.origin.elapsed(), secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start_runs_nothing() {
    let stop = CancellationToken::new();
    stop.cancel();
    let mut scheduler = Scheduler::new(two_tasks()).unwrap();
    let mut recorder = Recorder::new(&stop, usize::MAX);

    scheduler.run_forever(&mut recorder, &stop).await.unwrap();
    assert!(recorder.log.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_reflects_runs() {
    let stop = CancellationToken::new();
    let mut scheduler = Scheduler::new(two_tasks()).unwrap();
    let mut recorder = Recorder::new(&stop, 2);

    scheduler.run_forever(&mut recorder, &stop).await.unwrap();

    let snapshot = scheduler.snapshot();
    // Fast is due first (t=1), slow later (t=60)
    assert_eq!(snapshot[0].name, "fast");
    assert_eq!(snapshot[0].runs, 1);
    assert_eq!(snapshot[0].next_run_at, recorder.origin + secs(1));
    assert_eq!(snapshot[1].name, "slow");
    assert_eq!(snapshot[1].interval, secs(60));
}
