use ordo_scheduler::{PriorityQueue, QueueConfig, TaskError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Running/peak counters shared by every task of a test.
#[derive(Default)]
struct Gauge {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

type Started = mpsc::UnboundedSender<usize>;

/// Pushes a task that reports its start and then blocks until released.
fn push_gated(
    queue: &PriorityQueue<u32>,
    priority: u32,
    id: usize,
    gauge: &Arc<Gauge>,
    started: &Started,
) -> (oneshot::Sender<()>, ordo_scheduler::TaskHandle<usize>) {
    let (release, gate) = oneshot::channel::<()>();
    let handle = queue.push(
        priority,
        |(gauge, started, gate): (Arc<Gauge>, Started, oneshot::Receiver<()>), id: usize| async move {
            gauge.enter();
            let _ = started.send(id);
            let _ = gate.await;
            gauge.exit();
            Ok::<_, anyhow::Error>(id)
        },
        (gauge.clone(), started.clone(), gate),
        id,
    );
    (release, handle)
}

#[tokio::test]
async fn test_worker_cap_holds_third_task_back() {
    let queue = PriorityQueue::new(QueueConfig {
        max_workers: 2,
        ..QueueConfig::default()
    })
    .unwrap();
    let gauge = Arc::new(Gauge::default());
    let (started_tx, mut started) = mpsc::unbounded_channel();

    let mut releases = Vec::new();
    let mut handles = Vec::new();
    for id in 0..3 {
        let (release, handle) = push_gated(&queue, 0, id, &gauge, &started_tx);
        releases.push(Some(release));
        handles.push(handle);
    }

    queue.process();
    assert_eq!(queue.active_workers(), 2);
    assert_eq!(queue.len(), 1);

    let mut first_two = vec![started.recv().await.unwrap(), started.recv().await.unwrap()];
    first_two.sort_unstable();
    assert_eq!(first_two, vec![0, 1]);
    tokio::task::yield_now().await;
    assert!(started.try_recv().is_err(), "third task started early");

    releases[0].take().unwrap().send(()).unwrap();
    assert_eq!(started.recv().await, Some(2));
    assert_eq!(queue.active_workers(), 2);

    for release in releases.iter_mut().filter_map(Option::take) {
        release.send(()).unwrap();
    }
    for (id, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), id);
    }
    queue.idle().await;

    assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
    assert!(!queue.working());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_cap_under_concurrent_producers() {
    let queue: PriorityQueue<u32> = PriorityQueue::new(QueueConfig {
        eager: true,
        max_workers: 3,
        ..QueueConfig::default()
    })
    .unwrap();
    let gauge = Arc::new(Gauge::default());

    let mut producers = Vec::new();
    for producer in 0..4u32 {
        let queue = queue.clone();
        let gauge = gauge.clone();
        producers.push(tokio::spawn(async move {
            let mut handles = Vec::new();
            for n in 0..25u32 {
                let gauge = gauge.clone();
                handles.push(queue.push_fn(producer * 100 + n, move || async move {
                    gauge.enter();
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    gauge.exit();
                    Ok::<_, anyhow::Error>(())
                }));
            }
            handles
        }));
    }

    for producer in producers {
        for handle in producer.await.unwrap() {
            handle.await.unwrap();
        }
    }
    queue.idle().await;

    let stats = queue.stats();
    assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(stats.pushed, 100);
    assert_eq!(stats.succeeded, 100);
    assert_eq!(stats.active_workers, 0);
}

#[tokio::test]
async fn test_lazy_queue_waits_for_process() {
    let queue = PriorityQueue::new(QueueConfig::default()).unwrap();
    let handle = queue.push_fn(1u32, || async { Ok::<_, anyhow::Error>(7) });

    tokio::task::yield_now().await;
    assert!(!queue.working());
    assert_eq!(queue.len(), 1);

    queue.process();
    assert!(queue.working());
    assert_eq!(handle.await.unwrap(), 7);
}

#[tokio::test]
async fn test_eager_queue_dispatches_on_push() {
    let queue = PriorityQueue::new(QueueConfig {
        eager: true,
        ..QueueConfig::default()
    })
    .unwrap();

    let handle = queue.push_fn(1u32, || async { Ok::<_, anyhow::Error>(7) });
    assert!(queue.working());
    assert!(queue.is_empty());
    assert_eq!(handle.await.unwrap(), 7);
}

#[tokio::test]
async fn test_process_is_reentrant() {
    let queue = PriorityQueue::new(QueueConfig {
        max_workers: 2,
        ..QueueConfig::default()
    })
    .unwrap();
    let gauge = Arc::new(Gauge::default());
    let (started_tx, mut started) = mpsc::unbounded_channel();

    let mut releases = Vec::new();
    for id in 0..5 {
        releases.push(push_gated(&queue, 0, id, &gauge, &started_tx));
    }

    queue.process();
    queue.process();
    queue.process();
    assert_eq!(queue.active_workers(), 2);
    assert_eq!(queue.len(), 3);

    // Both slots are occupied before any gate opens.
    for _ in 0..2 {
        started.recv().await.unwrap();
    }
    tokio::task::yield_now().await;
    assert!(started.try_recv().is_err(), "a third worker was launched");

    for (release, _handle) in releases {
        let _ = release.send(());
    }
    queue.idle().await;
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_pause_blocks_dispatch_but_not_running_tasks() {
    let queue = PriorityQueue::new(QueueConfig {
        eager: true,
        ..QueueConfig::default()
    })
    .unwrap();
    let gauge = Arc::new(Gauge::default());
    let (started_tx, mut started) = mpsc::unbounded_channel();

    let (release_first, first) = push_gated(&queue, 0, 0, &gauge, &started_tx);
    assert_eq!(started.recv().await, Some(0));

    queue.pause();
    let (release_second, second) = push_gated(&queue, 0, 1, &gauge, &started_tx);
    assert_eq!(queue.len(), 1);

    release_first.send(()).unwrap();
    assert_eq!(first.await.unwrap(), 0);
    tokio::task::yield_now().await;
    assert!(!queue.working());
    assert_eq!(queue.len(), 1, "paused queue must not dispatch");

    queue.resume();
    assert_eq!(started.recv().await, Some(1));
    release_second.send(()).unwrap();
    assert_eq!(second.await.unwrap(), 1);
}

#[tokio::test]
async fn test_lazy_queue_resumes_after_pause() {
    let queue = PriorityQueue::new(QueueConfig::default()).unwrap();
    let gauge = Arc::new(Gauge::default());
    let (started_tx, mut started) = mpsc::unbounded_channel();

    let (release_first, first) = push_gated(&queue, 0, 0, &gauge, &started_tx);
    let (release_second, second) = push_gated(&queue, 1, 1, &gauge, &started_tx);

    queue.process();
    assert_eq!(started.recv().await, Some(0));
    queue.pause();

    release_first.send(()).unwrap();
    assert_eq!(first.await.unwrap(), 0);
    while queue.working() {
        tokio::task::yield_now().await;
    }
    assert_eq!(queue.len(), 1);
    assert!(!queue.working());

    // No worker is left to re-trigger dispatch; resume must do it.
    queue.resume();
    assert!(queue.working());
    assert_eq!(started.recv().await, Some(1));
    release_second.send(()).unwrap();
    assert_eq!(second.await.unwrap(), 1);
    queue.idle().await;
}

#[tokio::test]
async fn test_resume_does_not_start_an_unprocessed_lazy_queue() {
    let queue = PriorityQueue::new(QueueConfig {
        paused: true,
        ..QueueConfig::default()
    })
    .unwrap();
    let handle = queue.push_fn(1u32, || async { Ok::<_, anyhow::Error>(3) });

    queue.resume();
    assert!(!queue.working());
    assert_eq!(queue.len(), 1);

    queue.process();
    assert_eq!(handle.await.unwrap(), 3);
}

#[tokio::test]
async fn test_failures_are_isolated_per_task() {
    let queue = PriorityQueue::new(QueueConfig {
        eager: true,
        max_workers: 1,
        ..QueueConfig::default()
    })
    .unwrap();

    let failed = queue.push_fn(0u32, || async {
        Err::<(), _>(anyhow::anyhow!("upstream unavailable"))
    });
    let panicked = queue.push(
        1u32,
        |_: (), explode: bool| async move {
            if explode {
                panic!("handler bug");
            }
            Ok::<(), anyhow::Error>(())
        },
        (),
        true,
    );
    let succeeded = queue.push_fn(2u32, || async { Ok::<_, anyhow::Error>("done") });

    match failed.await {
        Err(TaskError::Failed(error)) => assert_eq!(error.to_string(), "upstream unavailable"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(panicked.await.unwrap_err().is_panic());
    assert_eq!(succeeded.await.unwrap(), "done");

    queue.idle().await;
    let stats = queue.stats();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fn_delay_spaces_out_launches() {
    let queue: PriorityQueue<u32> = PriorityQueue::new(QueueConfig {
        max_workers: 3,
        fn_delay: Duration::from_millis(100),
        ..QueueConfig::default()
    })
    .unwrap();

    let mut handles = Vec::new();
    for priority in 0..3u32 {
        handles.push(queue.push_fn(priority, || async { Ok::<_, anyhow::Error>(Instant::now()) }));
    }

    queue.process();
    queue.process();

    let mut starts = Vec::new();
    for handle in handles {
        starts.push(handle.await.unwrap());
    }

    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(100));
    }
    assert_eq!(queue.stats().dispatched, 3);
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_paced_dispatch_until_resumed() {
    let queue: PriorityQueue<u32> = PriorityQueue::new(QueueConfig {
        max_workers: 3,
        fn_delay: Duration::from_millis(100),
        ..QueueConfig::default()
    })
    .unwrap();

    let mut handles = Vec::new();
    for priority in 0..3u32 {
        handles.push(queue.push_fn(priority, || async { Ok::<_, anyhow::Error>(Instant::now()) }));
    }
    let mut handles = handles.into_iter();

    queue.process();
    let first = handles.next().unwrap().await.unwrap();

    // The dispatcher is now sleeping out the delay before the second launch.
    queue.pause();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(queue.stats().dispatched, 1);
    assert_eq!(queue.len(), 2);
    assert!(!queue.working());

    let resumed_at = Instant::now();
    queue.resume();
    let second = handles.next().unwrap().await.unwrap();
    let third = handles.next().unwrap().await.unwrap();

    assert!(resumed_at - first >= Duration::from_millis(500));
    assert!(second >= resumed_at);
    assert!(third - second >= Duration::from_millis(100));
    assert_eq!(queue.stats().dispatched, 3);
}

#[tokio::test]
async fn test_dropping_the_queue_abandons_pending_tasks() {
    let queue = PriorityQueue::new(QueueConfig::default()).unwrap();
    let handle = queue.push_fn(1u32, || async { Ok::<_, anyhow::Error>(()) });

    drop(queue);
    assert!(matches!(handle.await, Err(TaskError::Abandoned)));
}
