//! Delayed-send scheduler actor
//!
//! Owns a min-heap of pending commands keyed by `(fire_at, sequence)` and
//! sleeps until the earliest one is due. Equal fire times leave in the order
//! they were scheduled. Everything is cancellable or drainable at once.

use super::Outbox;
use crate::error::RoutingWarning;
use crate::scene::OutgoingCommand;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

/// What to do with pending commands when the scheduler stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Drop everything still pending
    Cancel,
    /// Send everything still pending immediately, in fire order
    Drain,
}

#[derive(Debug)]
pub enum SchedulerCommand {
    Schedule {
        fire_at: Instant,
        command: OutgoingCommand,
    },
    /// Drop all pending commands, replying with how many were dropped
    CancelAll { response: oneshot::Sender<usize> },
    /// Send all pending commands now, replying with how many were sent
    Drain { response: oneshot::Sender<usize> },
    Pending { response: oneshot::Sender<usize> },
    Shutdown {
        mode: ShutdownMode,
        response: oneshot::Sender<usize>,
    },
}

#[derive(Debug)]
struct Scheduled {
    fire_at: Instant,
    seq: u64,
    command: OutgoingCommand,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.fire_at, self.seq).cmp(&(other.fire_at, other.seq))
    }
}

pub struct Scheduler {
    heap: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
    outbox: Arc<Outbox>,
    command_rx: mpsc::UnboundedReceiver<SchedulerCommand>,
    fired: u64,
}

impl Scheduler {
    /// Spawn the scheduler task; fired commands are delivered through `outbox`
    pub fn spawn(outbox: Arc<Outbox>) -> SchedulerHandle {
        let (cmd_tx, command_rx) = mpsc::unbounded_channel();

        let scheduler = Scheduler {
            heap: BinaryHeap::new(),
            next_seq: 0,
            outbox,
            command_rx,
            fired: 0,
        };
        tokio::spawn(scheduler.run());

        SchedulerHandle { cmd_tx }
    }

    async fn run(mut self) {
        debug!("Scheduler run loop started");

        loop {
            let next = self.heap.peek().map(|Reverse(s)| s.fire_at);
            let due = async move {
                match next {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                _ = due => self.fire_due().await,

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    trace!(?cmd, "Processing scheduler command");

                    match cmd {
                        SchedulerCommand::Schedule { fire_at, command } => {
                            let seq = self.next_seq;
                            self.next_seq += 1;
                            self.heap.push(Reverse(Scheduled { fire_at, seq, command }));
                        }
                        SchedulerCommand::CancelAll { response } => {
                            let _ = response.send(self.cancel_all());
                        }
                        SchedulerCommand::Drain { response } => {
                            let sent = self.drain().await;
                            let _ = response.send(sent);
                        }
                        SchedulerCommand::Pending { response } => {
                            let _ = response.send(self.heap.len());
                        }
                        SchedulerCommand::Shutdown { mode, response } => {
                            let count = match mode {
                                ShutdownMode::Cancel => self.cancel_all(),
                                ShutdownMode::Drain => self.drain().await,
                            };
                            let _ = response.send(count);
                            break;
                        }
                    }
                }
            }
        }

        info!("🛑 Scheduler stopped ({} delayed commands fired)", self.fired);
    }

    async fn fire_due(&mut self) {
        let now = Instant::now();
        while self.heap.peek().is_some_and(|Reverse(s)| s.fire_at <= now) {
            if let Some(Reverse(scheduled)) = self.heap.pop() {
                self.fire(scheduled).await;
            }
        }
    }

    async fn fire(&mut self, scheduled: Scheduled) {
        trace!(seq = scheduled.seq, "Firing delayed command");
        self.fired += 1;
        self.outbox.deliver(&scheduled.command).await;
    }

    fn cancel_all(&mut self) -> usize {
        let count = self.heap.len();
        self.heap.clear();
        if count > 0 {
            info!("🗑️  Cancelled {} pending delayed command(s)", count);
        }
        count
    }

    async fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Some(Reverse(scheduled)) = self.heap.pop() {
            self.fire(scheduled).await;
            count += 1;
        }
        if count > 0 {
            info!("⏩ Drained {} pending delayed command(s)", count);
        }
        count
    }
}

/// Handle to the scheduler task, cheap to clone
#[derive(Clone)]
pub struct SchedulerHandle {
    cmd_tx: mpsc::UnboundedSender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Schedule `command` to be delivered after `delay`, measured from now.
    ///
    /// Fire-and-forget: returns immediately. A delay too far out to be
    /// represented as an instant is dropped with a warning and `false`.
    pub fn schedule(&self, command: OutgoingCommand, delay: Duration) -> bool {
        let Some(fire_at) = Instant::now().checked_add(delay) else {
            let warning = RoutingWarning::DelayOutOfRange {
                address: command.address.clone(),
                delay,
            };
            warn!("⚠️  {}", warning);
            return false;
        };
        debug!("⏱️  {} scheduled in {:?}", command, delay);
        self.cmd_tx
            .send(SchedulerCommand::Schedule { fire_at, command })
            .is_ok()
    }

    pub async fn cancel_all(&self) -> usize {
        self.request(|response| SchedulerCommand::CancelAll { response })
            .await
    }

    pub async fn drain(&self) -> usize {
        self.request(|response| SchedulerCommand::Drain { response }).await
    }

    pub async fn pending(&self) -> usize {
        self.request(|response| SchedulerCommand::Pending { response })
            .await
    }

    /// Stop the scheduler, cancelling or draining what is left
    pub async fn shutdown(&self, mode: ShutdownMode) -> usize {
        self.request(|response| SchedulerCommand::Shutdown { mode, response })
            .await
    }

    async fn request<F>(&self, make: F) -> usize
    where
        F: FnOnce(oneshot::Sender<usize>) -> SchedulerCommand,
    {
        let (response_tx, response_rx) = oneshot::channel();
        if self.cmd_tx.send(make(response_tx)).is_err() {
            return 0;
        }
        response_rx.await.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Outbox;
    use crate::drivers::ConsoleTransport;
    use crate::endpoints::{Endpoint, EndpointRegistry};
    use crate::value::{TypedValue, ValueType};
    use tokio::time::sleep;

    fn setup() -> (Arc<ConsoleTransport>, SchedulerHandle) {
        let transport = Arc::new(ConsoleTransport::quiet());
        let outbox = Arc::new(Outbox::new(transport.clone()));
        let mut endpoints = EndpointRegistry::new();
        endpoints.insert(Endpoint::new("qlc", "127.0.0.1", 7700, ValueType::Int));
        outbox.install(endpoints);
        (transport, Scheduler::spawn(outbox))
    }

    fn cmd(address: &str, value: i32) -> OutgoingCommand {
        OutgoingCommand::new(address, vec![TypedValue::Int(value)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_in_time_then_sequence_order() {
        let (transport, scheduler) = setup();

        scheduler.schedule(cmd("/qlc/late", 1), Duration::from_secs(2));
        scheduler.schedule(cmd("/qlc/first", 1), Duration::from_secs(1));
        scheduler.schedule(cmd("/qlc/second", 1), Duration::from_secs(1));

        sleep(Duration::from_millis(500)).await;
        assert!(transport.history().is_empty());
        assert_eq!(scheduler.pending().await, 3);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(
            transport.lines(),
            vec!["127.0.0.1:7700 /qlc/first 1", "127.0.0.1:7700 /qlc/second 1"]
        );

        sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.history().len(), 3);
        assert_eq!(scheduler.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_delay_is_dropped() {
        let (transport, scheduler) = setup();

        assert!(!scheduler.schedule(cmd("/qlc/never", 1), Duration::MAX));
        assert_eq!(scheduler.pending().await, 0);

        scheduler.schedule(cmd("/qlc/after", 1), Duration::from_secs(1));
        sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.lines(), vec!["127.0.0.1:7700 /qlc/after 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_drops_pending() {
        let (transport, scheduler) = setup();
        scheduler.schedule(cmd("/qlc/a", 1), Duration::from_secs(5));
        scheduler.schedule(cmd("/qlc/b", 1), Duration::from_secs(6));

        assert_eq!(scheduler.cancel_all().await, 2);
        sleep(Duration::from_secs(10)).await;
        assert!(transport.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_sends_now_in_fire_order() {
        let (transport, scheduler) = setup();
        scheduler.schedule(cmd("/qlc/b", 1), Duration::from_secs(6));
        scheduler.schedule(cmd("/qlc/a", 1), Duration::from_secs(5));

        assert_eq!(scheduler.drain().await, 2);
        assert_eq!(
            transport.lines(),
            vec!["127.0.0.1:7700 /qlc/a 1", "127.0.0.1:7700 /qlc/b 1"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_modes() {
        let (transport, scheduler) = setup();
        scheduler.schedule(cmd("/qlc/a", 1), Duration::from_secs(5));
        assert_eq!(scheduler.shutdown(ShutdownMode::Drain).await, 1);
        assert_eq!(transport.history().len(), 1);
        // stopped: further requests answer zero
        assert_eq!(scheduler.pending().await, 0);

        let (transport, scheduler) = setup();
        scheduler.schedule(cmd("/qlc/a", 1), Duration::from_secs(5));
        assert_eq!(scheduler.shutdown(ShutdownMode::Cancel).await, 1);
        sleep(Duration::from_secs(10)).await;
        assert!(transport.history().is_empty());
    }
}
