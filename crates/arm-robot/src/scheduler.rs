//! 周期调度器
//!
//! 注册 N 个相互独立的周期动作，每个动作有自己的周期和回调。
//!
//! 两种驱动方式：
//!
//! - **轮询**（`poll()`）：在调用线程上执行所有到期的 tick，时间来自 `Clock`。
//!   配合 `ManualClock` 推进虚拟时间，测试无需等待真实时间。
//!   虚拟时间跨过多个周期时，每个错过的周期都会执行一次。
//! - **线程**（`start()`）：每个动作一个线程，用 `spin_sleep` 对齐锚点。
//!   一个动作的慢 tick 不影响其他动作；自身超时（overrun）的周期被跳过并记录。
//!
//! 回调返回的错误和 panic 都在调度器内部捕获，记录为 `error!`，
//! 本周期视为跳过，后续 tick 照常执行。

use crate::error::{RobotError, TickError};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 线程模式下单次睡眠上限，决定取消的响应时间
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(10);

/// 时间源
///
/// 返回自时钟创建以来的单调时间。
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// 基于 `Instant` 的单调时钟
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// 手动推进的虚拟时钟
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

/// 周期回调
pub type TickFn = Box<dyn FnMut() -> Result<(), TickError> + Send>;

/// 动作标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(u64);

/// 动作统计
#[derive(Debug, Default)]
struct ActionCounters {
    ticks: AtomicU64,
    failures: AtomicU64,
    overruns: AtomicU64,
}

/// 动作统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionStats {
    /// 成功完成的 tick
    pub ticks: u64,
    /// 返回错误或 panic 的 tick
    pub failures: u64,
    /// 线程模式下因超时跳过的周期
    pub overruns: u64,
}

impl ActionCounters {
    fn snapshot(&self) -> ActionStats {
        ActionStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }
}

struct Action {
    id: ActionId,
    name: String,
    period: Duration,
    next_due: Duration,
    callback: TickFn,
    counters: Arc<ActionCounters>,
}

impl Action {
    /// 执行一次 tick，捕获错误和 panic
    fn fire(&mut self) {
        let callback = &mut self.callback;
        let result = match panic::catch_unwind(AssertUnwindSafe(|| callback())) {
            Ok(result) => result,
            Err(payload) => Err(TickError::Panicked(panic_message(payload.as_ref()))),
        };

        match result {
            Ok(()) => {
                self.counters.ticks.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                error!("Scheduler action '{}' tick failed: {}", self.name, e);
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// 周期调度器
pub struct CyclicScheduler {
    clock: Arc<dyn Clock>,
    actions: Vec<Action>,
    next_id: u64,
}

impl CyclicScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            actions: Vec::new(),
            next_id: 0,
        }
    }

    /// 使用单调时钟
    pub fn monotonic() -> Self {
        Self::new(Arc::new(MonotonicClock::new()))
    }

    /// 注册周期动作，首次 tick 在一个周期之后
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        period: Duration,
        callback: F,
    ) -> Result<ActionId, RobotError>
    where
        F: FnMut() -> Result<(), TickError> + Send + 'static,
    {
        let name = name.into();
        if period.is_zero() {
            return Err(RobotError::Scheduler(format!(
                "action '{}' has a zero period",
                name
            )));
        }

        let id = ActionId(self.next_id);
        self.next_id += 1;
        debug!("Scheduler: registered '{}' every {:?}", name, period);

        self.actions.push(Action {
            id,
            name,
            period,
            next_due: self.clock.now() + period,
            callback: Box::new(callback),
            counters: Arc::new(ActionCounters::default()),
        });
        Ok(id)
    }

    /// 取消单个动作；返回是否存在
    pub fn cancel(&mut self, id: ActionId) -> bool {
        let before = self.actions.len();
        self.actions.retain(|a| a.id != id);
        before != self.actions.len()
    }

    /// 取消全部动作
    pub fn cancel_all(&mut self) {
        self.actions.clear();
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn stats(&self, id: ActionId) -> Option<ActionStats> {
        self.actions
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.counters.snapshot())
    }

    /// 按到期时间顺序执行所有已到期的 tick，返回执行次数
    ///
    /// 到期时间相同的动作按注册顺序执行。
    pub fn poll(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;

        while let Some(action) = self
            .actions
            .iter_mut()
            .filter(|a| a.next_due <= now)
            .min_by_key(|a| a.next_due)
        {
            action.fire();
            action.next_due += action.period;
            fired += 1;
        }
        fired
    }

    /// 每个动作启动一个线程
    pub fn start(self) -> Result<SchedulerHandle, RobotError> {
        let mut handle = SchedulerHandle {
            workers: Vec::with_capacity(self.actions.len()),
        };

        for action in self.actions {
            let cancelled = Arc::new(AtomicBool::new(false));
            let id = action.id;
            let name = action.name.clone();
            let counters = action.counters.clone();
            let clock = self.clock.clone();
            let flag = cancelled.clone();

            let join = std::thread::Builder::new()
                .name(format!("arm-tick-{}", name))
                .spawn(move || worker_loop(action, clock, flag))
                .map_err(|source| RobotError::Spawn {
                    name: name.clone(),
                    source,
                });
            // 已启动的线程随 handle drop 停止
            let join = join?;

            handle.workers.push(Worker {
                id,
                name,
                cancelled,
                counters,
                join: Some(join),
            });
        }

        info!("Scheduler started with {} action(s)", handle.workers.len());
        Ok(handle)
    }
}

fn worker_loop(mut action: Action, clock: Arc<dyn Clock>, cancelled: Arc<AtomicBool>) {
    let mut next_due = action.next_due;

    while !cancelled.load(Ordering::Acquire) {
        let now = clock.now();
        if now < next_due {
            spin_sleep::sleep((next_due - now).min(MAX_SLEEP_SLICE));
            continue;
        }

        action.fire();
        next_due += action.period;

        // 超时：跳过已经错过的周期，锚点保持在原有相位上
        let now = clock.now();
        if now >= next_due {
            let behind = (now - next_due).as_nanos() / action.period.as_nanos();
            let missed = u32::try_from(behind).unwrap_or(u32::MAX).saturating_add(1);
            next_due += action.period.saturating_mul(missed);
            action
                .counters
                .overruns
                .fetch_add(u64::from(missed), Ordering::Relaxed);
            warn!(
                "Scheduler action '{}' overran its {:?} period, skipped {} tick(s)",
                action.name, action.period, missed
            );
        }
    }
    debug!("Scheduler action '{}' stopped", action.name);
}

struct Worker {
    id: ActionId,
    name: String,
    cancelled: Arc<AtomicBool>,
    counters: Arc<ActionCounters>,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    fn stop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            error!("Scheduler thread '{}' panicked", self.name);
        }
    }
}

/// 线程模式的调度器句柄
///
/// `stop()` 或 drop 时取消并 join 全部线程。
pub struct SchedulerHandle {
    workers: Vec<Worker>,
}

impl SchedulerHandle {
    /// 取消单个动作并等待其线程退出
    pub fn cancel(&mut self, id: ActionId) -> bool {
        let Some(pos) = self.workers.iter().position(|w| w.id == id) else {
            return false;
        };
        let mut worker = self.workers.remove(pos);
        worker.stop();
        true
    }

    /// 取消全部动作
    pub fn stop(&mut self) {
        for worker in &mut self.workers {
            worker.stop();
        }
        if !self.workers.is_empty() {
            info!("Scheduler stopped");
        }
        self.workers.clear();
    }

    /// 仍在运行的动作数
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn stats(&self, id: ActionId) -> Option<ActionStats> {
        self.workers
            .iter()
            .find(|w| w.id == id)
            .map(|w| w.counters.snapshot())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn manual() -> (Arc<ManualClock>, CyclicScheduler) {
        let clock = Arc::new(ManualClock::new());
        let scheduler = CyclicScheduler::new(clock.clone());
        (clock, scheduler)
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> Result<(), TickError> + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_first_tick_after_one_period() {
        let (clock, mut scheduler) = manual();
        let (count, cb) = counter();
        scheduler.register("a", Duration::from_millis(50), cb).unwrap();

        clock.advance(Duration::from_millis(49));
        assert_eq!(scheduler.poll(), 0);
        clock.advance(Duration::from_millis(1));
        assert_eq!(scheduler.poll(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_independent_rates() {
        let (clock, mut scheduler) = manual();
        let (fast, cb_fast) = counter();
        let (slow, cb_slow) = counter();
        scheduler.register("fast", Duration::from_millis(50), cb_fast).unwrap();
        scheduler.register("slow", Duration::from_millis(1000), cb_slow).unwrap();

        for _ in 0..40 {
            clock.advance(Duration::from_millis(50));
            scheduler.poll();
        }
        assert_eq!(fast.load(Ordering::SeqCst), 40);
        assert_eq!(slow.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missed_periods_fire_in_time_order() {
        let (clock, mut scheduler) = manual();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (name, ms) in [("a", 30u64), ("b", 20)] {
            let log = log.clone();
            scheduler
                .register(name, Duration::from_millis(ms), move || {
                    log.lock().push(name);
                    Ok(())
                })
                .unwrap();
        }

        clock.advance(Duration::from_millis(60));
        assert_eq!(scheduler.poll(), 5);
        // b@20 a@30 b@40 a@60 b@60（同一时刻按注册顺序）
        assert_eq!(*log.lock(), vec!["b", "a", "b", "a", "b"]);
    }

    #[test]
    fn test_error_and_panic_do_not_stop_scheduling() {
        let (clock, mut scheduler) = manual();
        let mut n = 0;
        let flaky = scheduler
            .register("flaky", Duration::from_millis(10), move || {
                n += 1;
                match n {
                    1 => Err(TickError::Other("boom".into())),
                    2 => panic!("tick panic"),
                    _ => Ok(()),
                }
            })
            .unwrap();
        let (other, cb) = counter();
        scheduler.register("other", Duration::from_millis(10), cb).unwrap();

        for _ in 0..4 {
            clock.advance(Duration::from_millis(10));
            scheduler.poll();
        }

        assert_eq!(
            scheduler.stats(flaky),
            Some(ActionStats {
                ticks: 2,
                failures: 2,
                overruns: 0
            })
        );
        assert_eq!(other.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_cancel_single_and_all() {
        let (clock, mut scheduler) = manual();
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();
        let id_a = scheduler.register("a", Duration::from_millis(10), cb_a).unwrap();
        scheduler.register("b", Duration::from_millis(10), cb_b).unwrap();

        assert!(scheduler.cancel(id_a));
        assert!(!scheduler.cancel(id_a));
        clock.advance(Duration::from_millis(10));
        scheduler.poll();
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);

        scheduler.cancel_all();
        clock.advance(Duration::from_millis(10));
        assert_eq!(scheduler.poll(), 0);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_zero_period_rejected() {
        let (_clock, mut scheduler) = manual();
        assert!(matches!(
            scheduler.register("bad", Duration::ZERO, || Ok(())),
            Err(RobotError::Scheduler(_))
        ));
    }

    #[test]
    fn test_threaded_slow_action_does_not_block_fast_one() {
        let mut scheduler = CyclicScheduler::monotonic();
        let (fast, cb_fast) = counter();
        let fast_id = scheduler.register("fast", Duration::from_millis(5), cb_fast).unwrap();
        let slow_id = scheduler
            .register("slow", Duration::from_millis(5), || {
                std::thread::sleep(Duration::from_millis(100));
                Ok(())
            })
            .unwrap();

        let mut handle = scheduler.start().unwrap();
        std::thread::sleep(Duration::from_millis(150));

        assert!(fast.load(Ordering::SeqCst) >= 10);
        assert!(handle.cancel(slow_id));
        assert_eq!(handle.len(), 1);
        assert!(handle.stats(fast_id).is_some());

        handle.stop();
        let after_stop = fast.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(fast.load(Ordering::SeqCst), after_stop);
    }
}
