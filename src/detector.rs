use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use indicatif::ProgressBar;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A scrollable feed living in some render surface.
#[async_trait]
pub trait FeedSurface: Send {
    /// Current scrollable extent of the feed container, `None` when the container is absent.
    async fn extent(&mut self) -> Result<Option<u64>>;
    async fn scroll_by(&mut self, distance: u64) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub step: u64,
    pub poll_interval: Duration,
    pub quiet_period: Duration,
    pub max_cycles: Option<u64>,
    pub max_duration: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Growing,
    Settled,
}

/// Result of a single scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Scrolled,
    Grew,
    Settled,
    Vanished,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub cycles: u64,
    pub quiet_waits: u64,
    pub growths: u64,
    pub extent: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NoFeed,
    Settled(Report),
    CapReached(Report),
    Cancelled(Report),
}

pub struct LoadDetector {
    config: DetectorConfig,
    phase: Phase,
    scrolled: u64,
    cycles: u64,
    quiet_waits: u64,
    growths: u64,
    last_extent: u64,
    progress: Option<ProgressBar>,
}

impl LoadDetector {
    pub fn new(config: DetectorConfig) -> Self {
        LoadDetector {
            config,
            phase: Phase::Growing,
            scrolled: 0,
            cycles: 0,
            quiet_waits: 0,
            growths: 0,
            last_extent: 0,
            progress: None,
        }
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = Some(pb);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn report(&self) -> Report {
        Report {
            cycles: self.cycles,
            quiet_waits: self.quiet_waits,
            growths: self.growths,
            extent: self.last_extent,
        }
    }

    /// Drive the feed until it settles, a cap trips, or `cancel` fires.
    pub async fn run<S>(&mut self, surface: &mut S, cancel: &CancellationToken) -> Result<Outcome>
    where
        S: FeedSurface + ?Sized,
    {
        let Some(first) = guarded(cancel, surface.extent()).await else {
            self.finish_progress();
            return Ok(Outcome::Cancelled(self.report()));
        };
        let Some(extent) = first? else {
            self.finish_progress();
            info!("No feed container found");
            return Ok(Outcome::NoFeed);
        };
        self.last_extent = extent;
        let started = Instant::now();

        let outcome = loop {
            if self.cap_reached(started) {
                warn!(
                    cycles = self.cycles,
                    extent = self.last_extent,
                    "Feed still growing when the polling cap was reached"
                );
                break Outcome::CapReached(self.report());
            }
            if !pause(self.config.poll_interval, cancel).await {
                break Outcome::Cancelled(self.report());
            }
            match self.tick(surface, cancel).await? {
                Tick::Scrolled | Tick::Grew => {}
                Tick::Settled => break Outcome::Settled(self.report()),
                Tick::Vanished => {
                    warn!("Feed container disappeared while scrolling; treating as loaded");
                    break Outcome::Settled(self.report());
                }
                Tick::Cancelled => break Outcome::Cancelled(self.report()),
            }
        };

        self.finish_progress();
        Ok(outcome)
    }

    /// One poll step: scroll forward, and once the scroll position has caught up with the
    /// last known extent, wait out the quiet period and compare extents.
    pub async fn tick<S>(&mut self, surface: &mut S, cancel: &CancellationToken) -> Result<Tick>
    where
        S: FeedSurface + ?Sized,
    {
        let Some(before) = guarded(cancel, surface.extent()).await else {
            return Ok(Tick::Cancelled);
        };
        let Some(before) = before? else {
            self.phase = Phase::Settled;
            return Ok(Tick::Vanished);
        };
        if guarded(cancel, surface.scroll_by(self.config.step)).await.transpose()?.is_none() {
            return Ok(Tick::Cancelled);
        }
        self.scrolled += self.config.step;
        self.cycles += 1;
        self.last_extent = before;
        if let Some(pb) = &self.progress {
            pb.set_message(format!("cycle {} · extent {}px", self.cycles, before));
            pb.tick();
        }

        if self.scrolled < before {
            return Ok(Tick::Scrolled);
        }

        self.scrolled = 0;
        self.quiet_waits += 1;
        if !pause(self.config.quiet_period, cancel).await {
            return Ok(Tick::Cancelled);
        }

        let Some(after) = guarded(cancel, surface.extent()).await else {
            return Ok(Tick::Cancelled);
        };
        let after = after?.unwrap_or(0);
        if after > before {
            self.growths += 1;
            self.last_extent = after;
            debug!(before, after, "More content loaded, keep scrolling");
            Ok(Tick::Grew)
        } else {
            self.phase = Phase::Settled;
            info!(cycles = self.cycles, extent = before, "Reached the end of the feed");
            Ok(Tick::Settled)
        }
    }

    fn finish_progress(&self) {
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
    }

    fn cap_reached(&self, started: Instant) -> bool {
        let cycles_hit = self.config.max_cycles.is_some_and(|max| self.cycles >= max);
        let time_hit = self
            .config
            .max_duration
            .is_some_and(|max| started.elapsed() >= max);
        cycles_hit || time_hit
    }
}

/// Sleep for `d`, returning `false` if cancelled first.
async fn pause(d: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(d) => true,
    }
}

/// Race a surface call against `cancel`. `None` means the token fired first.
async fn guarded<T, F>(cancel: &CancellationToken, call: F) -> Option<Result<T>>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        r = call => Some(r),
    }
}

// ── Tests ──
