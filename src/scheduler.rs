//! Lifecycle of the background refresh loop plus the manual display
//! operations that share its Catalog -> Pipeline -> Sink path.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, bail};
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogImage, Direction};
use crate::config::{ConfigStore, DisplaySettings};
use crate::display::DisplaySink;
use crate::error::DisplayError;
use crate::events::{DisplayOutcome, ScheduleState};
use crate::processing::{RenderSettings, render};
use crate::tasks;

/// State shared between the loop and foreground callers.
pub(crate) struct Shared {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) config: Arc<dyn ConfigStore>,
    pub(crate) wake: Notify,
    sink: Mutex<Box<dyn DisplaySink>>,
}

impl Shared {
    fn lock_sink(&self) -> MutexGuard<'_, Box<dyn DisplaySink>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One loop iteration minus the wait: rescan, advance, display.
    pub(crate) fn refresh_cycle(&self) -> Result<DisplayOutcome, DisplayError> {
        let report = self.catalog.rescan();
        if report.entries == 0 {
            info!(folder = %self.catalog.folder().display(), "no images to display");
            return Ok(DisplayOutcome::NoImage);
        }
        self.show_with(|catalog| {
            catalog.advance(Direction::Forward);
            catalog.current_image()
        })
    }

    /// Select an image and push it to the sink.
    ///
    /// The sink lock is held across selection, so cursor moves and the frames
    /// they produce reach the panel in the same order.
    pub(crate) fn show_with<F>(&self, select: F) -> Result<DisplayOutcome, DisplayError>
    where
        F: FnOnce(&Catalog) -> CatalogImage,
    {
        let mut sink = self.lock_sink();
        let loaded = match select(&self.catalog) {
            CatalogImage::Found(loaded) => loaded,
            CatalogImage::Empty => return Ok(DisplayOutcome::NoImage),
            CatalogImage::Unreadable(entry) => {
                warn!(name = %entry.name, "selected image is unreadable; display left unchanged");
                return Ok(DisplayOutcome::Unreadable { name: entry.name });
            }
        };

        let display = DisplaySettings::load(&*self.config);
        let settings = RenderSettings::from_display(&display, sink.resolution());
        let frame = render(&loaded.image, &settings)
            .with_context(|| format!("failed to render {}", loaded.entry.name))
            .map_err(DisplayError::Render)?;
        sink.set_image(&frame).map_err(DisplayError::Sink)?;
        sink.show().map_err(DisplayError::Sink)?;

        info!(
            name = %loaded.entry.name,
            width = settings.width,
            height = settings.height,
            "image displayed"
        );
        Ok(DisplayOutcome::Shown {
            name: loaded.entry.name,
        })
    }
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

enum Lifecycle {
    Stopped,
    Running(RunningLoop),
    /// Flips to `true` once the loop has exited and the state is `Stopped`.
    Stopping(watch::Receiver<bool>),
}

type SharedLifecycle = Arc<Mutex<Lifecycle>>;

fn lock_lifecycle(lifecycle: &SharedLifecycle) -> MutexGuard<'_, Lifecycle> {
    lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Scheduler {
    shared: Arc<Shared>,
    lifecycle: SharedLifecycle,
}

impl Scheduler {
    pub fn new(
        catalog: Arc<Catalog>,
        config: Arc<dyn ConfigStore>,
        sink: Box<dyn DisplaySink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                catalog,
                config,
                wake: Notify::new(),
                sink: Mutex::new(sink),
            }),
            lifecycle: Arc::new(Mutex::new(Lifecycle::Stopped)),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.shared.catalog
    }

    /// Spawn the refresh loop on the current tokio runtime.
    ///
    /// Starting an already running scheduler only logs a warning. Starting
    /// while a `stop` is still waiting for the loop to exit is an error.
    pub fn start(&self) -> Result<()> {
        let handle = Handle::try_current().context("scheduler must be started inside a tokio runtime")?;
        let mut lifecycle = lock_lifecycle(&self.lifecycle);
        match &*lifecycle {
            Lifecycle::Running(_) => {
                warn!("scheduler already running; start ignored");
                return Ok(());
            }
            Lifecycle::Stopping(_) => bail!("scheduler is still stopping; start refused"),
            Lifecycle::Stopped => {}
        }
        let cancel = CancellationToken::new();
        let task = handle.spawn(tasks::refresh::run(Arc::clone(&self.shared), cancel.clone()));
        *lifecycle = Lifecycle::Running(RunningLoop {
            cancel,
            handle: task,
        });
        info!("scheduler started");
        Ok(())
    }

    /// Cancel the loop and wait until it has exited. An in-flight tick
    /// finishes first. Concurrent callers all wait for the same exit; calling
    /// it on a stopped scheduler returns immediately.
    pub async fn stop(&self) {
        let mut exited = {
            let mut lifecycle = lock_lifecycle(&self.lifecycle);
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Stopped => {
                    debug!("stop requested but scheduler is not running");
                    return;
                }
                Lifecycle::Stopping(exited) => {
                    *lifecycle = Lifecycle::Stopping(exited.clone());
                    exited
                }
                Lifecycle::Running(RunningLoop { cancel, handle }) => {
                    cancel.cancel();
                    let (done, exited) = watch::channel(false);
                    *lifecycle = Lifecycle::Stopping(exited.clone());
                    // Joined on its own task so the state settles even if
                    // this caller stops waiting.
                    let shared_lifecycle = Arc::clone(&self.lifecycle);
                    tokio::spawn(async move {
                        if let Err(err) = handle.await {
                            warn!("refresh loop ended abnormally: {err}");
                        }
                        *lock_lifecycle(&shared_lifecycle) = Lifecycle::Stopped;
                        let _ = done.send(true);
                        info!("scheduler stopped");
                    });
                    exited
                }
            }
        };
        if exited.wait_for(|done| *done).await.is_err() {
            warn!("scheduler stop watcher vanished before the loop exited");
        }
    }

    /// Wake the loop early. Triggers issued before the loop waits again
    /// collapse into a single early iteration.
    pub fn trigger(&self) {
        debug!("refresh triggered");
        self.shared.wake.notify_one();
    }

    pub fn state(&self) -> ScheduleState {
        match &*lock_lifecycle(&self.lifecycle) {
            Lifecycle::Stopped => ScheduleState::Stopped,
            Lifecycle::Running(_) => ScheduleState::Running,
            Lifecycle::Stopping(_) => ScheduleState::Stopping,
        }
    }

    /// Display the image at the cursor without moving it.
    pub fn refresh_only(&self) -> Result<DisplayOutcome, DisplayError> {
        self.shared.show_with(Catalog::current_image)
    }

    pub fn show_next(&self) -> Result<DisplayOutcome, DisplayError> {
        self.show_step(Direction::Forward)
    }

    pub fn show_previous(&self) -> Result<DisplayOutcome, DisplayError> {
        self.show_step(Direction::Backward)
    }

    fn show_step(&self, direction: Direction) -> Result<DisplayOutcome, DisplayError> {
        self.shared.show_with(|catalog| {
            catalog.advance(direction);
            catalog.current_image()
        })
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Lifecycle::Running(running) = &*lock_lifecycle(&self.lifecycle) {
            running.cancel.cancel();
        }
    }
}
