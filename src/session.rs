//! One interactive digitization session.
//!
//! Wires acquisition, the remote digitizer and export around a [`Workflow`].
//! File decoding and remote calls run as spawned tasks that feed their
//! completion back through `Workflow::apply`; the workflow lock is never held
//! across an await.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::acquisition::{self, FileHandle, Rejected, SourceImage, READ_FAILURE_MESSAGE};
use crate::digitize::{DigitizationRequest, Digitizer};
use crate::export::{
    self, Clipboard, ExportError, TextDownload, COPIED_MESSAGE, COPY_FAILED_MESSAGE,
    DOWNLOADED_MESSAGE,
};
use crate::notify::{Notification, Notifier};
use crate::workflow::{Action, Effect, Event, Phase, Refused, Workflow};

/// Background work started by a session call. Awaiting it is optional.
#[must_use = "drop the handle to fire and forget, or await `settled`"]
pub struct Pending {
    tasks: Vec<JoinHandle<()>>,
}

impl Pending {
    /// Wait until every spawned task has delivered its completion.
    pub async fn settled(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Session task failed: {}", e);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error(transparent)]
    Rejected(#[from] Rejected),
    #[error(transparent)]
    Refused(#[from] Refused),
}

#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error(transparent)]
    Refused(#[from] Refused),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// What the presentation layer needs to render the session.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub actions: Vec<Action>,
    pub image: Option<SourceImage>,
    pub text: Option<String>,
}

#[derive(Clone)]
pub struct Session {
    workflow: Arc<Mutex<Workflow>>,
    digitizer: Arc<dyn Digitizer>,
    clipboard: Arc<dyn Clipboard>,
    notifier: Arc<dyn Notifier>,
}

impl Session {
    pub fn new(
        digitizer: Arc<dyn Digitizer>,
        clipboard: Arc<dyn Clipboard>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            workflow: Arc::new(Mutex::new(Workflow::new())),
            digitizer,
            clipboard,
            notifier,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Workflow> {
        self.workflow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Snapshot {
        let workflow = self.lock();
        Snapshot {
            phase: workflow.phase(),
            actions: workflow.available_actions().to_vec(),
            image: workflow.image().cloned(),
            text: workflow.text().map(str::to_string),
        }
    }

    /// Accept a picked or dropped file.
    ///
    /// A non-image is rejected here, with a notification and no state change.
    /// An image is read and encoded in the background; it replaces the current
    /// image when done unless a later selection or a reset came first.
    /// Refused while a request is in flight.
    pub fn select_file(&self, file: FileHandle) -> Result<Pending, SelectError> {
        if let Err(rejected) = acquisition::validate(&file) {
            warn!("Session: {}", rejected);
            self.notifier
                .notify(Notification::error(rejected.user_message()));
            return Err(rejected.into());
        }

        let ticket = self.lock().begin_acquisition().map_err(|refused| {
            debug!("Session: selection refused: {}", refused);
            refused
        })?;
        info!(
            "Session: acquiring {} ({}, {:?}, ticket {})",
            file.name(),
            file.content_type(),
            file.origin(),
            ticket.0
        );

        let session = self.clone();
        let task = tokio::spawn(async move {
            match acquisition::load(file).await {
                Ok(image) => {
                    session.apply(Event::ImageDecoded { ticket, image });
                }
                Err(e) => {
                    warn!("Session: acquisition {} failed: {}", ticket.0, e);
                    let current = session.lock().is_current(ticket);
                    if current {
                        session
                            .notifier
                            .notify(Notification::error(READ_FAILURE_MESSAGE));
                    }
                }
            }
        });

        Ok(Pending { tasks: vec![task] })
    }

    /// Clear image and text. Always succeeds.
    pub fn reset(&self) {
        self.apply(Event::Reset);
    }

    /// Submit the current image. Refused unless an image is selected and no
    /// text or request exists for it yet.
    pub fn digitize(&self) -> Result<Pending, Refused> {
        let effects = self.lock().apply(Event::Digitize)?;
        Ok(self.run(effects))
    }

    /// Replace the text buffer verbatim.
    pub fn edit_text(&self, text: String) -> Result<(), Refused> {
        let effects = self.lock().apply(Event::EditText(text))?;
        drop(self.run(effects));
        Ok(())
    }

    pub async fn copy_to_clipboard(&self) -> Result<(), CopyError> {
        let text = self.current_text(Action::Copy)?;

        match self.clipboard.write_text(&text).await {
            Ok(()) => {
                self.notifier.notify(Notification::success(COPIED_MESSAGE));
                Ok(())
            }
            Err(e) => {
                warn!("Session: clipboard write failed: {}", e);
                self.notifier
                    .notify(Notification::error(COPY_FAILED_MESSAGE));
                Err(e.into())
            }
        }
    }

    /// Build the plain-text download of the current buffer.
    pub fn download(&self) -> Result<TextDownload, Refused> {
        let text = self.current_text(Action::Download)?;
        let download = export::download_as_file(&text);
        self.notifier
            .notify(Notification::success(DOWNLOADED_MESSAGE));
        Ok(download)
    }

    fn current_text(&self, action: Action) -> Result<String, Refused> {
        let workflow = self.lock();
        workflow
            .text()
            .map(str::to_string)
            .ok_or(Refused::NotAvailable {
                action,
                phase: workflow.phase(),
            })
    }

    /// Apply a completion event. Stale completions are dropped quietly.
    fn apply(&self, event: Event) {
        let result = self.lock().apply(event);
        match result {
            Ok(effects) => drop(self.run(effects)),
            Err(refused) => debug!("Session: discarded event: {}", refused),
        }
    }

    fn run(&self, effects: Vec<Effect>) -> Pending {
        let mut tasks = Vec::new();
        for effect in effects {
            match effect {
                Effect::Notify(notification) => self.notifier.notify(notification),
                Effect::Submit(request) => tasks.push(self.submit(request)),
            }
        }
        Pending { tasks }
    }

    fn submit(&self, request: DigitizationRequest) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            debug!(
                "Session: calling {} for epoch {}",
                session.digitizer.name(),
                request.epoch.0
            );
            let outcome = session.digitizer.digitize(&request).await;
            session.apply(Event::Resolved {
                epoch: request.epoch,
                outcome,
            });
        })
    }
}
