//! Digitization workflow state machine.
//!
//! `Workflow::apply` is the only way state changes. Completion of a file decode
//! or of a remote call arrives as an [`Event`] carrying the ticket or epoch it
//! was issued under, so completions that were overtaken by a later gesture are
//! refused instead of resurrecting old state. Side effects are returned as
//! [`Effect`]s for the caller to run.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::acquisition::{AcquisitionTicket, SourceImage};
use crate::digitize::{DigitizationRequest, DigitizeError, Epoch, RecognizedText};
use crate::notify::Notification;

pub const SUCCESS_MESSAGE: &str = "Text extracted successfully!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    ImageSelected,
    Processing,
    TextReady,
}

/// User actions the presentation layer may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SelectFile,
    Reset,
    Digitize,
    EditText,
    Copy,
    Download,
}

impl Phase {
    /// Actions offered in this phase. `Digitize` only ever appears in
    /// `ImageSelected`, which keeps at most one request in flight.
    pub fn actions(self) -> &'static [Action] {
        match self {
            Phase::Idle => &[Action::SelectFile],
            Phase::ImageSelected => &[Action::SelectFile, Action::Reset, Action::Digitize],
            Phase::Processing => &[],
            Phase::TextReady => &[
                Action::SelectFile,
                Action::Reset,
                Action::EditText,
                Action::Copy,
                Action::Download,
            ],
        }
    }
}

#[derive(Debug)]
enum State {
    Idle,
    ImageSelected { image: SourceImage },
    Processing { image: SourceImage, epoch: Epoch },
    TextReady { image: SourceImage, text: String },
}

impl State {
    fn phase(&self) -> Phase {
        match self {
            State::Idle => Phase::Idle,
            State::ImageSelected { .. } => Phase::ImageSelected,
            State::Processing { .. } => Phase::Processing,
            State::TextReady { .. } => Phase::TextReady,
        }
    }
}

#[derive(Debug)]
pub enum Event {
    /// An acquisition finished encoding.
    ImageDecoded {
        ticket: AcquisitionTicket,
        image: SourceImage,
    },
    Reset,
    Digitize,
    /// The remote call for `epoch` finished.
    Resolved {
        epoch: Epoch,
        outcome: Result<RecognizedText, DigitizeError>,
    },
    EditText(String),
}

#[derive(Debug)]
pub enum Effect {
    Submit(DigitizationRequest),
    Notify(Notification),
}

/// An event that had no effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Refused {
    #[error("{action:?} is not available while {phase:?}")]
    NotAvailable { action: Action, phase: Phase },
    #[error("acquisition {0:?} was superseded by a later one")]
    StaleAcquisition(AcquisitionTicket),
    #[error("resolution for {0:?} arrived after the workflow moved on")]
    StaleResolution(Epoch),
}

#[derive(Debug)]
pub struct Workflow {
    state: State,
    latest_ticket: u64,
    latest_epoch: u64,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            latest_ticket: 0,
            latest_epoch: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn image(&self) -> Option<&SourceImage> {
        match &self.state {
            State::Idle => None,
            State::ImageSelected { image }
            | State::Processing { image, .. }
            | State::TextReady { image, .. } => Some(image),
        }
    }

    /// The text buffer; only present in `TextReady`.
    pub fn text(&self) -> Option<&str> {
        match &self.state {
            State::TextReady { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn available_actions(&self) -> &'static [Action] {
        self.phase().actions()
    }

    /// Issue a ticket for a new acquisition. Only the most recent ticket's
    /// completion will be applied. Refused while a request is in flight.
    pub fn begin_acquisition(&mut self) -> Result<AcquisitionTicket, Refused> {
        if self.phase() == Phase::Processing {
            return Err(Refused::NotAvailable {
                action: Action::SelectFile,
                phase: Phase::Processing,
            });
        }
        self.latest_ticket += 1;
        Ok(AcquisitionTicket(self.latest_ticket))
    }

    /// Whether `ticket` is still the latest acquisition.
    pub fn is_current(&self, ticket: AcquisitionTicket) -> bool {
        ticket.0 == self.latest_ticket
    }

    pub fn apply(&mut self, event: Event) -> Result<Vec<Effect>, Refused> {
        match event {
            Event::ImageDecoded { ticket, image } => {
                if !self.is_current(ticket) {
                    return Err(Refused::StaleAcquisition(ticket));
                }
                if self.phase() == Phase::Processing {
                    return Err(Refused::NotAvailable {
                        action: Action::SelectFile,
                        phase: Phase::Processing,
                    });
                }
                debug!(
                    "Workflow: image {} ({}) selected (ticket {})",
                    image.name(),
                    image.mime_type(),
                    ticket.0
                );
                // Any text belongs to the old image.
                self.state = State::ImageSelected { image };
                Ok(Vec::new())
            }

            Event::Reset => {
                // Pending decodes predate the reset and must not land afterwards.
                self.latest_ticket += 1;
                if self.phase() != Phase::Idle {
                    debug!("Workflow: reset from {:?}", self.phase());
                }
                self.state = State::Idle;
                Ok(Vec::new())
            }

            Event::Digitize => match std::mem::replace(&mut self.state, State::Idle) {
                State::ImageSelected { image } => {
                    // Decodes still running were started for the image being submitted.
                    self.latest_ticket += 1;
                    self.latest_epoch += 1;
                    let epoch = Epoch(self.latest_epoch);
                    info!("Workflow: digitizing {} (epoch {})", image.name(), epoch.0);
                    self.state = State::Processing {
                        image: image.clone(),
                        epoch,
                    };
                    Ok(vec![Effect::Submit(DigitizationRequest { epoch, image })])
                }
                other => {
                    let phase = other.phase();
                    self.state = other;
                    Err(Refused::NotAvailable {
                        action: Action::Digitize,
                        phase,
                    })
                }
            },

            Event::Resolved { epoch, outcome } => {
                match std::mem::replace(&mut self.state, State::Idle) {
                    State::Processing {
                        image,
                        epoch: current,
                    } if current == epoch => match outcome {
                        Ok(text) => {
                            info!(
                                "Workflow: epoch {} resolved with {} chars",
                                epoch.0,
                                text.as_str().len()
                            );
                            self.state = State::TextReady {
                                image,
                                text: text.into_string(),
                            };
                            Ok(vec![Effect::Notify(Notification::success(SUCCESS_MESSAGE))])
                        }
                        Err(e) => {
                            warn!("Workflow: epoch {} failed: {}", epoch.0, e);
                            self.state = State::ImageSelected { image };
                            Ok(vec![Effect::Notify(Notification::error(e.display_message()))])
                        }
                    },
                    other => {
                        self.state = other;
                        Err(Refused::StaleResolution(epoch))
                    }
                }
            }

            Event::EditText(new_text) => match &mut self.state {
                State::TextReady { text, .. } => {
                    *text = new_text;
                    Ok(Vec::new())
                }
                other => Err(Refused::NotAvailable {
                    action: Action::EditText,
                    phase: other.phase(),
                }),
            },
        }
    }
}
