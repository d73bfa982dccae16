use super::curation::{ClickOutcome, CompleteSelection, ImageCuration, ImageTile, SelectionMode};
use super::generation::{GenerationLifecycle, GenerationState};
use super::intake::{IntakeOutcome, IntakeStatus, IntakeStep, validate_listing_url};
use super::property::{FieldError, PropertyDraft, PropertyRecord};
use super::{Delivery, RequestToken, StepKind, WizardError};
use crate::collaborator::TransportError;
use crate::models::{
    GenerateRequest, GenerateResponse, ImageRef, ScrapeRequest, ScrapeResponse,
};
use serde::Serialize;
use serde_with::skip_serializing_none;
use tracing::{debug, info};

/// Data accumulated across steps. Survives back-navigation, cleared by reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WizardState {
    pub listing_url: String,
    pub session_id: Option<String>,
    pub images: Vec<ImageRef>,
    pub hero: Option<ImageRef>,
    pub details: Vec<ImageRef>,
    pub property: Option<PropertyRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormStep {
    pub session_id: String,
    pub selection: CompleteSelection,
    pub draft: PropertyDraft,
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationStep {
    pub selection: CompleteSelection,
    pub lifecycle: GenerationLifecycle,
}

/// The active step. Later steps carry the upstream data they need, so a
/// form or generation step cannot exist without a complete selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Intake(IntakeStep),
    Curation(ImageCuration),
    Form(FormStep),
    Generation(GenerationStep),
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Intake(_) => StepKind::Intake,
            Step::Curation(_) => StepKind::Curation,
            Step::Form(_) => StepKind::Form,
            Step::Generation(_) => StepKind::Generation,
        }
    }
}

/// Completion payload handed to [`WizardController::advance`].
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Listing {
        session_id: String,
        images: Vec<ImageRef>,
    },
    Selection(CompleteSelection),
    Property(PropertyRecord),
}

impl Advance {
    fn source(&self) -> StepKind {
        match self {
            Advance::Listing { .. } => StepKind::Intake,
            Advance::Selection(_) => StepKind::Curation,
            Advance::Property(_) => StepKind::Form,
        }
    }
}

/// A collaborator call the caller must now perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Issued {
    Scrape {
        token: RequestToken,
        request: ScrapeRequest,
    },
    Generate {
        token: RequestToken,
        request: GenerateRequest,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: StepKind,
    pub to: StepKind,
    pub issued: Option<Issued>,
}

#[derive(Debug, Clone)]
pub struct WizardController {
    step: Step,
    data: WizardState,
    next_token: RequestToken,
}

impl Default for WizardController {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardController {
    pub fn new() -> Self {
        Self {
            step: Step::Intake(IntakeStep::new("")),
            data: WizardState::default(),
            next_token: RequestToken::first(),
        }
    }

    pub fn current_step(&self) -> StepKind {
        self.step.kind()
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn state(&self) -> &WizardState {
        &self.data
    }

    fn issue_token(&mut self) -> RequestToken {
        let token = self.next_token;
        self.next_token = token.next();
        token
    }

    // ----- intake -----

    pub fn submit_listing(&mut self, raw_url: &str) -> Result<Issued, WizardError> {
        let token = self.next_token;
        let current = self.current_step();
        let Step::Intake(intake) = &mut self.step else {
            return Err(wrong_step(current, StepKind::Intake));
        };
        if intake.is_loading() {
            debug!(target = "realtypost.wizard", token = token.value(), "pending scrape superseded");
        }
        let listing_url = match validate_listing_url(raw_url) {
            Ok(url) => url,
            Err(err) => {
                intake.listing_url = raw_url.trim().to_string();
                intake.status = IntakeStatus::Failed {
                    message: err.detail().to_string(),
                };
                return Err(err);
            }
        };
        let request = intake.begin(listing_url.clone(), token);
        self.issue_token();
        self.data.listing_url = listing_url;
        debug!(target = "realtypost.wizard", token = token.value(), "scrape issued");
        Ok(Issued::Scrape { token, request })
    }

    pub fn complete_scrape(
        &mut self,
        token: RequestToken,
        result: Result<ScrapeResponse, TransportError>,
    ) -> Delivery {
        let Step::Intake(intake) = &mut self.step else {
            debug!(target = "realtypost.wizard", token = token.value(), "stale scrape response");
            return Delivery::Stale;
        };
        let outcome = intake.accept(token, result);
        let delivery = outcome.delivery();
        match outcome {
            IntakeOutcome::Ready { session_id, images } => {
                // intake only reports Ready while it is the active step
                if let Err(err) = self.advance(Advance::Listing { session_id, images }) {
                    debug!(target = "realtypost.wizard", error = %err, "listing advance rejected");
                }
            }
            IntakeOutcome::Failed(message) => {
                info!(target = "realtypost.wizard", %message, "scrape failed");
            }
            IntakeOutcome::Stale => {
                debug!(target = "realtypost.wizard", token = token.value(), "stale scrape response");
            }
        }
        delivery
    }

    // ----- curation -----

    fn curation_mut(&mut self) -> Result<&mut ImageCuration, WizardError> {
        let current = self.current_step();
        match &mut self.step {
            Step::Curation(curation) => Ok(curation),
            _ => Err(wrong_step(current, StepKind::Curation)),
        }
    }

    pub fn set_mode(&mut self, mode: SelectionMode) -> Result<(), WizardError> {
        self.curation_mut()?.set_mode(mode);
        Ok(())
    }

    pub fn click_image(&mut self, image: &ImageRef) -> Result<ClickOutcome, WizardError> {
        let curation = self.curation_mut()?;
        let outcome = curation.click_image(image);
        let hero = curation.hero().cloned();
        let details = curation.details().to_vec();
        self.data.hero = hero;
        self.data.details = details;
        Ok(outcome)
    }

    pub fn continue_to_form(&mut self) -> Result<Transition, WizardError> {
        let selection = self.curation_mut()?.complete().ok_or_else(|| {
            WizardError::invalid_transition(
                StepKind::Curation,
                "select 1 hero image and 3 detail images",
            )
        })?;
        self.advance(Advance::Selection(selection))
    }

    // ----- property form -----

    pub fn submit_property(&mut self, draft: PropertyDraft) -> Result<Transition, WizardError> {
        let current = self.current_step();
        let Step::Form(form) = &mut self.step else {
            return Err(wrong_step(current, StepKind::Form));
        };
        let parsed = draft.parse();
        form.draft = draft;
        match parsed {
            Ok(record) => {
                form.errors.clear();
                self.advance(Advance::Property(record))
            }
            Err(errors) => {
                form.errors = errors.clone();
                Err(WizardError::validation(errors))
            }
        }
    }

    // ----- generation -----

    pub fn complete_generation(
        &mut self,
        token: RequestToken,
        result: Result<GenerateResponse, TransportError>,
    ) -> Delivery {
        let Step::Generation(generation) = &mut self.step else {
            debug!(target = "realtypost.wizard", token = token.value(), "stale generate response");
            return Delivery::Stale;
        };
        let delivery = generation.lifecycle.complete(token, result);
        match (delivery, generation.lifecycle.state()) {
            (Delivery::Stale, _) => {
                debug!(target = "realtypost.wizard", token = token.value(), "stale generate response")
            }
            (_, GenerationState::Failed { message }) => {
                info!(target = "realtypost.wizard", %message, "generation failed")
            }
            _ => info!(target = "realtypost.wizard", token = token.value(), "generation succeeded"),
        }
        delivery
    }

    pub fn retry_generation(&mut self) -> Result<Issued, WizardError> {
        let token = self.next_token;
        let current = self.current_step();
        let Step::Generation(generation) = &mut self.step else {
            return Err(wrong_step(current, StepKind::Generation));
        };
        let request = generation.lifecycle.retry(token)?;
        let attempt = generation.lifecycle.attempts();
        self.issue_token();
        info!(
            target = "realtypost.wizard",
            token = token.value(),
            attempt,
            "generation retried"
        );
        Ok(Issued::Generate { token, request })
    }

    // ----- navigation -----

    /// Moves forward one step. Only the payload matching the active step is
    /// accepted; there is no way to skip ahead.
    pub fn advance(&mut self, payload: Advance) -> Result<Transition, WizardError> {
        let from = self.current_step();
        if payload.source() != from {
            return Err(WizardError::invalid_transition(
                from,
                format!("cannot complete the {} step from here", payload.source()),
            ));
        }
        let issued = match payload {
            Advance::Listing { session_id, images } => {
                if session_id.trim().is_empty() || images.is_empty() {
                    return Err(WizardError::invalid_transition(
                        from,
                        "listing requires a session and at least one image",
                    ));
                }
                let curation = ImageCuration::restore(
                    images.clone(),
                    self.data.hero.take(),
                    &std::mem::take(&mut self.data.details),
                );
                self.data.hero = curation.hero().cloned();
                self.data.details = curation.details().to_vec();
                self.data.session_id = Some(session_id);
                self.data.images = images;
                self.step = Step::Curation(curation);
                None
            }
            Advance::Selection(selection) => {
                let in_pool = std::iter::once(&selection.hero)
                    .chain(selection.details.iter())
                    .all(|image| self.data.images.contains(image));
                let Some(session_id) = self.data.session_id.clone().filter(|_| in_pool) else {
                    return Err(WizardError::invalid_transition(
                        from,
                        "selection does not belong to the scraped listing",
                    ));
                };
                self.data.hero = Some(selection.hero.clone());
                self.data.details = selection.details.to_vec();
                let draft = self
                    .data
                    .property
                    .as_ref()
                    .map(PropertyDraft::from)
                    .unwrap_or_default();
                self.step = Step::Form(FormStep {
                    session_id,
                    selection,
                    draft,
                    errors: Vec::new(),
                });
                None
            }
            Advance::Property(record) => {
                let Step::Form(form) = &self.step else {
                    return Err(wrong_step(from, StepKind::Form));
                };
                let request = GenerateRequest {
                    session_id: form.session_id.clone(),
                    hero_image_url: form.selection.hero.clone(),
                    detail_images: form.selection.details.to_vec(),
                    property_info: record.clone(),
                };
                let selection = form.selection.clone();
                let token = self.issue_token();
                self.data.property = Some(record);
                self.step = Step::Generation(GenerationStep {
                    selection,
                    lifecycle: GenerationLifecycle::start(request.clone(), token),
                });
                Some(Issued::Generate { token, request })
            }
        };
        let to = self.current_step();
        info!(target = "realtypost.wizard", %from, %to, "step advanced");
        Ok(Transition { from, to, issued })
    }

    /// Steps back once without discarding collected data. A pending request
    /// from the step being left becomes stale.
    pub fn go_back(&mut self) -> Transition {
        let from = self.current_step();
        let previous = match &self.step {
            Step::Intake(_) => None,
            Step::Curation(_) => Some(Step::Intake(IntakeStep::new(self.data.listing_url.clone()))),
            Step::Form(_) => Some(Step::Curation(ImageCuration::restore(
                self.data.images.clone(),
                self.data.hero.clone(),
                &self.data.details,
            ))),
            Step::Generation(generation) => Some(Step::Form(FormStep {
                session_id: generation.lifecycle.request().session_id.clone(),
                selection: generation.selection.clone(),
                draft: self
                    .data
                    .property
                    .as_ref()
                    .map(PropertyDraft::from)
                    .unwrap_or_default(),
                errors: Vec::new(),
            })),
        };
        if let Some(step) = previous {
            self.step = step;
        }
        let to = self.current_step();
        debug!(target = "realtypost.wizard", %from, %to, "step back");
        Transition {
            from,
            to,
            issued: None,
        }
    }

    /// Returns to intake and clears everything collected. Hands back the
    /// collaborator session that was abandoned, if any.
    pub fn reset(&mut self) -> Option<String> {
        let released = self.data.session_id.take();
        self.data = WizardState::default();
        self.step = Step::Intake(IntakeStep::new(""));
        info!(target = "realtypost.wizard", "wizard reset");
        released
    }

    pub fn snapshot(&self) -> WizardView {
        let current = self.current_step();
        let progress = StepKind::ALL
            .iter()
            .map(|kind| ProgressEntry {
                number: kind.number(),
                label: kind.label(),
                reached: kind.number() <= current.number(),
                completed: kind.number() < current.number(),
            })
            .collect();
        let step = match &self.step {
            Step::Intake(intake) => StepView::Intake {
                listing_url: intake.listing_url.clone(),
                status: intake.status.clone(),
            },
            Step::Curation(curation) => StepView::Curation {
                mode: curation.mode(),
                tiles: curation.tiles(),
                detail_count: curation.details().len(),
                can_proceed: curation.can_proceed(),
            },
            Step::Form(form) => StepView::Form {
                draft: form.draft.clone(),
                errors: form.errors.clone(),
            },
            Step::Generation(generation) => StepView::Generation {
                status: generation.lifecycle.state().clone(),
                attempts: generation.lifecycle.attempts(),
                share_text: generation.lifecycle.artifact().map(|a| a.share_text()),
            },
        };
        WizardView {
            current_step: current.number(),
            step_label: current.label(),
            can_go_back: current.previous().is_some(),
            progress,
            session_id: self.data.session_id.clone(),
            images: self.data.images.clone(),
            hero: self.data.hero.clone(),
            details: self.data.details.clone(),
            property: self.data.property.clone(),
            step,
        }
    }
}

fn wrong_step(current: StepKind, expected: StepKind) -> WizardError {
    WizardError::invalid_transition(current, format!("requires the {expected} step to be active"))
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEntry {
    pub number: u8,
    pub label: &'static str,
    pub reached: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepView {
    Intake {
        listing_url: String,
        status: IntakeStatus,
    },
    Curation {
        mode: SelectionMode,
        tiles: Vec<ImageTile>,
        detail_count: usize,
        can_proceed: bool,
    },
    Form {
        draft: PropertyDraft,
        errors: Vec<FieldError>,
    },
    Generation {
        status: GenerationState,
        attempts: u32,
        share_text: Option<String>,
    },
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub current_step: u8,
    pub step_label: &'static str,
    pub can_go_back: bool,
    pub progress: Vec<ProgressEntry>,
    pub session_id: Option<String>,
    pub images: Vec<ImageRef>,
    pub hero: Option<ImageRef>,
    pub details: Vec<ImageRef>,
    pub property: Option<PropertyRecord>,
    pub step: StepView,
}
