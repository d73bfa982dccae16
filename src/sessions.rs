//! Live wizard sessions and the collaborator calls they issue.
//!
//! The registry owns every [`WizardController`] behind one async mutex. The
//! lock is never held across a collaborator call: the controller hands out a
//! token-stamped request, the call runs unlocked, and the result is fed back
//! with its token so late answers are dropped as stale.

use crate::collaborator::ContentService;
use crate::metrics;
use crate::models::{GenerateRequest, ImageRef, ScrapeRequest};
use crate::wizard::{
    ClickOutcome, Delivery, Issued, PropertyDraft, RequestToken, SelectionMode, WizardController,
    WizardError, WizardView,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration, time::Instant};
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("wizard {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Wizard(#[from] WizardError),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    #[serde(flatten)]
    pub wizard: WizardView,
}

/// A view plus the generation task started by the call, if any.
pub struct Dispatched {
    pub view: SessionView,
    pub pending: Option<JoinHandle<()>>,
}

struct WizardEntry {
    controller: WizardController,
    touched: DateTime<Utc>,
}

#[derive(Clone)]
pub struct WizardRegistry {
    entries: Arc<Mutex<HashMap<Uuid, WizardEntry>>>,
    service: Arc<dyn ContentService>,
    ttl: TimeDelta,
}

impl WizardRegistry {
    pub fn new(service: Arc<dyn ContentService>, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            service,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::hours(2)),
        }
    }

    pub fn service_name(&self) -> &'static str {
        self.service.name()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn create(&self) -> SessionView {
        let id = Uuid::new_v4();
        let controller = WizardController::new();
        let wizard = controller.snapshot();
        let mut entries = self.entries.lock().await;
        self.purge_locked(&mut entries, Utc::now());
        entries.insert(
            id,
            WizardEntry {
                controller,
                touched: Utc::now(),
            },
        );
        info!(target = "realtypost.sessions", wizard_id = %id, "wizard created");
        SessionView { id, wizard }
    }

    pub async fn view(&self, id: Uuid) -> Result<SessionView, RegistryError> {
        self.with_wizard(id, |wizard| wizard.snapshot())
            .await
            .map(|wizard| SessionView { id, wizard })
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .lock()
            .await
            .remove(&id)
            .ok_or(RegistryError::NotFound(id))?;
        if let Some(session_id) = entry.controller.state().session_id.clone() {
            self.release_later(session_id);
        }
        info!(target = "realtypost.sessions", wizard_id = %id, "wizard removed");
        Ok(())
    }

    /// Validates the URL, runs the scrape and applies its result. Scrape
    /// failures land in the intake view rather than the returned error.
    ///
    /// The scrape runs on its own task, so it still completes if the caller
    /// goes away mid-request.
    pub async fn submit_listing(
        &self,
        id: Uuid,
        listing_url: &str,
    ) -> Result<SessionView, RegistryError> {
        let (previous, issued) = self
            .with_wizard(id, |wizard| {
                let previous = wizard.state().session_id.clone();
                wizard.submit_listing(listing_url).map(|issued| (previous, issued))
            })
            .await??;
        let Issued::Scrape { token, request } = issued else {
            return self.view(id).await;
        };
        if let Err(err) = self.spawn_scrape(id, token, request, previous).await {
            warn!(
                target = "realtypost.sessions",
                wizard_id = %id,
                error = %err,
                "scrape task failed"
            );
        }
        self.view(id).await
    }

    pub async fn set_mode(
        &self,
        id: Uuid,
        mode: SelectionMode,
    ) -> Result<SessionView, RegistryError> {
        self.with_wizard(id, |wizard| wizard.set_mode(mode)).await??;
        self.view(id).await
    }

    pub async fn click_image(
        &self,
        id: Uuid,
        image: &ImageRef,
    ) -> Result<(ClickOutcome, SessionView), RegistryError> {
        let outcome = self
            .with_wizard(id, |wizard| wizard.click_image(image))
            .await??;
        Ok((outcome, self.view(id).await?))
    }

    pub async fn continue_to_form(&self, id: Uuid) -> Result<SessionView, RegistryError> {
        self.with_wizard(id, |wizard| wizard.continue_to_form())
            .await??;
        self.view(id).await
    }

    /// Validates the form. On success the wizard moves to generation and the
    /// generate call runs in the background.
    pub async fn submit_property(
        &self,
        id: Uuid,
        draft: PropertyDraft,
    ) -> Result<Dispatched, RegistryError> {
        let transition = self
            .with_wizard(id, |wizard| wizard.submit_property(draft))
            .await??;
        let pending = match transition.issued {
            Some(Issued::Generate { token, request }) => {
                Some(self.spawn_generation(id, token, request))
            }
            _ => None,
        };
        Ok(Dispatched {
            view: self.view(id).await?,
            pending,
        })
    }

    pub async fn retry_generation(&self, id: Uuid) -> Result<Dispatched, RegistryError> {
        let issued = self
            .with_wizard(id, |wizard| wizard.retry_generation())
            .await??;
        let pending = match issued {
            Issued::Generate { token, request } => Some(self.spawn_generation(id, token, request)),
            Issued::Scrape { .. } => None,
        };
        Ok(Dispatched {
            view: self.view(id).await?,
            pending,
        })
    }

    pub async fn go_back(&self, id: Uuid) -> Result<SessionView, RegistryError> {
        self.with_wizard(id, |wizard| wizard.go_back()).await?;
        self.view(id).await
    }

    pub async fn reset(&self, id: Uuid) -> Result<SessionView, RegistryError> {
        let released = self.with_wizard(id, |wizard| wizard.reset()).await?;
        if let Some(session_id) = released {
            self.release_later(session_id);
        }
        self.view(id).await
    }

    /// Drops wizards idle for longer than the TTL. Returns how many went.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().await;
        self.purge_locked(&mut entries, now)
    }

    fn purge_locked(&self, entries: &mut HashMap<Uuid, WizardEntry>, now: DateTime<Utc>) -> usize {
        let expired: Vec<Uuid> = entries
            .iter()
            .filter(|(_, entry)| now - entry.touched > self.ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some(entry) = entries.remove(id) {
                if let Some(session_id) = entry.controller.state().session_id.clone() {
                    self.release_later(session_id);
                }
                info!(target = "realtypost.sessions", wizard_id = %id, "wizard expired");
            }
        }
        expired.len()
    }

    async fn with_wizard<T>(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut WizardController) -> T,
    ) -> Result<T, RegistryError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        self.purge_locked(&mut entries, now);
        let entry = entries.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        entry.touched = now;
        Ok(apply(&mut entry.controller))
    }

    /// Runs one scrape and applies it. Afterwards every collaborator session
    /// the wizard no longer references is released: the one it replaced, and
    /// one returned by a response that arrived stale or failed the checks.
    fn spawn_scrape(
        &self,
        id: Uuid,
        token: RequestToken,
        request: ScrapeRequest,
        previous: Option<String>,
    ) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = registry.service.scrape(&request).await;
            metrics::collaborator_elapsed("scrape", started.elapsed().as_millis(), result.is_ok());
            let returned = result
                .as_ref()
                .ok()
                .map(|response| response.session_id.trim().to_string())
                .filter(|session_id| !session_id.is_empty());
            let applied = registry
                .with_wizard(id, |wizard| {
                    let delivery = wizard.complete_scrape(token, result);
                    (delivery, wizard.state().session_id.clone())
                })
                .await;
            let (delivery, current) = match applied {
                Ok((delivery, current)) => {
                    log_delivery("scrape", id, token, delivery);
                    (delivery, current)
                }
                Err(err) => {
                    debug!(
                        target = "realtypost.sessions",
                        wizard_id = %id,
                        error = %err,
                        "scrape finished for a departed wizard"
                    );
                    (Delivery::Stale, None)
                }
            };
            let mut orphans = Vec::new();
            // A stale delivery means reset or removal already released `previous`.
            if delivery == Delivery::Applied
                && let Some(previous) = previous
                && current.as_ref() != Some(&previous)
            {
                orphans.push(previous);
            }
            if let Some(returned) = returned
                && current.as_ref() != Some(&returned)
                && !orphans.contains(&returned)
            {
                orphans.push(returned);
            }
            for session_id in orphans {
                registry.release_later(session_id);
            }
        })
    }

    fn spawn_generation(
        &self,
        id: Uuid,
        token: RequestToken,
        request: GenerateRequest,
    ) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = registry.service.generate(&request).await;
            metrics::collaborator_elapsed(
                "generate",
                started.elapsed().as_millis(),
                result.is_ok(),
            );
            match registry
                .with_wizard(id, |wizard| wizard.complete_generation(token, result))
                .await
            {
                Ok(delivery) => log_delivery("generate", id, token, delivery),
                Err(err) => debug!(
                    target = "realtypost.sessions",
                    wizard_id = %id,
                    error = %err,
                    "generation finished for a departed wizard"
                ),
            }
        })
    }

    fn release_later(&self, session_id: String) {
        let service = self.service.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = service.release(&session_id).await;
            metrics::collaborator_elapsed("release", started.elapsed().as_millis(), result.is_ok());
            if let Err(err) = result {
                warn!(
                    target = "realtypost.sessions",
                    session_id = %session_id,
                    error = %err,
                    "collaborator session release failed"
                );
            }
        });
    }
}

fn log_delivery(call: &'static str, id: Uuid, token: RequestToken, delivery: Delivery) {
    if delivery == Delivery::Stale {
        debug!(
            target = "realtypost.sessions",
            wizard_id = %id,
            call = call,
            token = token.value(),
            "stale collaborator response dropped"
        );
    }
}
