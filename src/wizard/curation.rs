//! Hero/detail image selection.
//!
//! One shared mode decides what a click means. Hero and detail roles never
//! overlap, the detail set is capped at three, and clicking past the cap is a
//! silent no-op. Progression is gated by [`ImageCuration::can_proceed`].

use crate::models::ImageRef;
use serde::{Deserialize, Serialize};

pub const DETAIL_SLOTS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    Hero,
    Details,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
    HeroSet,
    HeroUnchanged,
    DetailAdded { position: usize },
    DetailRemoved,
    CapReached,
    NotInPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TileRole {
    Hero,
    Detail { position: usize },
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageTile {
    pub image: ImageRef,
    pub role: TileRole,
    pub disabled: bool,
}

/// A selection that satisfied the cardinality gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompleteSelection {
    pub hero: ImageRef,
    pub details: [ImageRef; DETAIL_SLOTS],
}

impl CompleteSelection {
    pub fn new(hero: ImageRef, details: Vec<ImageRef>) -> Option<Self> {
        let details: [ImageRef; DETAIL_SLOTS] = details.try_into().ok()?;
        let distinct = details
            .iter()
            .enumerate()
            .all(|(i, d)| *d != hero && !details[..i].contains(d));
        distinct.then_some(Self { hero, details })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCuration {
    images: Vec<ImageRef>,
    mode: SelectionMode,
    hero: Option<ImageRef>,
    details: Vec<ImageRef>,
}

impl ImageCuration {
    pub fn new(images: Vec<ImageRef>) -> Self {
        Self {
            images,
            mode: SelectionMode::Hero,
            hero: None,
            details: Vec::with_capacity(DETAIL_SLOTS),
        }
    }

    /// Rebuilds curation after back-navigation, dropping anything that is no
    /// longer part of the pool.
    pub fn restore(images: Vec<ImageRef>, hero: Option<ImageRef>, details: &[ImageRef]) -> Self {
        let mut curation = Self::new(images);
        curation.hero = hero.filter(|h| curation.images.contains(h));
        for detail in details {
            if curation.details.len() < DETAIL_SLOTS
                && curation.images.contains(detail)
                && curation.hero.as_ref() != Some(detail)
                && !curation.details.contains(detail)
            {
                curation.details.push(detail.clone());
            }
        }
        curation
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn hero(&self) -> Option<&ImageRef> {
        self.hero.as_ref()
    }

    pub fn details(&self) -> &[ImageRef] {
        &self.details
    }

    pub fn set_mode(&mut self, mode: SelectionMode) {
        self.mode = mode;
    }

    pub fn click_image(&mut self, image: &ImageRef) -> ClickOutcome {
        if !self.images.contains(image) {
            return ClickOutcome::NotInPool;
        }
        match self.mode {
            SelectionMode::Hero => self.assign_hero(image),
            SelectionMode::Details => self.toggle_detail(image),
        }
    }

    fn assign_hero(&mut self, image: &ImageRef) -> ClickOutcome {
        if self.hero.as_ref() == Some(image) {
            return ClickOutcome::HeroUnchanged;
        }
        self.details.retain(|d| d != image);
        self.hero = Some(image.clone());
        ClickOutcome::HeroSet
    }

    fn toggle_detail(&mut self, image: &ImageRef) -> ClickOutcome {
        if let Some(idx) = self.details.iter().position(|d| d == image) {
            self.details.remove(idx);
            return ClickOutcome::DetailRemoved;
        }
        if self.details.len() >= DETAIL_SLOTS {
            return ClickOutcome::CapReached;
        }
        if self.hero.as_ref() == Some(image) {
            self.hero = None;
        }
        self.details.push(image.clone());
        ClickOutcome::DetailAdded {
            position: self.details.len(),
        }
    }

    /// 1-based insertion position of a detail image. Display only.
    pub fn detail_position(&self, image: &ImageRef) -> Option<usize> {
        self.details.iter().position(|d| d == image).map(|i| i + 1)
    }

    pub fn is_disabled(&self, image: &ImageRef) -> bool {
        self.mode == SelectionMode::Details
            && self.details.len() >= DETAIL_SLOTS
            && !self.details.contains(image)
    }

    pub fn can_proceed(&self) -> bool {
        self.hero.is_some() && self.details.len() == DETAIL_SLOTS
    }

    pub fn complete(&self) -> Option<CompleteSelection> {
        if !self.can_proceed() {
            return None;
        }
        CompleteSelection::new(self.hero.clone()?, self.details.clone())
    }

    pub fn tiles(&self) -> Vec<ImageTile> {
        self.images
            .iter()
            .map(|image| {
                let role = if self.hero.as_ref() == Some(image) {
                    TileRole::Hero
                } else if let Some(position) = self.detail_position(image) {
                    TileRole::Detail { position }
                } else {
                    TileRole::None
                };
                ImageTile {
                    image: image.clone(),
                    role,
                    disabled: self.is_disabled(image),
                }
            })
            .collect()
    }
}
