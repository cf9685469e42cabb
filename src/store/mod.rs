//! Dimension store: the ordered list of target dimensions plus the origin.
//!
//! The store owns its dimensions and origin outright. Reads hand out shared
//! borrows or clones; every write goes through a method here, is applied in
//! full, and only then are observers called, synchronously and in
//! subscription order.
//!
//! ## Observer channels
//!
//! | Channel | Fired by | Fires on subscribe |
//! |---|---|---|
//! | changes | every reactive mutation | no |
//! | origin | [`DimensionStore::set_origin`] | yes, if an origin exists |
//! | resize | [`DimensionStore::set_resize_state`] | yes, with the current value |
//! | focus | [`DimensionStore::set_focus_state`] | yes, with the current value |
//!
//! [`DimensionStore::clear_silent`] is the one mutation that bypasses the
//! change channel. It exists for internal resets that must not make
//! dependents recompute.

mod observers;
mod origin;

pub use observers::{SubscriptionId, Subscribers};
pub use origin::{OriginCell, OriginWait};

use crate::types::{ImageDimension, ImageFormat, aspect_ratio};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store was reset while waiting for the origin")]
    OriginWaitCancelled,
}

/// What a reactive mutation did, passed to change subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Added { id: String },
    Removed { id: String },
    Updated { id: String },
    Cleared,
    OriginSet { id: String },
    Reset,
}

/// Everything but the id, which the store assigns.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDimension {
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub image_format: ImageFormat,
    /// Defaults to 80 when absent.
    pub quality: Option<u8>,
}

impl NewDimension {
    pub fn new(filename: impl Into<String>, width: u32, height: u32, image_format: ImageFormat) -> Self {
        Self {
            filename: filename.into(),
            width,
            height,
            image_format,
            quality: None,
        }
    }
}

/// Partial update. `aspect_ratio` only changes when set explicitly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DimensionPatch {
    pub filename: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub aspect_ratio: Option<f64>,
    pub image_format: Option<ImageFormat>,
    pub quality: Option<u8>,
}

impl DimensionPatch {
    fn apply(self, dim: &mut ImageDimension) {
        if let Some(filename) = self.filename {
            dim.filename = filename;
        }
        if let Some(width) = self.width {
            dim.width = width;
        }
        if let Some(height) = self.height {
            dim.height = height;
        }
        if let Some(ratio) = self.aspect_ratio {
            dim.aspect_ratio = ratio;
        }
        if let Some(format) = self.image_format {
            dim.image_format = format;
        }
        if let Some(quality) = self.quality {
            dim.quality = quality;
        }
    }
}

#[derive(Debug, Default)]
pub struct DimensionStore {
    dimensions: Vec<ImageDimension>,
    origin: OriginCell,
    next_id: u64,
    changes: Subscribers<StoreChange>,
    resize_state: Option<ImageDimension>,
    resize_subscribers: Subscribers<Option<ImageDimension>>,
    focus_state: Option<ImageDimension>,
    focus_subscribers: Subscribers<Option<ImageDimension>>,
}

impl DimensionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_id(&mut self, is_origin: bool) -> String {
        self.next_id += 1;
        if is_origin {
            format!("dimension-origin-{}", self.next_id)
        } else {
            format!("dimension-{}", self.next_id)
        }
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.dimensions
            .iter()
            .position(|dim| dim.id.as_deref() == Some(id))
    }

    // ------------------------------------------------------------------
    // Dimensions
    // ------------------------------------------------------------------

    /// Append a dimension and return it with its assigned id.
    pub fn add(&mut self, new: NewDimension) -> ImageDimension {
        let id = self.generate_id(false);
        let dimension = ImageDimension {
            id: Some(id.clone()),
            aspect_ratio: aspect_ratio(new.width, new.height),
            filename: new.filename,
            width: new.width,
            height: new.height,
            image_format: new.image_format,
            quality: new.quality.unwrap_or(crate::types::DEFAULT_QUALITY),
        };
        self.dimensions.push(dimension.clone());
        debug!(id = %id, filename = %dimension.filename, "added dimension");
        self.changes.notify(&StoreChange::Added { id });
        dimension
    }

    pub fn remove(&mut self, id: &str) -> bool {
        match self.index_of(id) {
            Some(index) => self.remove_at(index),
            None => {
                warn!(id, "dimension not found");
                false
            }
        }
    }

    pub fn remove_at(&mut self, index: usize) -> bool {
        if index >= self.dimensions.len() {
            warn!(index, "invalid dimension index");
            return false;
        }
        let removed = self.dimensions.remove(index);
        let id = removed.id.unwrap_or_default();
        debug!(id = %id, index, "removed dimension");
        self.changes.notify(&StoreChange::Removed { id });
        true
    }

    pub fn get(&self, id: &str) -> Option<&ImageDimension> {
        self.index_of(id).map(|index| &self.dimensions[index])
    }

    pub fn get_at(&self, index: usize) -> Option<&ImageDimension> {
        self.dimensions.get(index)
    }

    pub fn get_all(&self) -> &[ImageDimension] {
        &self.dimensions
    }

    pub fn get_first(&self) -> Option<&ImageDimension> {
        self.dimensions.first()
    }

    pub fn get_last(&self) -> Option<&ImageDimension> {
        self.dimensions.last()
    }

    pub fn get_origin_and_all(&self) -> (Option<&ImageDimension>, &[ImageDimension]) {
        (self.origin.get(), &self.dimensions)
    }

    pub fn update(&mut self, id: &str, patch: DimensionPatch) -> bool {
        match self.index_of(id) {
            Some(index) => self.update_at(index, patch),
            None => {
                warn!(id, "dimension not found for update");
                false
            }
        }
    }

    pub fn update_at(&mut self, index: usize, patch: DimensionPatch) -> bool {
        let Some(dim) = self.dimensions.get_mut(index) else {
            warn!(index, "invalid dimension index for update");
            return false;
        };
        patch.apply(dim);
        let id = dim.id.clone().unwrap_or_default();
        debug!(id = %id, index, "updated dimension");
        self.changes.notify(&StoreChange::Updated { id });
        true
    }

    /// Remove every dimension and notify change subscribers.
    pub fn clear(&mut self) {
        self.dimensions.clear();
        debug!("cleared all dimensions");
        self.changes.notify(&StoreChange::Cleared);
    }

    /// Remove every dimension without notifying anyone.
    pub fn clear_silent(&mut self) {
        self.dimensions.clear();
        debug!("cleared dimensions silently");
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageDimension> {
        self.dimensions.iter()
    }

    // ------------------------------------------------------------------
    // Origin
    // ------------------------------------------------------------------

    /// Store a copy of `dimension` as the origin, keeping its id or
    /// assigning an origin id, and return the stored copy.
    ///
    /// Pending [`await_origin`](Self::await_origin) futures resolve, then
    /// origin watchers run, then change subscribers.
    pub fn set_origin(&mut self, dimension: &ImageDimension) -> ImageDimension {
        let mut origin = dimension.clone();
        let id = match origin.id.clone() {
            Some(id) => id,
            None => self.generate_id(true),
        };
        origin.id = Some(id.clone());
        debug!(id = %id, width = origin.width, height = origin.height, "set origin");
        self.origin.set(origin.clone());
        self.changes.notify(&StoreChange::OriginSet { id });
        origin
    }

    pub fn get_origin(&self) -> Option<&ImageDimension> {
        self.origin.get()
    }

    /// Copy the first dimension into the origin. No-op on an empty store.
    pub fn sync_origin_with_first(&mut self) -> Option<ImageDimension> {
        let first = self.dimensions.first()?.clone();
        Some(self.set_origin(&first))
    }

    /// Resolves with the current origin, or with the next one set.
    pub fn await_origin(&mut self) -> OriginWait {
        self.origin.wait()
    }

    /// Call `callback` with the current origin (if any) and on every change.
    pub fn subscribe_to_origin_changes(
        &mut self,
        callback: impl FnMut(&ImageDimension) + Send + 'static,
    ) -> SubscriptionId {
        self.origin.watch(callback)
    }

    pub fn unsubscribe_from_origin_changes(&mut self, id: SubscriptionId) -> bool {
        self.origin.unwatch(id)
    }

    // ------------------------------------------------------------------
    // Change, resize and focus channels
    // ------------------------------------------------------------------

    pub fn subscribe_to_changes(
        &mut self,
        callback: impl FnMut(&StoreChange) + Send + 'static,
    ) -> SubscriptionId {
        self.changes.subscribe(callback)
    }

    pub fn unsubscribe_from_changes(&mut self, id: SubscriptionId) -> bool {
        self.changes.unsubscribe(id)
    }

    pub fn subscribe_to_resize(
        &mut self,
        mut callback: impl FnMut(&Option<ImageDimension>) + Send + 'static,
    ) -> SubscriptionId {
        callback(&self.resize_state);
        self.resize_subscribers.subscribe(callback)
    }

    pub fn unsubscribe_from_resize(&mut self, id: SubscriptionId) -> bool {
        self.resize_subscribers.unsubscribe(id)
    }

    /// Record which dimension is being resized; `None` ends the resize.
    pub fn set_resize_state(&mut self, dimension: Option<ImageDimension>) {
        self.resize_state = dimension;
        self.resize_subscribers.notify(&self.resize_state);
    }

    pub fn resize_state(&self) -> Option<&ImageDimension> {
        self.resize_state.as_ref()
    }

    pub fn subscribe_to_focus(
        &mut self,
        mut callback: impl FnMut(&Option<ImageDimension>) + Send + 'static,
    ) -> SubscriptionId {
        callback(&self.focus_state);
        self.focus_subscribers.subscribe(callback)
    }

    pub fn unsubscribe_from_focus(&mut self, id: SubscriptionId) -> bool {
        self.focus_subscribers.unsubscribe(id)
    }

    /// Record which dimension has focus; `None` clears it.
    pub fn set_focus_state(&mut self, dimension: Option<ImageDimension>) {
        self.focus_state = dimension;
        self.focus_subscribers.notify(&self.focus_state);
    }

    pub fn focus_state(&self) -> Option<&ImageDimension> {
        self.focus_state.as_ref()
    }

    /// Drop all dimensions and the origin. Pending origin waiters resolve
    /// with [`StoreError::OriginWaitCancelled`] and origin watchers are
    /// removed; change subscribers see [`StoreChange::Reset`].
    pub fn reset(&mut self) {
        self.dimensions.clear();
        self.origin.reset();
        debug!("reset dimension store");
        self.changes.notify(&StoreChange::Reset);
    }
}

impl<'a> IntoIterator for &'a DimensionStore {
    type Item = &'a ImageDimension;
    type IntoIter = std::slice::Iter<'a, ImageDimension>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
