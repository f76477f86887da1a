//! Process-wide mapping from well-known string names to GPU resources or
//! opaque constant-data views, consulted by passes during `compile`.

use std::any::Any;
use std::collections::HashMap;

use crate::error::RenderGraphError;

/// `collect_constants`/`require_constants` publish a raw pointer and element
/// count rather than cloning: the caller guarantees the backing storage
/// outlives the `ResourceCache` (and so the render graph it belongs to).
struct ConstantsView {
    ptr: *const (),
    len: usize,
}

// SAFETY: the caller of `collect_constants` is required to guarantee the
// pointed-to data outlives the cache; we never dereference it except through
// `require_constants<T>`, which the caller must call with the same `T`.
unsafe impl Send for ConstantsView {}
unsafe impl Sync for ConstantsView {}

#[derive(Default)]
pub struct ResourceCache {
    resources: HashMap<String, Box<dyn Any + Send + Sync>>,
    constants: HashMap<String, ConstantsView>,
    frame_index: u64,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub(crate) fn advance_frame(&mut self) {
        self.frame_index += 1;
    }

    /// Publish a GPU resource (or any pass-owned handle) under `name`,
    /// overwriting whatever was previously collected there.
    pub fn collect<T: Any + Send + Sync>(&mut self, name: impl Into<String>, resource: T) {
        self.resources.insert(name.into(), Box::new(resource));
    }

    pub fn require<T: Any + Send + Sync>(&self, name: &str) -> Result<&T, RenderGraphError> {
        self.resources
            .get(name)
            .ok_or_else(|| RenderGraphError::MissingResource(name.to_string()))?
            .downcast_ref::<T>()
            .ok_or_else(|| RenderGraphError::MissingResource(name.to_string()))
    }

    /// # Safety
    /// `data` must remain valid and unmoved for as long as this cache is
    /// alive; the cache stores a pointer, never a copy.
    pub unsafe fn collect_constants<T>(&mut self, name: impl Into<String>, data: &[T]) {
        self.constants.insert(name.into(), ConstantsView { ptr: data.as_ptr().cast(), len: data.len() });
    }

    /// # Safety
    /// The caller must request the same element type `T` that was published
    /// for `name`, and the original backing storage must still be alive.
    pub unsafe fn require_constants<T>(&self, name: &str) -> Result<&[T], RenderGraphError> {
        let view = self.constants.get(name).ok_or_else(|| RenderGraphError::MissingResource(name.to_string()))?;
        Ok(std::slice::from_raw_parts(view.ptr.cast::<T>(), view.len))
    }
}
