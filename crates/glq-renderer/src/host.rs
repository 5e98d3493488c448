use std::sync::{Arc, Weak};

use dashmap::DashMap;
use glq_core::ResourceHandleTable;
use glq_protocol::handle::{NativeHandle, VirtualHandle};
use tracing::debug;

/// Something on the host side (a compositor layer, a video frame) whose
/// current texture can be sampled by queued commands.
pub trait HostTextureProvider: Send + Sync {
    /// The native texture currently backing this provider, or null if it has
    /// none yet.
    fn current_texture(&self) -> NativeHandle;
}

/// A deferred "bind host surface as a texture source" request.
pub struct HostTextureRequest {
    pub handle: VirtualHandle,
    pub provider: Weak<dyn HostTextureProvider>,
}

impl HostTextureRequest {
    pub fn new(handle: VirtualHandle, provider: &Arc<dyn HostTextureProvider>) -> Self {
        Self {
            handle,
            provider: Arc::downgrade(provider),
        }
    }
}

/// Execution-plane cache of host texture providers, refreshed every render
/// cycle.
#[derive(Default)]
pub struct HostTextureCache {
    providers: DashMap<VirtualHandle, Weak<dyn HostTextureProvider>>,
}

impl HostTextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&self, requests: Vec<HostTextureRequest>) {
        for request in requests {
            self.providers.insert(request.handle, request.provider);
        }
    }

    /// Query every provider. Dead providers are evicted and their handles
    /// released; returns the handles whose native texture changed.
    pub fn refresh(&self, table: &ResourceHandleTable) -> Vec<(VirtualHandle, NativeHandle)> {
        let mut changed = Vec::new();
        let mut dead = Vec::new();

        for entry in self.providers.iter() {
            let handle = *entry.key();
            match entry.value().upgrade() {
                Some(provider) => {
                    let texture = provider.current_texture();
                    if !texture.is_null() && texture != table.resolve(handle) {
                        changed.push((handle, texture));
                    }
                }
                None => dead.push(handle),
            }
        }

        for handle in dead {
            debug!("evicting dead host texture provider {:?}", handle);
            self.providers.remove(&handle);
            table.release(handle);
        }

        changed.sort_by_key(|(handle, _)| *handle);
        changed
    }

    pub fn remove(&self, handle: VirtualHandle) {
        self.providers.remove(&handle);
    }

    pub fn clear(&self) {
        self.providers.clear();
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
