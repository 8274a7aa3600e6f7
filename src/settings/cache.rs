use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::settings::error::StoreError;
use crate::settings::settings_model::{SETTINGS_KEYS, Settings};
use crate::settings::store::{SettingsStore, SubscriptionId};

/// Memoized settings read, invalidated by the store's change notifications.
///
/// No TTL: a cached snapshot stays valid until a write (from any component
/// sharing the store) notifies the subscription, and the next `get` fetches
/// fresh values.
pub struct SettingsCache {
    store: Rc<dyn SettingsStore>,
    cached: Rc<RefCell<Option<Rc<Settings>>>>,
    subscription: SubscriptionId,
    fetches: Cell<u64>,
}

impl SettingsCache {
    pub fn new(store: Rc<dyn SettingsStore>) -> Self {
        let cached: Rc<RefCell<Option<Rc<Settings>>>> = Rc::new(RefCell::new(None));
        let slot = Rc::downgrade(&cached);
        let subscription = store.subscribe(Box::new(move |_change| {
            if let Some(slot) = slot.upgrade() {
                slot.borrow_mut().take();
            }
        }));

        SettingsCache {
            store,
            cached,
            subscription,
            fetches: Cell::new(0),
        }
    }

    pub fn get(&self) -> Result<Rc<Settings>, StoreError> {
        if let Some(settings) = self.cached.borrow().as_ref() {
            return Ok(Rc::clone(settings));
        }

        let values = self.store.get(&SETTINGS_KEYS)?;
        let settings = Rc::new(Settings::from_values(&values));
        self.fetches.set(self.fetches.get() + 1);
        *self.cached.borrow_mut() = Some(Rc::clone(&settings));
        Ok(settings)
    }

    pub fn invalidate(&self) {
        self.cached.borrow_mut().take();
    }

    pub fn is_warm(&self) -> bool {
        self.cached.borrow().is_some()
    }

    /// Number of reads that went to the store.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.get()
    }

    pub fn store(&self) -> &Rc<dyn SettingsStore> {
        &self.store
    }
}

impl Drop for SettingsCache {
    fn drop(&mut self) {
        self.store.unsubscribe(self.subscription);
    }
}
