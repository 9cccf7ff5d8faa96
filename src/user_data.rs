use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Per-session slot for application state, keyed by type rather than by a
/// fixed field on `ClientSession`. At most one value of a given type lives
/// here at a time; a handler that wants per-connection counters, names, or
/// whatever else, reaches for its own small struct and gets it created on
/// first touch.
///
/// This is the type-keyed-map resolution of the "typed user data" design
/// question: the alternative (a generic session type fixed at server
/// construction) would force every route to agree on one state type, which
/// doesn't fit a server whose routes are registered independently of each
/// other.
#[derive(Default)]
pub struct UserData {
    slots: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl UserData {
    pub fn get_or_create<T: Default + Send + 'static>(&mut self) -> &mut T {
        self.slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("type id collision in UserData")
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.slots.get(&TypeId::of::<T>()).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn clear<T: 'static>(&mut self) {
        self.slots.remove(&TypeId::of::<T>());
    }
}
