//! Specialized collection types

pub use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Stable handle for a scene object
    ///
    /// Keys stay valid while the object lives and are never reused for a
    /// different object, so side tables keyed by them cannot alias.
    pub struct ObjectKey;
}

/// Handle-based arena of scene objects
pub type ObjectMap<T> = SlotMap<ObjectKey, T>;
