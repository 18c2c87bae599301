//! Generation-stamped caches for derived entity data.

/// Monotonically increasing change counter owned by a source entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub const INITIAL: Self = Self(0);

    /// Advance to the next generation.
    pub fn bump(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// A derived value tagged with the source generation it was computed from.
///
/// The value is only handed out when the caller's current generation matches
/// the stored one; otherwise it is recomputed in place.
#[derive(Clone, Debug, Default)]
pub struct CachedValue<T> {
    slot: Option<(Generation, T)>,
}

impl<T> CachedValue<T> {
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// True when a value computed from `generation` is stored.
    pub fn is_fresh(&self, generation: Generation) -> bool {
        matches!(self.slot, Some((stored, _)) if stored == generation)
    }

    /// Returns the stored value if it matches `generation`.
    pub fn get(&self, generation: Generation) -> Option<&T> {
        match &self.slot {
            Some((stored, value)) if *stored == generation => Some(value),
            _ => None,
        }
    }

    /// Returns the cached value, computing it first when stale.
    pub fn get_or_update(&mut self, generation: Generation, compute: impl FnOnce() -> T) -> &T {
        if !self.is_fresh(generation) {
            self.slot = None;
        }
        let (_, value) = self.slot.get_or_insert_with(|| (generation, compute()));
        value
    }
}
