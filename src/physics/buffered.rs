/// Which of a body's two buffered states to look at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timeframe {
    /// The last committed state, i.e. the state before the ongoing step's collisions.
    Pre,
    /// The tentative next state that hasn't been committed yet.
    Post,
}

/// A value with a committed (active) and a tentative (background) version.
///
/// Changes made through [`background_mut`][Self::background_mut] are invisible
/// through [`active`][Self::active] until [`commit`][Self::commit] is called.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Buffered<T> {
    active: T,
    background: T,
}

impl<T: Clone> Buffered<T> {
    pub fn new(value: T) -> Self {
        Buffered {
            active: value.clone(),
            background: value,
        }
    }

    #[inline]
    pub fn active(&self) -> &T {
        &self.active
    }

    #[inline]
    pub fn background(&self) -> &T {
        &self.background
    }

    #[inline]
    pub fn background_mut(&mut self) -> &mut T {
        &mut self.background
    }

    #[inline]
    pub fn get(&self, tf: Timeframe) -> &T {
        match tf {
            Timeframe::Pre => &self.active,
            Timeframe::Post => &self.background,
        }
    }

    /// Overwrite both versions, e.g. when teleporting a body.
    pub fn set_both(&mut self, value: T) {
        self.active = value.clone();
        self.background = value;
    }

    /// Promote the background value to active.
    pub fn commit(&mut self) {
        self.active = self.background.clone();
    }

    /// Throw away the background value, replacing it with the active one.
    pub fn revert(&mut self) {
        self.background = self.active.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_invisible_until_commit() {
        let mut b = Buffered::new(1);
        *b.background_mut() = 2;
        assert_eq!(*b.active(), 1);
        assert_eq!(*b.get(Timeframe::Post), 2);
        b.commit();
        assert_eq!(*b.active(), 2);

        *b.background_mut() = 5;
        b.revert();
        assert_eq!(*b.background(), 2);
    }
}
