/// Settings applied to a freshly allocated context.
///
/// Unset fields leave the native library's defaults in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContextOptions {
    pub discard_value_names: Option<bool>,
}

impl ContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only global value names in the IR.
    pub fn discard_value_names(mut self, discard: bool) -> Self {
        self.discard_value_names = Some(discard);
        self
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}
