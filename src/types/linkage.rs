//! Linkage classification (§4.9), computed definitively by C9 but exposed on every emitted
//! symbol in the output contract (§6).

/// How a symbol is visible/deduplicated across compilation units.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Linkage {
  /// Not marked `public`; visible only within its own unit.
  Private,
  /// Visible to other units with external linkage.
  Public,
  /// A monomorphized generic instance; duplicates across units are deduplicated by the linker.
  WeakOdr,
  /// A runtime-support helper the backend may emit per unit.
  WeakOdrInline,
}

impl Linkage {
  #[must_use] pub fn is_weak(self) -> bool { matches!(self, Linkage::WeakOdr | Linkage::WeakOdrInline) }
}
