use lode_reflect::MetaFieldPath;

use crate::FieldTarget;

/// Published after every successful path-addressed field assignment.
#[derive(Clone, Debug)]
pub struct FieldChangedEvent {
    /// The edited component or asset.
    pub target: FieldTarget,
    /// Path of the edited field.
    pub path: MetaFieldPath,
    /// `true` when the change came from an undo.
    pub is_undo: bool,
}
