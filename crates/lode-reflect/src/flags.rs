bitflags::bitflags! {
    /// Trait flags attached to reflected types and their data fields.
    ///
    /// The serialization flags compose: `NO_SERIALIZE` excludes a field from
    /// every purpose, the purpose-specific flags only from their own.
    pub struct MetaFlags: u16 {
        /// Default, no traits.
        const NONE = 0;
        /// GUI must render the field as non-editable.
        const READONLY_INSPECTION = 1 << 0;
        /// GUI must not render the field at all.
        const NO_INSPECTION = 1 << 1;
        /// Excluded from all serialization purposes.
        const NO_SERIALIZE = 1 << 2;
        /// Excluded from the file purpose.
        const NO_SERIALIZE_FILE = 1 << 3;
        /// Excluded from the undo purpose.
        const NO_SERIALIZE_UNDO = 1 << 4;
        /// Excluded from the display purpose.
        const NO_SERIALIZE_DISPLAY = 1 << 5;
    }
}

impl Default for MetaFlags {
    fn default() -> Self {
        Self::NONE
    }
}
