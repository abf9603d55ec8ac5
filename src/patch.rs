//! Overrides a boolean property in the game's in-memory copy of a tuning exemplar.

use crate::host::{variant_type, Host, PropertyHolder, PropertyLookup, ResourceKey, ResourceManager, Variant};

/// A boolean exemplar property and the value it should be forced to.
#[derive(Clone, Copy, Debug)]
pub struct PropertyPatch {
    pub key: ResourceKey,
    pub property_id: u32,
    pub name: &'static str,
    pub value: bool,
}

/// Stops the tract developer from kicking lower wealth occupants out of buildings when it
/// redevelops them. The property lives in the building development simulator tuning exemplar.
pub const KICK_OUT_LOWER_WEALTH: PropertyPatch = PropertyPatch {
    key: ResourceKey::new(0x6534284A, 0xE7E2C2DB, 0xE8DA7677),
    property_id: 0x47E2C540,
    name: "Tract Developer Kick Out Lower Wealth",
    value: false,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchError {
    NoResourceManager,
    ExemplarNotLoaded,
    PropertyMissing(&'static str),
    NullValue(&'static str),
    UnexpectedType(&'static str, u16),
}

impl std::fmt::Display for PatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchError::NoResourceManager => f.write_str("The resource manager pointer was null."),
            PatchError::ExemplarNotLoaded => f.write_str(
                "Failed to load the building development simulator tuning exemplar.",
            ),
            PatchError::PropertyMissing(name) => {
                write!(f, "The '{}' property does not exist.", name)
            }
            PatchError::NullValue(name) => write!(f, "The '{}' property data was null.", name),
            PatchError::UnexpectedType(name, found) => write!(
                f,
                "The '{}' property data has an unexpected type, type={:#06x}. Expected type={:#06x}.",
                name,
                found,
                variant_type::BOOL
            ),
        }
    }
}

impl std::error::Error for PatchError {}

/// What a second look at a patched property found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    /// The property still holds the value we wrote.
    Intact,

    /// Something replaced the value after we patched it.
    Reset,
}

impl PropertyPatch {
    /// Finds the property's boolean value and hands it to `f`.
    fn with_value<H, R>(&self, host: &H, f: impl FnOnce(&mut dyn Variant) -> R) -> Result<R, PatchError>
    where
        H: Host,
    {
        let resources = host
            .resource_manager()
            .ok_or(PatchError::NoResourceManager)?;

        let mut holder = resources
            .property_holder(&self.key)
            .ok_or(PatchError::ExemplarNotLoaded)?;

        let mut value = match holder.property_value(self.property_id) {
            PropertyLookup::Missing => return Err(PatchError::PropertyMissing(self.name)),
            PropertyLookup::NullValue => return Err(PatchError::NullValue(self.name)),
            PropertyLookup::Value(value) => value,
        };

        let type_tag = value.type_tag();

        if type_tag != variant_type::BOOL {
            return Err(PatchError::UnexpectedType(self.name, type_tag));
        }

        Ok(f(&mut value))
    }

    /// Writes the patch value into the cached exemplar.
    pub fn apply<H: Host>(&self, host: &H) -> Result<(), PatchError> {
        self.with_value(host, |variant| variant.set_bool_value(self.value))
    }

    /// Re-reads the property to check that nothing has overwritten the patch.
    pub fn verify<H: Host>(&self, host: &H) -> Result<Verification, PatchError> {
        self.with_value(host, |variant| {
            if variant.bool_value() == self.value {
                Verification::Intact
            } else {
                Verification::Reset
            }
        })
    }
}
