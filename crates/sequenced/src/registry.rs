use crate::{Entity, Error, ResolvedSpec, Result, SequenceSpec};
use core::any::{Any, TypeId};
use std::collections::HashMap;

type Specs<R> = Vec<ResolvedSpec<R>>;

/// Collects sequence specs per entity type during process initialization.
///
/// ```rust
/// use sequenced::{define_entity, RegistryBuilder, RowId, SequenceSpec};
///
/// #[derive(Default)]
/// struct Doppelganger {
///     id: Option<RowId>,
///     sequential_id_one: Option<i64>,
///     sequential_id_two: Option<i64>,
/// }
///
/// define_entity! {
///     Doppelganger {
///         table: "doppelgangers",
///         id: id,
///         attributes: [],
///         sequences: [sequential_id_one, sequential_id_two],
///     }
/// }
///
/// let mut builder = RegistryBuilder::new();
/// builder
///     .register(SequenceSpec::<Doppelganger>::new().column("sequential_id_one"))?
///     .register(SequenceSpec::<Doppelganger>::new().column("sequential_id_two").start_at(1000))?;
///
/// // The same column cannot be sequenced twice.
/// assert!(builder
///     .register(SequenceSpec::<Doppelganger>::new().column("sequential_id_one"))
///     .is_err());
///
/// let registry = builder.build();
/// assert_eq!(registry.specs::<Doppelganger>().len(), 2);
/// # Ok::<(), sequenced::Error>(())
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    specs: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `spec` to `R` and appends it to `R`'s ordered spec list.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the spec names an undefined column or
    /// attribute, or if `R` already has a spec for the same column. The
    /// builder is unchanged on error.
    pub fn register<R: Entity>(&mut self, spec: SequenceSpec<R>) -> Result<&mut Self> {
        let resolved = spec.resolve_for()?;
        let specs = self
            .specs
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Box::new(Specs::<R>::new()))
            .downcast_mut::<Specs<R>>()
            .ok_or_else(|| Error::configuration(R::TYPE_NAME, "registry entry has a foreign type"))?;

        if specs
            .iter()
            .any(|existing| existing.column_name() == resolved.column_name())
        {
            return Err(Error::configuration(
                R::TYPE_NAME,
                format!("column `{}` is already sequenced", resolved.column_name()),
            ));
        }

        specs.push(resolved);
        Ok(self)
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> Registry {
        Registry { specs: self.specs }
    }
}

/// Read-only mapping from entity type to its ordered sequence specs.
///
/// Built once by [`RegistryBuilder`]; shareable across threads.
pub struct Registry {
    specs: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// `R`'s specs in registration order; empty if `R` has none.
    #[must_use]
    pub fn specs<R: Entity>(&self) -> &[ResolvedSpec<R>] {
        self.specs
            .get(&TypeId::of::<R>())
            .and_then(|specs| specs.downcast_ref::<Specs<R>>())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
