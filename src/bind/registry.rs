//! Process-wide binder factory registry.
//!
//! Maps a record type to the factory that builds its [`RecordBinder`].
//! Registration is insert-once per type: the first factory wins and
//! re-registration is a no-op, so concurrent registration of the same
//! type converges. Reads vastly outnumber writes; a plain `RwLock`
//! around the map keeps the read path contention-free in practice.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::bind::RecordBinder;
use crate::options::ReadOptions;

type FactoryFn<R> = Arc<dyn Fn(&ReadOptions) -> RecordBinder<R> + Send + Sync>;

type FactoryMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

static REGISTRY: OnceLock<RwLock<FactoryMap>> = OnceLock::new();

fn registry() -> &'static RwLock<FactoryMap> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register the binder factory for `R`.
///
/// Returns `true` when the factory was installed, `false` when `R` was
/// already registered (the existing factory is kept).
pub fn register<R, F>(factory: F) -> bool
where
    R: 'static,
    F: Fn(&ReadOptions) -> RecordBinder<R> + Send + Sync + 'static,
{
    let mut map = match registry().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let entry = map.entry(TypeId::of::<R>());
    match entry {
        std::collections::hash_map::Entry::Occupied(_) => false,
        std::collections::hash_map::Entry::Vacant(slot) => {
            let factory: FactoryFn<R> = Arc::new(factory);
            slot.insert(Box::new(factory));
            tracing::debug!(record = std::any::type_name::<R>(), "binder factory registered");
            true
        }
    }
}

/// Build a binder for `R` from its registered factory.
pub fn binder_for<R: 'static>(options: &ReadOptions) -> Option<RecordBinder<R>> {
    let map = match registry().read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let factory = map.get(&TypeId::of::<R>())?.downcast_ref::<FactoryFn<R>>()?;
    Some(factory.as_ref()(options))
}
