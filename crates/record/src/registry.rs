//! Process-wide table of record type names to factories. Registration is
//! an explicit call at program startup; there is no implicit init order.

use std::collections::BTreeMap;
use std::sync::RwLock;

use lazy_static::lazy_static;

use crate::Record;

type Factory = Box<dyn Fn() -> Record + Send + Sync>;

lazy_static! {
    static ref REGISTRY: RwLock<BTreeMap<String, Factory>> = RwLock::new(BTreeMap::new());
}

/// Register a factory under the record's type name, replacing any earlier
/// registration.
pub fn register<F>(name: &str, factory: F)
where
    F: Fn() -> Record + Send + Sync + 'static,
{
    REGISTRY
        .write()
        .expect("registry lock poisoned")
        .insert(name.to_string(), Box::new(factory));
}

/// Allocate a fresh instance of a registered type.
pub fn create(name: &str) -> Option<Record> {
    REGISTRY
        .read()
        .expect("registry lock poisoned")
        .get(name)
        .map(|f| f())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Kind;

    #[test]
    fn test_register_and_create() {
        register("registry-test-probe", || {
            Record::build("Probe").leaf("n", Kind::Int, &[]).finish()
        });
        let rec = create("registry-test-probe").expect("registered type");
        assert_eq!(rec.type_name(), "Probe");
        assert!(create("registry-test-absent").is_none());
    }
}
