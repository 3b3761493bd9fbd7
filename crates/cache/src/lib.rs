// Caching for the record meta-model: a generic LRU over shared values,
// the object cache keyed by canonical record identifiers, and the
// named-object pool with weak handles and destroyed signaling.
//
// Everything here is single-threaded by contract, like the rest of the
// workspace: shared handles are `Rc`, not `Arc`.

mod lru;
mod objcache;
mod pool;

pub use lru::LruCache;
pub use objcache::ObjCache;
pub use pool::{Named, NamedObjPool, NamedRef, PoolError};
