//! # Key-tuple identity mixin.
//!
//! [`Keyed`] gives a work item an identity made of a tuple of keys. Two keyed
//! items with equal keys (and the same wrapped type) are the same work: the
//! second registration merges into the first instead of running twice.
//!
//! The hash of a key tuple is a right fold over the per-field hashes:
//!
//! ```text
//! hash(k0, k1, .., kn) = h(k0) + 47 * hash(k1, .., kn)
//! hash(kn)             = h(kn)
//! ```
//!
//! Arithmetic wraps. Field hashes use a fixed-key hasher, so the result is
//! stable within a process.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::ops::Deref;

use super::work::{Work, WorkContext};

const KEY_HASH_MULTIPLIER: u64 = 47;

/// Hash of a single key field.
pub fn field_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Folds per-field hashes into a key-tuple hash.
///
/// Returns `0` for an empty sequence.
///
/// # Example
/// ```
/// use tickvisor::fold_key_hash;
///
/// assert_eq!(fold_key_hash([3]), 3);
/// assert_eq!(fold_key_hash([1, 2]), 1 + 47 * 2);
/// assert_eq!(fold_key_hash([1, 2, 3]), 1 + 47 * (2 + 47 * 3));
/// ```
pub fn fold_key_hash<I>(field_hashes: I) -> u64
where
    I: IntoIterator<Item = u64>,
    I::IntoIter: DoubleEndedIterator,
{
    let mut rev = field_hashes.into_iter().rev();
    let Some(last) = rev.next() else {
        return 0;
    };
    rev.fold(last, |acc, h| {
        h.wrapping_add(KEY_HASH_MULTIPLIER.wrapping_mul(acc))
    })
}

/// Tuple of identifying keys.
///
/// Implemented for tuples of arity 1 to 6 whose fields are hashable and
/// comparable.
pub trait KeyTuple: Eq + Send + Sync + 'static {
    /// Folded hash of all fields.
    fn key_hash(&self) -> u64;
}

macro_rules! impl_key_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name),+> KeyTuple for ($($name,)+)
        where
            $($name: Hash + Eq + Send + Sync + 'static),+
        {
            fn key_hash(&self) -> u64 {
                fold_key_hash([$(field_hash(&self.$idx)),+])
            }
        }
    };
}

impl_key_tuple!(A: 0);
impl_key_tuple!(A: 0, B: 1);
impl_key_tuple!(A: 0, B: 1, C: 2);
impl_key_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_key_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_key_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

/// Work whose identity comes from a key tuple `K`.
///
/// The keys are passed to every unit so the implementor does not need to
/// store them twice.
pub trait KeyedWork<K>: Send + Sync + 'static {
    /// Performs one unit of work for `keys`.
    fn run(&self, keys: &K, ctx: &WorkContext<'_>);

    /// Folds a duplicate registration with equal keys into `self`.
    fn merge(&self, _other: Self)
    where
        Self: Sized,
    {
    }
}

/// Wraps a [`KeyedWork`] together with its keys.
///
/// # Example
/// ```
/// use tickvisor::{Keyed, KeyedWork, Work, WorkContext};
///
/// struct Ping;
///
/// impl KeyedWork<(String, u16)> for Ping {
///     fn run(&self, (host, port): &(String, u16), _ctx: &WorkContext<'_>) {
///         let _ = (host, port);
///     }
/// }
///
/// let a = Keyed::new(("example.org".to_string(), 80), Ping);
/// let b = Keyed::new(("example.org".to_string(), 80), Ping);
/// assert_eq!(a.key_hash(), b.key_hash());
/// assert!(a.same_work(&b));
/// ```
pub struct Keyed<K, W> {
    keys: K,
    hash: u64,
    work: W,
}

impl<K: KeyTuple, W> Keyed<K, W> {
    /// Creates a keyed item; the key hash is computed once here.
    pub fn new(keys: K, work: W) -> Self {
        let hash = keys.key_hash();
        Self { keys, hash, work }
    }

    /// The identifying keys.
    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// The wrapped work.
    pub fn inner(&self) -> &W {
        &self.work
    }
}

impl<K, W> Deref for Keyed<K, W> {
    type Target = W;

    fn deref(&self) -> &W {
        &self.work
    }
}

impl<K: KeyTuple, W: KeyedWork<K>> Work for Keyed<K, W> {
    fn run(&self, ctx: &WorkContext<'_>) {
        self.work.run(&self.keys, ctx);
    }

    fn name(&self) -> &str {
        std::any::type_name::<W>()
    }

    fn key_hash(&self) -> Option<u64> {
        Some(self.hash)
    }

    fn same_work(&self, other: &Self) -> bool {
        self.keys == other.keys
    }

    fn merge(&self, other: Self) {
        self.work.merge(other.work);
    }
}

impl<K: std::fmt::Debug, W> std::fmt::Debug for Keyed<K, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyed")
            .field("keys", &self.keys)
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}
