pub mod extendible_hash_table;
pub mod hash_function;
pub mod key_comparator;

pub use extendible_hash_table::ExtendibleHashTable;
pub use hash_function::{Fnv1aHash, HashFunction, IdentityHash};
pub use key_comparator::{BytewiseComparator, IntegerComparator, KeyComparator};
