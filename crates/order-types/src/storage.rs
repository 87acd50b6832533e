//! Storage namespaces used by the order service.

/// Namespaces for the different data collections kept in storage.
///
/// Keys are formed as `<namespace>:<id>`, e.g. `orders:42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order records keyed by order id.
	Orders,
	/// Monotonic id sequences keyed by the namespace they allocate for.
	Sequences,
}

impl StorageKey {
	/// Returns the string representation of the namespace.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Sequences => "sequences",
		}
	}
}
