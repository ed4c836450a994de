/// A key/value pair yielded by table and tree cursors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Tuple<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> Tuple<K, V> {
    #[must_use]
    pub const fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    /// Split the tuple back into its parts.
    #[must_use]
    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}

impl<K, V> From<(K, V)> for Tuple<K, V> {
    fn from((key, value): (K, V)) -> Self {
        Self { key, value }
    }
}
