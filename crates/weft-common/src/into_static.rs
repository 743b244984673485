use std::collections::BTreeMap;

use smol_str::SmolStr;

/// Converts a borrowed value into one that owns all of its data.
///
/// Parsed identifiers borrow from the buffer they were parsed from. When the
/// identifier has to outlive that buffer, call `into_static()` to copy the
/// string into owned storage.
pub trait IntoStatic: Sized {
    /// The owned version of the type
    type Output: 'static;

    /// Convert into the owned version
    fn into_static(self) -> Self::Output;
}

macro_rules! impl_into_static_owned {
    ($($t:ty),* $(,)?) => {
        $(
            impl IntoStatic for $t {
                type Output = $t;

                #[inline]
                fn into_static(self) -> Self::Output {
                    self
                }
            }
        )*
    };
}

impl_into_static_owned!(
    bool,
    u8,
    u16,
    u32,
    u64,
    usize,
    i8,
    i16,
    i32,
    i64,
    String,
    SmolStr,
    url::Url,
    bytes::Bytes
);

impl<T: IntoStatic> IntoStatic for Option<T> {
    type Output = Option<T::Output>;

    fn into_static(self) -> Self::Output {
        self.map(IntoStatic::into_static)
    }
}

impl<T: IntoStatic> IntoStatic for Vec<T> {
    type Output = Vec<T::Output>;

    fn into_static(self) -> Self::Output {
        self.into_iter().map(IntoStatic::into_static).collect()
    }
}

impl<K, V> IntoStatic for BTreeMap<K, V>
where
    K: IntoStatic,
    K::Output: Ord,
    V: IntoStatic,
{
    type Output = BTreeMap<K::Output, V::Output>;

    fn into_static(self) -> Self::Output {
        self.into_iter()
            .map(|(k, v)| (k.into_static(), v.into_static()))
            .collect()
    }
}
