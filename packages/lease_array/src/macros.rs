/// Creates a [`DynArray`][crate::DynArray] holding the given elements, in the manner of `vec!`.
///
/// The array uses the system allocator and has capacity equal to its length.
///
/// * `dyn_array![]` creates an empty array without acquiring storage.
/// * `dyn_array![value; n]` creates an array of `n` clones of `value`.
/// * `dyn_array![a, b, c]` creates an array holding the listed values in order.
///
/// # Examples
///
/// ```
/// use lease_array::dyn_array;
///
/// let words = dyn_array!["ab", "ac", "ad"];
/// assert_eq!(words.len(), 3);
/// assert_eq!(words.capacity(), 3);
///
/// let zeros = dyn_array![0_u8; 4];
/// assert_eq!(zeros, [0, 0, 0, 0]);
/// ```
#[macro_export]
macro_rules! dyn_array {
    () => {
        $crate::DynArray::new()
    };

    ($value:expr; $len:expr) => {
        $crate::DynArray::from_elem($len, $value)
    };

    ($($item:expr),+ $(,)?) => {
        $crate::DynArray::from([$($item),+])
    };
}
