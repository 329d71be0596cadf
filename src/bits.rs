use std::ops::{BitAnd, Shl, Shr};

use num::Integer;

/// Slice a bit field out of an encoding: the bit_width bits starting at
/// bit_position, shifted down to bit 0. This is the extraction rule every
/// operand descriptor in the decode tables is written against.
pub fn field<T>(value: T, bit_position: T, bit_width: T) -> T
where
    T: Copy + Integer + Shl<Output = T> + Shr<Output = T> + BitAnd<Output = T>,
{
    let field_mask = (T::one() << bit_width) - T::one();
    field_mask & (value >> bit_position)
}
