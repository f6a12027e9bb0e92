//! Value types.
//!
//! Every IR value has a type of the form `(class, element width, lane
//! count)`. Scalars have a lane count of 1; a vector type carries a scalar
//! element type and a lane count greater than 1, and its total width is
//! `element width * lanes`.

use core::fmt;

/// The class of a value type.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeClass {
    /// No value (the result "type" of action nodes).
    None,
    /// Two's complement signed integer.
    SignedInteger,
    /// Unsigned integer.
    UnsignedInteger,
    /// IEEE floating point (32/64), or the x87 80-bit extended format.
    FloatingPoint,
}

/// A value type: type class, element width in bits, and lane count.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ValueType {
    class: TypeClass,
    element_bits: u16,
    lanes: u16,
}

impl ValueType {
    /// Integer element widths the IR recognizes.
    const INT_WIDTHS: &'static [u16] = &[1, 8, 16, 32, 64, 128, 256, 512];
    /// Floating-point element widths the IR recognizes.
    const FLOAT_WIDTHS: &'static [u16] = &[32, 64, 80];

    /// Construct a scalar type. Returns `None` for widths outside the type
    /// lattice.
    pub fn scalar(class: TypeClass, bits: u16) -> Option<Self> {
        let ok = match class {
            TypeClass::None => bits == 0,
            TypeClass::SignedInteger | TypeClass::UnsignedInteger => {
                Self::INT_WIDTHS.contains(&bits)
            }
            TypeClass::FloatingPoint => Self::FLOAT_WIDTHS.contains(&bits),
        };
        ok.then_some(Self {
            class,
            element_bits: bits,
            lanes: 1,
        })
    }

    /// Construct a vector type from a scalar element type and a lane count.
    /// Returns `None` if the element is not scalar.
    pub fn vector(element: ValueType, lanes: u16) -> Option<Self> {
        if element.is_vector() || element.class == TypeClass::None || lanes == 0 {
            return None;
        }
        Some(Self {
            class: element.class,
            element_bits: element.element_bits,
            lanes,
        })
    }

    /// The void type.
    pub const fn void() -> Self {
        Self {
            class: TypeClass::None,
            element_bits: 0,
            lanes: 1,
        }
    }

    const fn uint(bits: u16) -> Self {
        Self {
            class: TypeClass::UnsignedInteger,
            element_bits: bits,
            lanes: 1,
        }
    }

    const fn sint(bits: u16) -> Self {
        Self {
            class: TypeClass::SignedInteger,
            element_bits: bits,
            lanes: 1,
        }
    }

    const fn float(bits: u16) -> Self {
        Self {
            class: TypeClass::FloatingPoint,
            element_bits: bits,
            lanes: 1,
        }
    }

    /// A 1-bit unsigned integer, used only for booleans and flags.
    pub const fn u1() -> Self {
        Self::uint(1)
    }
    pub const fn u8() -> Self {
        Self::uint(8)
    }
    pub const fn u16() -> Self {
        Self::uint(16)
    }
    pub const fn u32() -> Self {
        Self::uint(32)
    }
    pub const fn u64() -> Self {
        Self::uint(64)
    }
    pub const fn u128() -> Self {
        Self::uint(128)
    }
    pub const fn u256() -> Self {
        Self::uint(256)
    }
    pub const fn u512() -> Self {
        Self::uint(512)
    }
    pub const fn s8() -> Self {
        Self::sint(8)
    }
    pub const fn s16() -> Self {
        Self::sint(16)
    }
    pub const fn s32() -> Self {
        Self::sint(32)
    }
    pub const fn s64() -> Self {
        Self::sint(64)
    }
    pub const fn f32() -> Self {
        Self::float(32)
    }
    pub const fn f64() -> Self {
        Self::float(64)
    }
    /// The x87 extended-precision format. Only moved, never computed on.
    pub const fn f80() -> Self {
        Self::float(80)
    }

    /// The type class.
    pub fn class(self) -> TypeClass {
        self.class
    }

    /// Total width in bits.
    pub fn width(self) -> u32 {
        self.element_bits as u32 * self.lanes as u32
    }

    /// Width of one element in bits.
    pub fn element_width(self) -> u16 {
        self.element_bits
    }

    /// Number of lanes. 1 for scalars.
    pub fn lanes(self) -> u16 {
        self.lanes
    }

    /// Is this a vector type?
    pub fn is_vector(self) -> bool {
        self.lanes > 1
    }

    /// Is this any integer type?
    pub fn is_int(self) -> bool {
        matches!(
            self.class,
            TypeClass::SignedInteger | TypeClass::UnsignedInteger
        )
    }

    /// Is this a floating-point type?
    pub fn is_float(self) -> bool {
        self.class == TypeClass::FloatingPoint
    }

    /// The scalar type of one element.
    pub fn element_type(self) -> ValueType {
        Self {
            class: self.class,
            element_bits: self.element_bits,
            lanes: 1,
        }
    }

    /// Same shape, signed integer class.
    pub fn as_signed(self) -> ValueType {
        debug_assert!(self.is_int());
        Self {
            class: TypeClass::SignedInteger,
            ..self
        }
    }

    /// Same shape, unsigned integer class.
    pub fn as_unsigned(self) -> ValueType {
        debug_assert!(self.is_int());
        Self {
            class: TypeClass::UnsignedInteger,
            ..self
        }
    }

    /// A scalar integer of this class with the given width, if representable.
    pub fn with_width(self, bits: u16) -> Option<ValueType> {
        Self::scalar(self.class, bits)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = match self.class {
            TypeClass::None => return write!(f, "void"),
            TypeClass::SignedInteger => 's',
            TypeClass::UnsignedInteger => 'u',
            TypeClass::FloatingPoint => 'f',
        };
        write!(f, "{}{}", prefix, self.element_bits)?;
        if self.is_vector() {
            write!(f, "x{}", self.lanes)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(ValueType::u1().width(), 1);
        assert_eq!(ValueType::u64().width(), 64);
        let v = ValueType::vector(ValueType::u32(), 4).unwrap();
        assert_eq!(v.width(), 128);
        assert_eq!(v.element_width(), 32);
        assert!(v.is_vector());
        assert!(!ValueType::u128().is_vector());
    }

    #[test]
    fn lattice_rejects_bad_shapes() {
        assert!(ValueType::scalar(TypeClass::UnsignedInteger, 24).is_none());
        assert!(ValueType::scalar(TypeClass::FloatingPoint, 16).is_none());
        let v = ValueType::vector(ValueType::u32(), 4).unwrap();
        assert!(ValueType::vector(v, 2).is_none());
    }

    #[test]
    fn class_flips() {
        assert_eq!(ValueType::u32().as_signed(), ValueType::s32());
        assert_eq!(ValueType::s8().as_unsigned(), ValueType::u8());
    }

    #[test]
    fn display() {
        assert_eq!(ValueType::u64().to_string(), "u64");
        assert_eq!(ValueType::s8().to_string(), "s8");
        assert_eq!(
            ValueType::vector(ValueType::f64(), 2).unwrap().to_string(),
            "f64x2"
        );
    }
}
