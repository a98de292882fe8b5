use mia_utils::math;

/// Types of values flowing through behavior graphs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum Type {
    Bool,
    /// Untyped bit vector.
    Bits(u32),
    UInt(u32),
    SInt(u32),
    /// Instruction progress token of a microarchitecture stage.
    Instruction,
    /// Result of fetching the next instruction word.
    FetchResult,
    /// Type of side effects.
    Void,
}

impl Type {
    /// Bit width of a value of this type. The token types carry no data
    /// bits of their own.
    pub fn width(&self) -> u32 {
        match self {
            Type::Bool => 1,
            Type::Bits(w) | Type::UInt(w) | Type::SInt(w) => *w,
            Type::Instruction | Type::FetchResult | Type::Void => 0,
        }
    }

    pub fn is_data(&self) -> bool {
        !matches!(self, Type::Instruction | Type::FetchResult | Type::Void)
    }

    pub fn is_instruction(&self) -> bool {
        matches!(self, Type::Instruction)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::UInt(_) | Type::SInt(_))
    }

    /// Two data types are compatible when they have the same width.
    pub fn compatible(&self, other: &Type) -> bool {
        self.is_data() && other.is_data() && self.width() == other.width()
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Bits(w) => write!(f, "bits<{w}>"),
            Type::UInt(w) => write!(f, "uint<{w}>"),
            Type::SInt(w) => write!(f, "sint<{w}>"),
            Type::Instruction => write!(f, "instruction"),
            Type::FetchResult => write!(f, "fetch_result"),
            Type::Void => write!(f, "void"),
        }
    }
}

/// A constant bit vector. The value is always kept masked to the width.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Value {
    bits: u64,
    width: u32,
}

impl Value {
    pub fn new(bits: u64, width: u32) -> Self {
        Self {
            bits: bits & math::mask(width),
            width,
        }
    }

    pub fn bool(b: bool) -> Self {
        Self::new(b as u64, 1)
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn signed(&self) -> i64 {
        math::sign_extend(self.bits, self.width)
    }

    pub fn is_true(&self) -> bool {
        self.bits != 0
    }

    pub fn is_zero(&self) -> bool {
        self.bits == 0
    }

    pub fn is_ones(&self) -> bool {
        self.width > 0 && self.bits == math::mask(self.width)
    }

    /// Hexadecimal digits without prefix, sized to the width.
    pub fn hex(&self) -> String {
        let digits = self.width.div_ceil(4).max(1) as usize;
        format!("{:0digits$x}", self.bits)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}'{}", self.width, self.bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_masked() {
        let v = Value::new(0x1ff, 8);
        assert_eq!(v.bits(), 0xff);
        assert!(v.is_ones());
        assert_eq!(v.signed(), -1);
        assert_eq!(v.hex(), "ff");
    }

    #[test]
    fn widths() {
        assert_eq!(Type::Bool.width(), 1);
        assert_eq!(Type::SInt(12).width(), 12);
        assert_eq!(Type::Instruction.width(), 0);
        assert!(Type::Bits(32).compatible(&Type::UInt(32)));
        assert!(!Type::Instruction.compatible(&Type::Instruction));
    }
}
