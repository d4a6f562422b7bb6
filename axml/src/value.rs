//! Typed attribute values and their text representation.

/// The type of the data held by an attribute, stored in the top byte of the attribute's type word.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueType {
    Null,
    Reference,
    Attribute,
    String,
    Float,
    Dimension,
    Fraction,
    IntDec,
    IntHex,
    IntBoolean,
    ColorArgb8,
    ColorRgb8,
    ColorArgb4,
    ColorRgb4,
    /// A type this crate does not interpret. Kept so that it can be saved unchanged.
    Unknown(u8),
}

impl ValueType {
    pub fn parse(from: u8) -> Self {
        match from {
            0x00 => Self::Null,
            0x01 => Self::Reference,
            0x02 => Self::Attribute,
            0x03 => Self::String,
            0x04 => Self::Float,
            0x05 => Self::Dimension,
            0x06 => Self::Fraction,
            0x10 => Self::IntDec,
            0x11 => Self::IntHex,
            0x12 => Self::IntBoolean,
            0x1C => Self::ColorArgb8,
            0x1D => Self::ColorRgb8,
            0x1E => Self::ColorArgb4,
            0x1F => Self::ColorRgb4,
            other => Self::Unknown(other),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::Null => 0x00,
            Self::Reference => 0x01,
            Self::Attribute => 0x02,
            Self::String => 0x03,
            Self::Float => 0x04,
            Self::Dimension => 0x05,
            Self::Fraction => 0x06,
            Self::IntDec => 0x10,
            Self::IntHex => 0x11,
            Self::IntBoolean => 0x12,
            Self::ColorArgb8 => 0x1C,
            Self::ColorRgb8 => 0x1D,
            Self::ColorArgb4 => 0x1E,
            Self::ColorRgb4 => 0x1F,
            Self::Unknown(id) => *id,
        }
    }

    /// True for the types whose data is a plain integer (decimal, hex, boolean and colours).
    pub fn is_int(&self) -> bool {
        (0x10..=0x1F).contains(&self.id())
    }
}

/// Resolves resource IDs to names, e.g. `0x01010003` to `android:attr/name`.
pub trait ResourceResolver {
    fn resource_name(&self, id: u32) -> Option<String>;
}

impl ResourceResolver for std::collections::HashMap<u32, String> {
    fn resource_name(&self, id: u32) -> Option<String> {
        self.get(&id).cloned()
    }
}

const DIMENSION_UNITS: [&str; 6] = ["px", "dp", "sp", "pt", "in", "mm"];
const FRACTION_UNITS: [&str; 2] = ["%", "%p"];

// Indexed by the radix bits, converts the mantissa into its real value.
const RADIX_MULTIPLIERS: [f32; 4] = [
    1.0,
    1.0 / 128.0,
    1.0 / 32768.0,
    1.0 / 8388608.0,
];

/// Decodes the numeric part of a complex (dimension or fraction) value.
/// The top 24 bits are a signed mantissa, and bits 4 and 5 give the position of the binary point.
pub fn complex_to_float(complex: i32) -> f32 {
    let mantissa = complex >> 8;
    let radix = ((complex >> 4) & 0x3) as usize;

    mantissa as f32 * RADIX_MULTIPLIERS[radix]
}

/// The unit suffix of a dimension. Unit indices that are out of range are treated as pixels.
pub fn dimension_unit(complex: i32) -> &'static str {
    DIMENSION_UNITS
        .get((complex & 0xF) as usize)
        .copied()
        .unwrap_or(DIMENSION_UNITS[0])
}

/// `%` for a fraction of the element itself, `%p` for a fraction of its parent.
pub fn fraction_unit(complex: i32) -> &'static str {
    FRACTION_UNITS
        .get((complex & 0xF) as usize)
        .copied()
        .unwrap_or(FRACTION_UNITS[0])
}

pub fn format_dimension(complex: i32) -> String {
    format!("{}{}", format_number(complex_to_float(complex)), dimension_unit(complex))
}

pub fn format_fraction(complex: i32) -> String {
    format!("{:.2}{}", complex_to_float(complex) * 100.0, fraction_unit(complex))
}

/// Names the permission protection level in the lower 4 bits of `level`.
pub fn protection_level(level: i32) -> &'static str {
    match level & 0xF {
        0 => "normal",
        1 => "dangerous",
        2 => "signature",
        3 => "signatureOrSystem",
        4 => "internal",
        _ => "????",
    }
}

pub fn format_boolean(data: i32) -> &'static str {
    match data {
        -1 => "true",
        0 => "false",
        _ => "ERROR",
    }
}

/// Formats an attribute's value as it would appear in a text XML file.
///
/// `name` is the local name of the attribute, which changes the formatting of `protectionLevel`.
/// `string` is the pool string referred to by the attribute, used for string values.
pub fn format_value(
    name: &str,
    value_type: ValueType,
    data: i32,
    string: Option<&str>,
    resolver: Option<&dyn ResourceResolver>,
) -> String {
    match value_type {
        ValueType::Null => String::new(),
        ValueType::String => string.unwrap_or_default().to_string(),
        ValueType::Reference => {
            match resolver.and_then(|resolver| resolver.resource_name(data as u32)) {
                Some(resolved) => format!("@{resolved}"),
                None => format!("@{:X}", data as u32),
            }
        }
        ValueType::Attribute => {
            match resolver.and_then(|resolver| resolver.resource_name(data as u32)) {
                Some(resolved) => format!("?{resolved}"),
                None => format!("?{:X}", data as u32),
            }
        }
        ValueType::Float => format!("{:?}", f32::from_bits(data as u32)),
        ValueType::Dimension => format_dimension(data),
        ValueType::Fraction => format_fraction(data),
        ValueType::IntDec => data.to_string(),
        ValueType::IntHex if name == "protectionLevel" => protection_level(data).to_string(),
        ValueType::IntBoolean => format_boolean(data).to_string(),
        ValueType::ColorArgb8 => format!("#{:08X}", data as u32),
        ValueType::ColorRgb8 => format!("#{:06X}", data as u32 & 0xFFFFFF),
        ValueType::ColorArgb4 => format!("#{:04X}", data as u32 & 0xFFFF),
        ValueType::ColorRgb4 => format!("#{:03X}", data as u32 & 0xFFF),
        ValueType::IntHex | ValueType::Unknown(_) => format!("0x{:08X}", data as u32),
    }
}

// Whole numbers are printed without a fractional part
fn format_number(value: f32) -> String {
    if value.fract() == 0.0 && value.abs() < 1e9 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn type_ids_round_trip() {
        for id in 0..=u8::MAX {
            assert_eq!(ValueType::parse(id).id(), id);
        }
        assert_eq!(ValueType::parse(0x12), ValueType::IntBoolean);
        assert!(ValueType::IntBoolean.is_int());
        assert!(!ValueType::String.is_int());
    }

    #[test]
    fn complex_values() {
        // Mantissa 100, radix 0, unit dp
        let complex = (100 << 8) | 0x01;
        assert_eq!(complex_to_float(complex), 100.0);
        assert_eq!(format_dimension(complex), "100dp");

        // Mantissa 1, radix 1
        assert_eq!(complex_to_float((1 << 8) | (1 << 4)), 1.0 / 128.0);
        assert_eq!(complex_to_float((1 << 8) | (2 << 4)), 1.0 / 32768.0);
    }

    #[test]
    fn negative_mantissa() {
        let complex = (-3 << 8) | 0x02;
        assert_eq!(complex_to_float(complex), -3.0);
        assert_eq!(format_dimension(complex), "-3sp");
    }

    #[test]
    fn dimension_units() {
        assert_eq!(dimension_unit(0), "px");
        assert_eq!(dimension_unit(5), "mm");
        assert_eq!(dimension_unit(9), "px");
        assert_eq!(format_dimension((3 << 8) | (1 << 4) | 1), format!("{}dp", 3.0f32 / 128.0));
    }

    #[test]
    fn fractions() {
        // 0.5 in radix 23p0 needs a fractional mantissa, so use radix 1 (divide by 128)
        let half = (64 << 8) | (1 << 4);
        assert_eq!(format_fraction(half), "50.00%");
        assert_eq!(format_fraction(half | 1), "50.00%p");
    }

    #[test]
    fn booleans() {
        assert_eq!(format_value("enabled", ValueType::IntBoolean, -1, None, None), "true");
        assert_eq!(format_value("enabled", ValueType::IntBoolean, 0, None, None), "false");
        assert_eq!(format_value("enabled", ValueType::IntBoolean, 1, None, None), "ERROR");
    }

    #[test]
    fn protection_levels() {
        assert_eq!(format_value("protectionLevel", ValueType::IntHex, 2, None, None), "signature");
        assert_eq!(format_value("protectionLevel", ValueType::IntHex, 0x12, None, None), "signature");
        assert_eq!(format_value("protectionLevel", ValueType::IntHex, 7, None, None), "????");
        assert_eq!(format_value("flags", ValueType::IntHex, 2, None, None), "0x00000002");
    }

    #[test]
    fn references() {
        assert_eq!(
            format_value("theme", ValueType::Reference, 0x7F0A0001, None, None),
            "@7F0A0001"
        );

        let mut names = HashMap::new();
        names.insert(0x7F0A0001u32, "style/AppTheme".to_string());
        assert_eq!(
            format_value("theme", ValueType::Reference, 0x7F0A0001, None, Some(&names)),
            "@style/AppTheme"
        );
        assert_eq!(format_value("a", ValueType::Attribute, 0x0101, None, None), "?101");
    }

    #[test]
    fn colours_and_numbers() {
        assert_eq!(format_value("c", ValueType::ColorArgb8, 0xFF00FF00u32 as i32, None, None), "#FF00FF00");
        assert_eq!(format_value("c", ValueType::ColorRgb8, 0xFF00FF00u32 as i32, None, None), "#00FF00");
        assert_eq!(format_value("c", ValueType::ColorArgb4, 0xF0F0, None, None), "#F0F0");
        assert_eq!(format_value("c", ValueType::ColorRgb4, 0x0F0, None, None), "#0F0");
        assert_eq!(format_value("n", ValueType::IntDec, -12, None, None), "-12");
        assert_eq!(format_value("f", ValueType::Float, 1.5f32.to_bits() as i32, None, None), "1.5");
        assert_eq!(format_value("x", ValueType::Unknown(0x07), 255, None, None), "0x000000FF");
        assert_eq!(format_value("x", ValueType::Null, 255, None, None), "");
        assert_eq!(format_value("s", ValueType::String, 0, Some("hi"), None), "hi");
    }
}
