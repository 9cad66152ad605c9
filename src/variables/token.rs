use std::fmt;

/// Essential climate variables understood by every provider with a variable catalog.
pub const ECVS: [&str; 8] = [
    "precipitation",
    "pressure",
    "surface_radiation_longwave",
    "surface_radiation_shortwave",
    "surface_wind_speed",
    "surface_wind_direction",
    "temperature",
    "water_vapour",
];

/// What a caller may use to name a variable: a native code, a native display
/// name or an ECV.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariableToken {
    Code(i64),
    Name(String),
}

/// A provider's native variable code, in the shape it was supplied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariableCode {
    Int(i64),
    Str(String),
}

impl VariableCode {
    /// The numeric value of integer codes and of strings made of digits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            VariableCode::Int(code) => Some(*code),
            VariableCode::Str(code) => code.parse().ok(),
        }
    }
}

impl fmt::Display for VariableToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableToken::Code(code) => write!(f, "{code}"),
            VariableToken::Name(name) => f.write_str(name),
        }
    }
}

impl fmt::Display for VariableCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableCode::Int(code) => write!(f, "{code}"),
            VariableCode::Str(code) => f.write_str(code),
        }
    }
}

impl From<i64> for VariableToken {
    fn from(value: i64) -> Self {
        VariableToken::Code(value)
    }
}

impl From<i32> for VariableToken {
    fn from(value: i32) -> Self {
        VariableToken::Code(value.into())
    }
}

impl From<&str> for VariableToken {
    fn from(value: &str) -> Self {
        VariableToken::Name(value.to_string())
    }
}

impl From<String> for VariableToken {
    fn from(value: String) -> Self {
        VariableToken::Name(value)
    }
}

impl From<VariableCode> for VariableToken {
    fn from(value: VariableCode) -> Self {
        match value {
            VariableCode::Int(code) => VariableToken::Code(code),
            VariableCode::Str(code) => VariableToken::Name(code),
        }
    }
}

impl From<&VariableCode> for VariableToken {
    fn from(value: &VariableCode) -> Self {
        value.clone().into()
    }
}

impl From<i64> for VariableCode {
    fn from(value: i64) -> Self {
        VariableCode::Int(value)
    }
}

impl From<&str> for VariableCode {
    fn from(value: &str) -> Self {
        VariableCode::Str(value.to_string())
    }
}
