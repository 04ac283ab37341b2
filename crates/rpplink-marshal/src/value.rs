use std::fmt;

use bytes::Bytes;

/// A marshalable value.
///
/// Strings are raw byte strings; the target VM has no notion of text
/// encoding. Dict entries keep their wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(Bytes),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Code(Box<CodeObject>),
}

/// A compiled code object as the target VM loads it.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeObject {
    pub name: Bytes,
    pub filename: Bytes,
    /// Bytecode.
    pub code: Bytes,
    /// Line-number table.
    pub lnotab: Bytes,
    pub names: Vec<Value>,
    pub consts: Vec<Value>,
    /// Indices of cell variables.
    pub cellvars: Vec<Value>,
    pub first_line: u16,
    pub arg_count: u8,
    pub flags: u8,
    pub stack_size: u8,
    pub n_locals: u8,
    pub n_freevars: u8,
}

impl Value {
    /// Byte-string value from text.
    pub fn str(text: &str) -> Self {
        Self::Str(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// The bytes of a string value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Str(bytes) => Some(bytes.as_ref()),
            _ => None,
        }
    }

    /// The integer of an int value.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The code object of a code value.
    pub fn as_code(&self) -> Option<&CodeObject> {
        match self {
            Self::Code(code) => Some(code),
            _ => None,
        }
    }

    /// Short kind name, as used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Tuple(_) => "tuple",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Code(_) => "code",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<CodeObject> for Value {
    fn from(code: CodeObject) -> Self {
        Self::Code(Box::new(code))
    }
}

impl CodeObject {
    /// An empty code object named `name` from `filename`.
    pub fn new(name: &str, filename: &str) -> Self {
        Self {
            name: Bytes::copy_from_slice(name.as_bytes()),
            filename: Bytes::copy_from_slice(filename.as_bytes()),
            code: Bytes::new(),
            lnotab: Bytes::new(),
            names: Vec::new(),
            consts: Vec::new(),
            cellvars: Vec::new(),
            first_line: 1,
            arg_count: 0,
            flags: 0,
            stack_size: 0,
            n_locals: 0,
            n_freevars: 0,
        }
    }

    /// Decode a `.pmm` module image: exactly one marshalled code object.
    pub fn from_image(image: &[u8]) -> crate::Result<Self> {
        match crate::decode_all(image)? {
            Value::Code(code) => Ok(*code),
            _ => Err(crate::MarshalError::InvalidCodeObject(
                "module image does not hold a code object",
            )),
        }
    }

    /// Module name as text (lossy).
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(bytes) => write_byte_string(f, bytes),
            Self::Tuple(items) => {
                f.write_str("(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Self::List(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            Self::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Code(code) => write!(
                f,
                "<code {} from {}, line {}>",
                String::from_utf8_lossy(&code.name),
                String::from_utf8_lossy(&code.filename),
                code.first_line
            ),
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_byte_string(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("'")?;
    for &b in bytes {
        match b {
            b'\'' => f.write_str("\\'")?,
            b'\\' => f.write_str("\\\\")?,
            b'\n' => f.write_str("\\n")?,
            0x20..=0x7E => write!(f, "{}", b as char)?,
            _ => write!(f, "\\x{b:02x}")?,
        }
    }
    f.write_str("'")
}
