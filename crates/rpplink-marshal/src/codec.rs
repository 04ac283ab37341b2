use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MarshalError, Result};
use crate::value::{CodeObject, Value};

/// Maximum container nesting accepted by [`decode`].
pub const MAX_DEPTH: usize = 64;

pub const TAG_NONE: u8 = b'N';
pub const TAG_TRUE: u8 = b'T';
pub const TAG_FALSE: u8 = b'F';
pub const TAG_INT8: u8 = b'B';
pub const TAG_INT16: u8 = b'H';
pub const TAG_INT32: u8 = b'I';
pub const TAG_FLOAT: u8 = b'R';
pub const TAG_SHORT_STR: u8 = b's';
pub const TAG_LONG_STR: u8 = b'S';
pub const TAG_SHORT_TUPLE: u8 = b'(';
pub const TAG_LONG_TUPLE: u8 = b')';
pub const TAG_SHORT_LIST: u8 = b'[';
pub const TAG_LONG_LIST: u8 = b']';
pub const TAG_SHORT_DICT: u8 = b'{';
pub const TAG_LONG_DICT: u8 = b'}';
pub const TAG_CODE: u8 = b'C';

/// Serialize a value into a fresh buffer.
pub fn encode(value: &Value) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    encode_into(value, &mut dst)?;
    Ok(dst.freeze())
}

/// Serialize a value, appending to `dst`.
///
/// Wire format: one tag byte, then a tag-specific payload. Integers,
/// strings and containers always use the smallest form that fits:
/// ```text
/// 'N' 'T' 'F'          none / true / false
/// '0'..'9'             ints 0..=9
/// 'B' i8 | 'H' i16 LE | 'I' i32 LE
/// 'R' f32 LE
/// 's' u8 len | 'S' u16 LE len, then raw bytes
/// '(' ')' '[' ']'      tuple / list, u8 or u16 LE count, then items
/// '{' '}'              dict, u8 or u16 LE count, then key/value pairs
/// 'C'                  code object
/// ```
pub fn encode_into(value: &Value, dst: &mut BytesMut) -> Result<()> {
    match value {
        Value::None => dst.put_u8(TAG_NONE),
        Value::Bool(true) => dst.put_u8(TAG_TRUE),
        Value::Bool(false) => dst.put_u8(TAG_FALSE),
        Value::Int(i) => encode_int(*i, dst),
        Value::Float(x) => {
            dst.put_u8(TAG_FLOAT);
            dst.put_f32_le(*x);
        }
        Value::Str(bytes) => encode_str(bytes, dst)?,
        Value::Tuple(items) => {
            put_count(items.len(), TAG_SHORT_TUPLE, TAG_LONG_TUPLE, "tuple length", dst)?;
            for item in items {
                encode_into(item, dst)?;
            }
        }
        Value::List(items) => {
            put_count(items.len(), TAG_SHORT_LIST, TAG_LONG_LIST, "list length", dst)?;
            for item in items {
                encode_into(item, dst)?;
            }
        }
        Value::Dict(entries) => {
            put_count(entries.len(), TAG_SHORT_DICT, TAG_LONG_DICT, "dict length", dst)?;
            for (k, v) in entries {
                encode_into(k, dst)?;
                encode_into(v, dst)?;
            }
        }
        Value::Code(code) => encode_code(code, dst)?,
    }
    Ok(())
}

fn encode_int(i: i32, dst: &mut BytesMut) {
    if (0..=9).contains(&i) {
        dst.put_u8(b'0' + i as u8);
    } else if let Ok(b) = i8::try_from(i) {
        dst.put_u8(TAG_INT8);
        dst.put_i8(b);
    } else if let Ok(h) = i16::try_from(i) {
        dst.put_u8(TAG_INT16);
        dst.put_i16_le(h);
    } else {
        dst.put_u8(TAG_INT32);
        dst.put_i32_le(i);
    }
}

fn encode_str(bytes: &[u8], dst: &mut BytesMut) -> Result<()> {
    put_count(bytes.len(), TAG_SHORT_STR, TAG_LONG_STR, "string length", dst)?;
    dst.put_slice(bytes);
    Ok(())
}

fn put_count(
    len: usize,
    short_tag: u8,
    long_tag: u8,
    what: &'static str,
    dst: &mut BytesMut,
) -> Result<()> {
    if len <= u8::MAX as usize {
        dst.put_u8(short_tag);
        dst.put_u8(len as u8);
    } else if len <= u16::MAX as usize {
        dst.put_u8(long_tag);
        dst.put_u16_le(len as u16);
    } else {
        return Err(MarshalError::OutOfRange {
            what,
            value: len,
            max: u16::MAX as usize,
        });
    }
    Ok(())
}

fn encode_code(code: &CodeObject, dst: &mut BytesMut) -> Result<()> {
    dst.put_u8(TAG_CODE);
    encode_str(&code.name, dst)?;
    encode_str(&code.filename, dst)?;
    encode_str(&code.code, dst)?;
    encode_str(&code.lnotab, dst)?;
    for field in [&code.names, &code.consts, &code.cellvars] {
        put_count(field.len(), TAG_SHORT_TUPLE, TAG_LONG_TUPLE, "tuple length", dst)?;
        for item in field {
            encode_into(item, dst)?;
        }
    }
    dst.put_u16_le(code.first_line);
    dst.put_u8(code.arg_count);
    dst.put_u8(code.flags);
    dst.put_u8(code.stack_size);
    dst.put_u8(code.n_locals);
    dst.put_u8(code.n_freevars);
    Ok(())
}

/// Deserialize one value from the front of `src`.
///
/// Returns the value and the number of bytes it occupied, so a sequence of
/// values can be read by repeatedly slicing off the consumed prefix.
pub fn decode(src: &[u8]) -> Result<(Value, usize)> {
    let mut cursor = Cursor { src, pos: 0 };
    let value = cursor.value(0)?;
    Ok((value, cursor.pos))
}

/// Deserialize exactly one value spanning all of `src`.
pub fn decode_all(src: &[u8]) -> Result<Value> {
    let (value, consumed) = decode(src)?;
    if consumed != src.len() {
        return Err(MarshalError::TrailingBytes {
            consumed,
            total: src.len(),
        });
    }
    Ok(value)
}

struct Cursor<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let remaining = self.src.len() - self.pos;
        if remaining < n {
            return Err(MarshalError::Truncated {
                needed: n - remaining,
                offset: self.pos,
            });
        }
        let out = &self.src[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16_le(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn array4(&mut self) -> Result<[u8; 4]> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(MarshalError::TooDeep(MAX_DEPTH));
        }

        let offset = self.pos;
        let tag = self.u8()?;
        let value = match tag {
            TAG_NONE => Value::None,
            TAG_TRUE => Value::Bool(true),
            TAG_FALSE => Value::Bool(false),
            b'0'..=b'9' => Value::Int(i32::from(tag - b'0')),
            TAG_INT8 => Value::Int(i32::from(self.u8()? as i8)),
            TAG_INT16 => Value::Int(i32::from(self.u16_le()? as i16)),
            TAG_INT32 => Value::Int(i32::from_le_bytes(self.array4()?)),
            TAG_FLOAT => Value::Float(f32::from_le_bytes(self.array4()?)),
            TAG_SHORT_STR => {
                let len = self.u8()? as usize;
                Value::Str(Bytes::copy_from_slice(self.take(len)?))
            }
            TAG_LONG_STR => {
                let len = self.u16_le()? as usize;
                Value::Str(Bytes::copy_from_slice(self.take(len)?))
            }
            TAG_SHORT_TUPLE => {
                let n = self.u8()? as usize;
                Value::Tuple(self.items(n, depth)?)
            }
            TAG_LONG_TUPLE => {
                let n = self.u16_le()? as usize;
                Value::Tuple(self.items(n, depth)?)
            }
            TAG_SHORT_LIST => {
                let n = self.u8()? as usize;
                Value::List(self.items(n, depth)?)
            }
            TAG_LONG_LIST => {
                let n = self.u16_le()? as usize;
                Value::List(self.items(n, depth)?)
            }
            TAG_SHORT_DICT => {
                let n = self.u8()? as usize;
                Value::Dict(self.entries(n, depth)?)
            }
            TAG_LONG_DICT => {
                let n = self.u16_le()? as usize;
                Value::Dict(self.entries(n, depth)?)
            }
            TAG_CODE => Value::Code(Box::new(self.code(depth)?)),
            other => return Err(MarshalError::UnknownTag { tag: other, offset }),
        };
        Ok(value)
    }

    fn items(&mut self, n: usize, depth: usize) -> Result<Vec<Value>> {
        // Every item takes at least one byte; don't trust `n` for capacity beyond that.
        let mut out = Vec::with_capacity(n.min(self.src.len() - self.pos));
        for _ in 0..n {
            out.push(self.value(depth + 1)?);
        }
        Ok(out)
    }

    fn entries(&mut self, n: usize, depth: usize) -> Result<Vec<(Value, Value)>> {
        let mut out = Vec::with_capacity(n.min(self.src.len() - self.pos));
        for _ in 0..n {
            let k = self.value(depth + 1)?;
            let v = self.value(depth + 1)?;
            out.push((k, v));
        }
        Ok(out)
    }

    fn code(&mut self, depth: usize) -> Result<CodeObject> {
        let name = self.str_field(depth, "name must be a string")?;
        let filename = self.str_field(depth, "filename must be a string")?;
        let code = self.str_field(depth, "bytecode must be a string")?;
        let lnotab = self.str_field(depth, "line table must be a string")?;
        let names = self.tuple_field(depth, "names must be a tuple")?;
        let consts = self.tuple_field(depth, "consts must be a tuple")?;
        let cellvars = self.tuple_field(depth, "cellvars must be a tuple")?;
        Ok(CodeObject {
            name,
            filename,
            code,
            lnotab,
            names,
            consts,
            cellvars,
            first_line: self.u16_le()?,
            arg_count: self.u8()?,
            flags: self.u8()?,
            stack_size: self.u8()?,
            n_locals: self.u8()?,
            n_freevars: self.u8()?,
        })
    }

    fn str_field(&mut self, depth: usize, msg: &'static str) -> Result<Bytes> {
        match self.value(depth + 1)? {
            Value::Str(bytes) => Ok(bytes),
            _ => Err(MarshalError::InvalidCodeObject(msg)),
        }
    }

    fn tuple_field(&mut self, depth: usize, msg: &'static str) -> Result<Vec<Value>> {
        match self.value(depth + 1)? {
            Value::Tuple(items) => Ok(items),
            _ => Err(MarshalError::InvalidCodeObject(msg)),
        }
    }
}
