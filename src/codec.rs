use {
  bytes::{Buf, BufMut},
  thiserror::Error,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
  #[error("unexpected end of input")]
  UnexpectedEof,
  #[error("unknown message tag {0}")]
  UnknownTag(u8),
  #[error("invalid {0} value")]
  InvalidValue(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait Encode: Sized {
  /// Encode a value of `Self` into `buf`.
  fn encode<B: BufMut>(&self, buf: &mut B);
}

pub trait Decode: Sized {
  /// Decode a value of `Self` from `buf`.
  fn decode<B: Buf>(buf: &mut B) -> Result<Self>;
}

macro_rules! impl_for {
  ($ty:ident, $put:ident, $get:ident) => {
    impl Encode for $ty {
      fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.$put(*self)
      }
    }
    impl Decode for $ty {
      fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < std::mem::size_of::<Self>() {
          Err(Error::UnexpectedEof)
        } else {
          Ok(buf.$get())
        }
      }
    }
  };
}

impl_for!(u8, put_u8, get_u8);
impl_for!(u16, put_u16, get_u16);
impl_for!(u32, put_u32, get_u32);
impl_for!(u64, put_u64, get_u64);
impl_for!(f32, put_f32, get_f32);

impl Encode for bool {
  fn encode<B: BufMut>(&self, buf: &mut B) {
    buf.put_u8(*self as u8)
  }
}

impl Decode for bool {
  fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
    match u8::decode(buf)? {
      0 => Ok(false),
      1 => Ok(true),
      _ => Err(Error::InvalidValue("bool")),
    }
  }
}

/// Strings are length-prefixed with a single byte.
///
/// ### Panics
///
/// If the string is longer than 255 bytes.
impl Encode for String {
  fn encode<B: BufMut>(&self, buf: &mut B) {
    assert!(self.len() <= u8::MAX as usize, "string is too long to encode");
    buf.put_u8(self.len() as u8);
    buf.put(self.as_bytes());
  }
}

impl Decode for String {
  fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
    let len = u8::decode(buf)? as usize;
    if buf.remaining() < len {
      return Err(Error::UnexpectedEof);
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes[..]);
    String::from_utf8(bytes).map_err(|_| Error::InvalidValue("string"))
  }
}
