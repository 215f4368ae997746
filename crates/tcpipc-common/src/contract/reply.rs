use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::protocol::error::{Result, TcpipcError};

/// What a contract method produced, before or after crossing the wire.
#[derive(Debug)]
pub enum Reply {
    /// A value that travels inline through the codec.
    Plain(Value),
    /// A byte payload that travels through the bulk sub-protocol.
    Bulky(BulkPayload),
}

impl Reply {
    /// Classifies and encodes a method's return value.
    ///
    /// A value is bulky only when its type is exactly [`BulkPayload`]; a
    /// payload nested inside another value refuses to serialize and the
    /// call fails with `Conversion`, as does a non-finite float.
    pub fn from_return<R: Serialize + 'static>(value: R) -> Result<Reply> {
        let mut slot = Some(value);
        let any: &mut dyn Any = &mut slot;
        if let Some(payload) = any
            .downcast_mut::<Option<BulkPayload>>()
            .and_then(Option::take)
        {
            return Ok(Reply::Bulky(payload));
        }

        let value = super::finite::to_value(&slot).map_err(|e| {
            TcpipcError::Conversion(format!(
                "cannot encode return value of type {}: {}",
                type_name::<R>(),
                e
            ))
        })?;
        Ok(Reply::Plain(value))
    }

    /// Converts the reply into the declared return type `R`.
    ///
    /// A unit return type discards whatever came back.
    pub fn into_return<R: DeserializeOwned + 'static>(self) -> Result<R> {
        if TypeId::of::<R>() == TypeId::of::<()>() {
            return downcast::<R>(Box::new(()));
        }

        match self {
            Reply::Bulky(payload) => downcast::<R>(Box::new(payload)),
            Reply::Plain(value) => serde_json::from_value(value).map_err(|e| {
                TcpipcError::Conversion(format!(
                    "cannot convert return value to {}: {}",
                    type_name::<R>(),
                    e
                ))
            }),
        }
    }

    pub fn is_bulky(&self) -> bool {
        matches!(self, Reply::Bulky(_))
    }
}

fn downcast<R: 'static>(value: Box<dyn Any>) -> Result<R> {
    value.downcast::<R>().map(|boxed| *boxed).map_err(|_| {
        TcpipcError::Conversion(format!("bulk payload cannot be converted to {}", type_name::<R>()))
    })
}

/// A binary result delivered through the bulk sub-protocol instead of the
/// text codec.
///
/// Services return it from a contract method to stream `len` bytes from any
/// reader. On the client it comes back backed by the received buffer,
/// positioned at its start.
///
/// # Example
///
/// ```
/// use std::io::Read;
/// use tcpipc_common::contract::BulkPayload;
///
/// let mut payload = BulkPayload::from_bytes(vec![1, 2, 3]);
/// assert_eq!(payload.len(), 3);
///
/// let mut first = [0u8; 1];
/// payload.read_exact(&mut first).unwrap();
/// assert_eq!(first, [1]);
/// ```
pub struct BulkPayload {
    len: u64,
    source: Box<dyn Read + Send>,
}

impl BulkPayload {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self {
            len: bytes.len() as u64,
            source: Box::new(Cursor::new(bytes)),
        }
    }

    /// Streams `len` bytes from `reader`. The reader must yield at least
    /// `len` bytes, otherwise the transfer fails part way.
    pub fn from_reader(reader: impl Read + Send + 'static, len: u64) -> Self {
        Self {
            len,
            source: Box::new(reader.take(len)),
        }
    }

    /// Streams a whole file, sized from its metadata.
    pub fn from_file(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self::from_reader(file, len))
    }

    /// Declared length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the remaining bytes into memory.
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(usize::try_from(self.len).unwrap_or(0));
        self.source.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl Read for BulkPayload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.source.read(buf)
    }
}

impl fmt::Debug for BulkPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkPayload").field("len", &self.len).finish()
    }
}

impl Serialize for BulkPayload {
    fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom(
            "a BulkPayload can only be returned directly from a contract method",
        ))
    }
}

impl<'de> Deserialize<'de> for BulkPayload {
    fn deserialize<D: Deserializer<'de>>(_deserializer: D) -> std::result::Result<Self, D::Error> {
        Err(serde::de::Error::custom(
            "a BulkPayload is only produced by the bulk sub-protocol",
        ))
    }
}
