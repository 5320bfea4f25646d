//! Length-delimited message streaming over `std::io` byte streams.
//!
//! Frames are `[length: varint][payload: bytes]`; the payload is the
//! binary wire format of one message. This is the conventional framing
//! for writing a sequence of messages to a file or socket.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::io::Cursor;
//! use std::sync::Arc;
//! use wireberry::{
//!     DelimitedReader, DelimitedWriter, ExtensionRegistry, FieldDescriptor, FieldType,
//!     Message, MessageDescriptor, Value,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let desc = MessageDescriptor::new("example.Event");
//!     desc.set_fields(vec![FieldDescriptor::singular(1, "name", FieldType::String)])?;
//!
//!     let mut buffer = Vec::new();
//!     {
//!         let mut writer = DelimitedWriter::new(&mut buffer);
//!         let event = Message::build(desc.clone(), |m| {
//!             m.set(1, Value::String("started".into()));
//!         });
//!         writer.write_message(&event)?;
//!         writer.flush()?;
//!     }
//!
//!     let registry = ExtensionRegistry::new();
//!     let mut reader = DelimitedReader::new(Cursor::new(&buffer), desc, &registry);
//!     while let Some(event) = reader.try_read_message()? {
//!         println!("{:?}", event.get(1));
//!     }
//!     Ok(())
//! }
//! ```

use std::io::{BufReader, BufWriter, Read, Write};
use std::sync::Arc;

use crate::binary;
use crate::descriptor::MessageDescriptor;
use crate::error::DelimitedError;
use crate::extensions::ExtensionRegistry;
use crate::options::{BinaryDecodingOptions, BinaryEncodingOptions};
use crate::value::Message;

/// Default buffer capacity for delimited readers/writers.
const DEFAULT_BUFFER_CAPACITY: usize = 8192;

/// Maximum frame size accepted by default (64 MiB).
const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Writes length-delimited messages to a byte stream.
pub struct DelimitedWriter<W: Write> {
    inner: BufWriter<W>,
    options: BinaryEncodingOptions,
}

impl<W: Write> DelimitedWriter<W> {
    /// Creates a writer with the default buffer capacity.
    pub fn new(writer: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY, writer)
    }

    /// Creates a writer with the specified buffer capacity.
    pub fn with_capacity(capacity: usize, writer: W) -> Self {
        Self {
            inner: BufWriter::with_capacity(capacity, writer),
            options: BinaryEncodingOptions::default(),
        }
    }

    /// Encodes `message` and writes it as one frame.
    pub fn write_message(&mut self, message: &Message) -> Result<(), DelimitedError> {
        let payload = binary::encode(message, &self.options)?;
        self.write_varint(payload.len() as u64)?;
        self.inner.write_all(&payload)?;
        Ok(())
    }

    /// Flushes the underlying buffer.
    pub fn flush(&mut self) -> Result<(), DelimitedError> {
        self.inner.flush()?;
        Ok(())
    }

    /// Consumes the writer, flushing and returning the underlying stream.
    pub fn into_inner(self) -> Result<W, DelimitedError> {
        self.inner
            .into_inner()
            .map_err(|e| DelimitedError::Io(e.into_error()))
    }

    fn write_varint(&mut self, mut value: u64) -> Result<(), DelimitedError> {
        let mut buf = [0u8; 10];
        let mut i = 0;
        while value > 0x7f {
            buf[i] = (value as u8 & 0x7f) | 0x80;
            value >>= 7;
            i += 1;
        }
        buf[i] = value as u8;
        self.inner.write_all(&buf[..=i])?;
        Ok(())
    }
}

/// Reads length-delimited messages of one type from a byte stream.
pub struct DelimitedReader<'r, R: Read> {
    inner: BufReader<R>,
    descriptor: Arc<MessageDescriptor>,
    registry: &'r ExtensionRegistry,
    options: BinaryDecodingOptions,
    max_message_size: usize,
}

impl<'r, R: Read> DelimitedReader<'r, R> {
    /// Creates a reader with the default buffer capacity.
    pub fn new(reader: R, descriptor: Arc<MessageDescriptor>, registry: &'r ExtensionRegistry) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY, reader, descriptor, registry)
    }

    /// Creates a reader with the specified buffer capacity.
    pub fn with_capacity(
        capacity: usize,
        reader: R,
        descriptor: Arc<MessageDescriptor>,
        registry: &'r ExtensionRegistry,
    ) -> Self {
        Self {
            inner: BufReader::with_capacity(capacity, reader),
            descriptor,
            registry,
            options: BinaryDecodingOptions::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Sets the maximum accepted frame size.
    pub fn set_max_message_size(&mut self, size: usize) {
        self.max_message_size = size;
    }

    /// Sets the decoding options applied to each frame.
    pub fn set_decoding_options(&mut self, options: BinaryDecodingOptions) {
        self.options = options;
    }

    /// Reads one message. Fails with [`DelimitedError::UnexpectedEof`]
    /// if the stream ends at a frame boundary; use [`try_read_message`]
    /// to treat that as end-of-stream.
    ///
    /// [`try_read_message`]: DelimitedReader::try_read_message
    pub fn read_message(&mut self) -> Result<Message, DelimitedError> {
        match self.try_read_message()? {
            Some(message) => Ok(message),
            None => Err(DelimitedError::UnexpectedEof),
        }
    }

    /// Reads one message, or `None` at a clean end of stream.
    pub fn try_read_message(&mut self) -> Result<Option<Message>, DelimitedError> {
        let length = match self.try_read_varint()? {
            Some(length) => length as usize,
            None => return Ok(None),
        };
        if length > self.max_message_size {
            return Err(DelimitedError::MessageTooLarge {
                size: length,
                max: self.max_message_size,
            });
        }
        let mut payload = vec![0u8; length];
        self.inner
            .read_exact(&mut payload)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => DelimitedError::UnexpectedEof,
                _ => DelimitedError::Io(e),
            })?;
        let message = binary::decode(self.descriptor.clone(), &payload, self.registry, &self.options)?;
        Ok(Some(message))
    }

    /// Returns an iterator over the remaining messages in the stream.
    pub fn messages(&mut self) -> MessageIter<'_, 'r, R> {
        MessageIter { reader: self }
    }

    /// Reads the length prefix, returning `None` at a clean EOF.
    fn try_read_varint(&mut self) -> Result<Option<u64>, DelimitedError> {
        let mut result: u64 = 0;
        let mut shift = 0;
        let mut buf = [0u8; 1];
        for i in 0..10 {
            match self.inner.read(&mut buf) {
                Ok(0) if i == 0 => return Ok(None),
                Ok(0) => return Err(DelimitedError::UnexpectedEof),
                Ok(_) => {
                    let byte = buf[0];
                    result |= ((byte & 0x7f) as u64) << shift;
                    if byte & 0x80 == 0 {
                        return Ok(Some(result));
                    }
                    shift += 7;
                }
                Err(e) => return Err(DelimitedError::Io(e)),
            }
        }
        Err(DelimitedError::MalformedLength)
    }
}

/// Iterator over the messages of a [`DelimitedReader`].
pub struct MessageIter<'a, 'r, R: Read> {
    reader: &'a mut DelimitedReader<'r, R>,
}

impl<R: Read> Iterator for MessageIter<'_, '_, R> {
    type Item = Result<Message, DelimitedError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.try_read_message() {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldDescriptor, FieldType};
    use crate::value::Value;
    use std::io::Cursor;

    fn event_desc() -> Arc<MessageDescriptor> {
        let desc = MessageDescriptor::new("test.Event");
        desc.set_fields(vec![
            FieldDescriptor::singular(1, "name", FieldType::String),
            FieldDescriptor::singular(2, "code", FieldType::Int32),
        ])
        .unwrap();
        desc
    }

    fn events(desc: &Arc<MessageDescriptor>, names: &[&str]) -> Vec<Message> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                Message::build(desc.clone(), |m| {
                    m.set(1, Value::String(name.to_string()));
                    m.set(2, Value::Int32(i as i32 + 1));
                })
            })
            .collect()
    }

    #[test]
    fn test_roundtrip_multiple_messages() {
        let desc = event_desc();
        let messages = events(&desc, &["one", "two", "three"]);

        let mut buffer = Vec::new();
        {
            let mut writer = DelimitedWriter::new(&mut buffer);
            for message in &messages {
                writer.write_message(message).unwrap();
            }
            writer.flush().unwrap();
        }

        let registry = ExtensionRegistry::new();
        let mut reader = DelimitedReader::new(Cursor::new(&buffer), desc, &registry);
        assert_eq!(reader.read_message().unwrap(), messages[0]);
        assert_eq!(reader.read_message().unwrap(), messages[1]);
        assert_eq!(reader.read_message().unwrap(), messages[2]);
        assert!(reader.try_read_message().unwrap().is_none());
    }

    #[test]
    fn test_empty_message_frame() {
        let desc = event_desc();
        let empty = Message::new(desc.clone());

        let mut buffer = Vec::new();
        {
            let mut writer = DelimitedWriter::new(&mut buffer);
            writer.write_message(&empty).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(buffer, vec![0]);

        let registry = ExtensionRegistry::new();
        let mut reader = DelimitedReader::new(Cursor::new(&buffer), desc, &registry);
        assert_eq!(reader.read_message().unwrap(), empty);
    }

    #[test]
    fn test_iterator() {
        let desc = event_desc();
        let messages = events(&desc, &["a", "b"]);

        let mut buffer = Vec::new();
        {
            let mut writer = DelimitedWriter::new(&mut buffer);
            for message in &messages {
                writer.write_message(message).unwrap();
            }
            writer.flush().unwrap();
        }

        let registry = ExtensionRegistry::new();
        let mut reader = DelimitedReader::new(Cursor::new(&buffer), desc, &registry);
        let collected: Vec<_> = reader.messages().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(collected, messages);
    }

    #[test]
    fn test_eof_at_start_vs_mid_frame() {
        let desc = event_desc();
        let registry = ExtensionRegistry::new();

        let mut reader = DelimitedReader::new(Cursor::new(Vec::new()), desc.clone(), &registry);
        assert!(reader.try_read_message().unwrap().is_none());

        // Frame claims 5 bytes but only 2 follow.
        let truncated = vec![5, 0x0a, 0x01];
        let mut reader = DelimitedReader::new(Cursor::new(truncated), desc, &registry);
        assert!(matches!(
            reader.read_message(),
            Err(DelimitedError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_max_message_size() {
        let desc = event_desc();
        let registry = ExtensionRegistry::new();

        // Length prefix claims 100 MiB.
        let hostile = vec![0x80, 0x80, 0x80, 0xb0, 0x03];
        let mut reader = DelimitedReader::new(Cursor::new(hostile), desc, &registry);
        reader.set_max_message_size(1024);
        assert!(matches!(
            reader.read_message(),
            Err(DelimitedError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_corrupt_payload_propagates_decode_error() {
        let desc = event_desc();
        let registry = ExtensionRegistry::new();

        // Valid frame length, garbage payload (string field truncated).
        let corrupt = vec![4, 0x0a, 0x0a, b'h', b'i'];
        let mut reader = DelimitedReader::new(Cursor::new(corrupt), desc, &registry);
        assert!(matches!(
            reader.read_message(),
            Err(DelimitedError::Decode(_))
        ));
    }
}
