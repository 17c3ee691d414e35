// ## src/stream/mod.rs

//! Streaming layers.
//!
//! Readers and writers compose: a source file is wrapped in a digesting
//! reader, optionally unarmored, optionally unwrapped from a legacy envelope,
//! decrypted, and handed to the fan-out engine whose sinks re-encrypt.
//! Nothing here buffers more than one frame or one copy block.

pub mod io;
pub mod frame;
pub mod encrypt;
pub mod decrypt;
pub mod armor;
pub mod fanout;

pub use io::{read_exact_or_eof, BlockSink, WriterSink};
pub use encrypt::{encrypt, EncryptOptions, EncryptWriter};
pub use decrypt::{decrypt, DecryptReader};
pub use armor::{is_armored, ArmorReader, ArmorWriter, ARMOR_LABEL};
pub use fanout::{FanoutError, PipelineStream};
