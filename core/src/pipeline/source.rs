// ## 📂 File: `src/pipeline/source.rs`

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use tracing::debug;

use crate::crypto::{DigestProbe, DigestReader};
use crate::keyring::{legacy_decrypt, KeyRing};
use crate::pipeline::types::PipelineError;
use crate::stream::{is_armored, ArmorReader};

/// Decrypted view of an origin file with its two checksum probes.
pub(crate) struct OriginStream {
    pub reader: Box<dyn Read + Send>,
    /// Ciphertext exactly as read from disk.
    pub origin: DigestProbe,
    /// Decrypted plaintext.
    pub plain: DigestProbe,
}

/// Open `path` as: file -> MD5 -> (armor) -> legacy envelope -> cipher -> MD5.
///
/// The envelope header and the stream key check are consumed here, so a
/// wrong passphrase or foreign header fails before any output byte is written.
pub(crate) fn open_origin(path: &Path, keyring: &KeyRing) -> Result<OriginStream, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::io(format!("opening {}", path.display()), e))?;

    let digest = DigestReader::new(file);
    let origin = digest.probe();
    let mut buffered = BufReader::new(digest);

    let armored = is_armored(
        buffered
            .fill_buf()
            .map_err(|e| PipelineError::io(format!("reading {}", path.display()), e))?,
    );
    let body: Box<dyn Read + Send> = if armored {
        debug!(path = %path.display(), "origin is ASCII-armored");
        Box::new(ArmorReader::new(buffered))
    } else {
        Box::new(buffered)
    };

    let mut decrypted = legacy_decrypt(body, keyring)?;
    decrypted.open()?;

    let plain_reader = DigestReader::new(decrypted);
    let plain = plain_reader.probe();

    Ok(OriginStream { reader: Box::new(plain_reader), origin, plain })
}
