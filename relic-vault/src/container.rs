use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use snafu::Snafu;
use std::borrow::Cow;

/// SHA-256 of a file's content.
pub type Digest = [u8; 32];

/// Chunks of a file in address order. Dropping the iterator early is allowed.
pub type Chunks<'a> = Box<dyn Iterator<Item = Cow<'a, [u8]>> + Send + 'a>;

/// Errors for per-path operations of a [`Container`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum LookupError {
    #[snafu(display("no such file: {path}"))]
    PathNotFound { path: String },

    #[snafu(display("cannot read {path}"))]
    ReadFailed {
        path: String,
        source: relic_saf::EntryDataError,
    },
}

/// Read-only, path-addressed access to the files of an opened container.
///
/// Paths are absolute and `/`-separated. Only files are addressable;
/// directories are implied by the paths of the files they hold.
pub trait Container: Send + Sync {
    /// Returns `true` if `path` is a file in this container.
    fn exists(&self, path: &str) -> bool;

    /// Returns the number of bytes [`stream()`](Self::stream) produces for
    /// `path`.
    fn size(&self, path: &str) -> Result<u64, LookupError>;

    /// Returns the content digest if it is known.
    fn checksum(&self, path: &str) -> Result<Option<Digest>, LookupError>;

    /// Returns the content of `path` as a lazy sequence of chunks.
    fn stream(&self, path: &str) -> Result<Chunks<'_>, LookupError>;

    /// Returns every file path, sorted.
    fn paths(&self) -> Vec<&str>;

    /// Releases the container's resources.
    fn close(self: Box<Self>);
}

/// Renders a digest as a `Content-Digest` header value.
#[must_use]
pub fn content_digest_header(digest: &Digest) -> String {
    format!("sha-256=:{}:", STANDARD.encode(digest))
}

/// Formats a digest as lowercase hex.
#[must_use]
pub fn hex_digest(digest: &Digest) -> String {
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Digest as _;

    #[test]
    fn digest_header() {
        let digest: Digest = sha2::Sha256::digest(b"hello").into();

        assert_eq!(
            content_digest_header(&digest),
            "sha-256=:LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=:"
        );
        assert_eq!(
            hex_digest(&digest),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
