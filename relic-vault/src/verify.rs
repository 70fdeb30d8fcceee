use crate::container::{Container, Digest, LookupError};
use crate::progress::VerifyProgress;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum VerifyError {
    #[snafu(display("cannot read {path}"))]
    LookupFailed { path: String, source: LookupError },

    #[snafu(display("{path} produced {actual} bytes but its size is {expected}"))]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[snafu(display("no checksum for {path} after a full read"))]
    MissingChecksum { path: String },
}

/// A file that was read to the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub path: String,
    pub size: u64,
    pub digest: Digest,
}

/// Streams every file of `container` to the end, in parallel, and returns
/// the resulting digests sorted by path.
///
/// For disc images this computes every lazy checksum.
pub fn verify<P: VerifyProgress>(
    container: &dyn Container,
    progress: &P,
) -> Result<Vec<Verified>, VerifyError> {
    let paths = container.paths();
    let mut total = 0u64;

    for &path in &paths {
        total += container.size(path).context(LookupFailedSnafu { path })?;
    }

    progress.start(paths.len(), total);

    let verified: Result<Vec<Verified>, VerifyError> = paths
        .par_iter()
        .map(|&path| {
            let verified = verify_file(container, path)?;
            progress.file_completed(path, verified.size);
            Ok(verified)
        })
        .collect();

    progress.completed();

    verified
}

fn verify_file(container: &dyn Container, path: &str) -> Result<Verified, VerifyError> {
    let expected = container.size(path).context(LookupFailedSnafu { path })?;
    let actual: u64 = container
        .stream(path)
        .context(LookupFailedSnafu { path })?
        .map(|chunk| chunk.len() as u64)
        .sum();

    ensure!(
        actual == expected,
        SizeMismatchSnafu {
            path,
            expected,
            actual
        }
    );

    let digest = container
        .checksum(path)
        .context(LookupFailedSnafu { path })?
        .context(MissingChecksumSnafu { path })?;

    Ok(Verified {
        path: path.to_owned(),
        size: actual,
        digest,
    })
}
