//! Resume-snapshot transport.
//!
//! Snapshots cross the wire between batches, so they get a self-describing
//! JSON encoding with an explicit version tag rather than the tight binary
//! plan format: a snapshot written by one release may be handed back to a
//! newer one mid-query.

use serde::{Deserialize, Serialize};

use quiver_core::error::{Error, Result};
use quiver_ops::resume::ResumeInfo;

pub const RESUME_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    info: &'a ResumeInfo,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    info: ResumeInfo,
}

pub fn encode_resume(info: &ResumeInfo) -> Result<Vec<u8>> {
    serde_json::to_vec(&EnvelopeRef {
        version: RESUME_VERSION,
        info,
    })
    .map_err(|e| Error::Wire(format!("cannot serialize resume snapshot: {e}")))
}

pub fn decode_resume(bytes: &[u8]) -> Result<ResumeInfo> {
    let env: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| Error::Wire(format!("cannot parse resume snapshot: {e}")))?;
    if env.version > RESUME_VERSION {
        return Err(Error::Version(format!(
            "resume snapshot version {} is newer than supported {RESUME_VERSION}",
            env.version
        )));
    }
    Ok(env.info)
}
