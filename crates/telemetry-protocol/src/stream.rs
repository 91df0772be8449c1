//! Batch framing: records written back-to-back without an enclosing array.

use std::io::Write;

use serde_json::Deserializer;

use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::WireMetric;

/// Decode every record in `buf`.
///
/// Accepts a single object or several concatenated objects, with optional
/// whitespace between them, and stops cleanly at end of input. An empty
/// body yields an empty list.
pub fn decode_stream(buf: &[u8]) -> ProtocolResult<Vec<WireMetric>> {
    Deserializer::from_slice(buf)
        .into_iter::<WireMetric>()
        .map(|record| record.map_err(ProtocolError::from))
        .collect()
}

/// Serialize one record.
pub fn encode(record: &WireMetric) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(record)?)
}

/// Write records back-to-back into `out`. Returns the number written.
pub fn encode_batch<'a, W, I>(records: I, mut out: W) -> ProtocolResult<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a WireMetric>,
{
    let mut written = 0;
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        written += 1;
    }
    Ok(written)
}
