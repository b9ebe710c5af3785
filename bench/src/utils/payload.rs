use crate::error::BenchError;
use bytes::Bytes;
use rand::RngCore;

/// Random payload generated once per run and shared by every published message.
pub fn create_payload(size: u64) -> Result<Bytes, BenchError> {
    let size = usize::try_from(size).map_err(|_| BenchError::InvalidMessageSize(size.to_string()))?;
    let mut payload = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut payload);
    Ok(Bytes::from(payload))
}

/// Parses a comma-separated list of message sizes in bytes, e.g. `16,64,256`.
pub fn parse_message_sizes(sizes: &str) -> Result<Vec<u64>, BenchError> {
    let parsed = sizes
        .split(',')
        .map(str::trim)
        .map(|size| {
            size.parse::<u64>()
                .map_err(|_| BenchError::InvalidMessageSize(size.to_owned()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parsed)
}
